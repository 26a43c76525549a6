//! This module defines [`Value`], the single representation shared by the
//! parser, the evaluator and the printer. Values are small `Copy` handles:
//! scalars are stored inline, while pairs, text, and closures are indices
//! into the [`Arena`](crate::arena::Arena). Conversion traits for common Rust
//! scalars make building values in code and tests convenient.

use crate::Error;
use crate::arena::{Arena, ClosureId, PairId, TextId};
use crate::builtinops::BuiltinOp;

/// Type alias for integer values in the interpreter
pub type NumberType = i64;

/// Non-alphanumeric characters that may start a symbol. `+` and `-` also
/// start a symbol unless a digit follows them.
pub(crate) const SYMBOL_INITIAL_CHARS: &str = "!$%&*/:<=>?~_^";

/// Core value type of the interpreter
///
/// Strings and symbols both point at a text block; symbols compare by their
/// text, so two separately allocated occurrences of `x` name the same
/// variable.
#[derive(Clone, Copy)]
pub enum Value {
    /// Exact numbers
    Integer(NumberType),
    /// Inexact numbers
    Double(f64),
    Boolean(bool),
    /// String literal; the text keeps its surrounding quote characters
    String(TextId),
    Symbol(TextId),
    /// The empty list
    Nil,
    Pair(PairId),
    /// User procedure created by `lambda`
    Closure(ClosureId),
    /// Built-in procedure from the registry
    Primitive(&'static BuiltinOp),
    /// Result of expressions evaluated only for effect.
    /// Void never equals itself or any other value.
    Void,
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Double(d) => write!(f, "Double({d})"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::String(id) => write!(f, "String({id:?})"),
            Value::Symbol(id) => write!(f, "Symbol({id:?})"),
            Value::Nil => write!(f, "Nil"),
            Value::Pair(id) => write!(f, "{id:?}"),
            Value::Closure(id) => write!(f, "{id:?}"),
            Value::Primitive(op) => write!(f, "Primitive({})", op.scheme_id),
            Value::Void => write!(f, "Void"),
        }
    }
}

/// Handle equality: pairs and text compare by index, not by contents.
/// Use [`Value::is_symbol_named`] or the printer for textual comparison.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) | (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Pair(a), Value::Pair(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => a == b,
            // Compare primitives by registry id, not function pointer
            (Value::Primitive(a), Value::Primitive(b)) => a.scheme_id == b.scheme_id,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl TryFrom<Value> for NumberType {
    type Error = Error;

    fn try_from(value: Value) -> Result<NumberType, Error> {
        if let Value::Integer(n) = value {
            Ok(n)
        } else {
            Err(Error::TypeError(format!(
                "expected integer, got {}",
                value.type_name()
            )))
        }
    }
}

/// Helper for building values from Rust literals in tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Allocate a symbol in `arena`
#[cfg(test)]
pub(crate) fn sym(arena: &mut Arena, name: &str) -> Result<Value, Error> {
    arena.alloc_text(name).map(Value::Symbol)
}

impl Value {
    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_void(self) -> bool {
        matches!(self, Value::Void)
    }

    /// True if this is a symbol spelled `name`
    pub fn is_symbol_named(self, name: &str, arena: &Arena) -> bool {
        matches!(self, Value::Symbol(id) if arena.text(id) == name)
    }

    /// How `and`/`or` read a value: `Some(false)` for `#f`, `0`, `0.0`, `()`
    /// and void, `Some(true)` for `#t` and `1`, `None` for everything else.
    pub fn truth_reading(self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(b),
            Value::Integer(0) | Value::Nil | Value::Void => Some(false),
            Value::Double(d) if d == 0.0 => Some(false),
            Value::Integer(1) => Some(true),
            _ => None,
        }
    }

    /// Name of the value's kind, used in type error messages
    pub fn type_name(self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Nil => "empty list",
            Value::Pair(_) => "pair",
            Value::Closure(_) => "procedure",
            Value::Primitive(_) => "primitive",
            Value::Void => "void",
        }
    }
}
