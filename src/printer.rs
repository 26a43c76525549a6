//! Textual output format for values.
//!
//! Values only carry handles, so printing needs the arena that owns them.
//! [`Printed`] pairs the two and implements [`fmt::Display`].

use std::fmt;

use crate::arena::Arena;
use crate::ast::Value;

/// A value ready to be formatted
#[derive(Clone, Copy)]
pub struct Printed<'a> {
    value: Value,
    arena: &'a Arena,
}

/// Borrow `value` for display against `arena`.
pub fn display(value: Value, arena: &Arena) -> Printed<'_> {
    Printed { value, arena }
}

/// Render `value` to an owned string.
pub fn print_value(value: Value, arena: &Arena) -> String {
    display(value, arena).to_string()
}

impl Printed<'_> {
    fn with(self, value: Value) -> Self {
        Printed { value, ..self }
    }
}

impl fmt::Display for Printed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Double(d) => write!(f, "{d:.6}"),
            Value::Boolean(true) => write!(f, "#t"),
            Value::Boolean(false) => write!(f, "#f"),
            Value::String(id) | Value::Symbol(id) => write!(f, "{}", self.arena.text(id)),
            Value::Nil => write!(f, "()"),
            Value::Pair(head) => {
                write!(f, "({}", self.with(self.arena.car(head)))?;
                let mut rest = self.arena.cdr(head);
                while let Value::Pair(cell) = rest {
                    write!(f, " {}", self.with(self.arena.car(cell)))?;
                    rest = self.arena.cdr(cell);
                }
                if !rest.is_nil() {
                    write!(f, " . {}", self.with(rest))?;
                }
                write!(f, ")")
            }
            Value::Closure(_) => write!(f, "#<procedure>"),
            Value::Primitive(op) => write!(f, "#<primitive:{}>", op.scheme_id),
            Value::Void => Ok(()),
        }
    }
}
