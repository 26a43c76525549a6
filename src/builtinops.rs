//! Built-in operations registry.
//!
//! Every keyword and primitive procedure the interpreter knows is one
//! [`BuiltinOp`] record in a single static table:
//!
//! - **Special forms** receive their operands unevaluated, together with the
//!   current frame (e.g. `if`, `define`, `let`, `and`).
//! - **Primitives** receive already-evaluated arguments and are bound by name
//!   in the root frame, so they can be passed around like any other value
//!   (e.g. `+`, `car`, `null?`).
//!
//! ## Argument order
//!
//! Application builds the argument list by prepending each evaluated
//! argument, so a primitive sees its arguments in *reverse* source order:
//! `(- 10 3)` hands `[3, 10]` to the subtraction fold. The folds below are
//! written against that order, which is what makes `-` and `/` associate to
//! the right: `(- 10 3 2)` is `10 - (3 - (2 - 0))` = 9.
//!
//! ## Numbers
//!
//! Integer arithmetic is checked and reports overflow. If any operand is a
//! double, the result is a double.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::Error;
use crate::arena::{Arena, FrameId};
use crate::ast::{NumberType, Value};
use crate::evaluator::{
    Evaluator, eval_and, eval_begin, eval_cond, eval_define, eval_if, eval_lambda, eval_let,
    eval_let_star, eval_letrec, eval_or, eval_quote, eval_set,
};

/// Primitive procedure: evaluated arguments in reverse source order
pub type PrimitiveFn = fn(&[Value], &mut Arena) -> Result<Value, Error>;

/// Special form: unevaluated operands in source order, the current frame,
/// and the current evaluation depth
pub type SpecialFormFn = fn(&mut Evaluator<'_>, &[Value], FrameId, usize) -> Result<Value, Error>;

/// Represents the implementation of a built-in operation
#[derive(Clone, Copy)]
pub enum OpKind {
    Primitive(PrimitiveFn),
    SpecialForm(SpecialFormFn),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Primitive(_) => write!(f, "Primitive(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Accepted argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn accepts(self, arg_count: usize) -> bool {
        match self {
            Arity::Exact(n) => arg_count == n,
            Arity::AtLeast(n) => arg_count >= n,
            Arity::Any => true,
        }
    }

    pub fn validate(self, name: &str, arg_count: usize) -> Result<(), Error> {
        if self.accepts(arg_count) {
            Ok(())
        } else {
            Err(Error::arity_error(name, self, arg_count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug)]
pub struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub scheme_id: &'static str,
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // scheme_id uniquely identifies an operation
        self.scheme_id == other.scheme_id
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(self.scheme_id, arg_count)
    }
}

//
// Builtin Function Implementations
//

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Exact(NumberType),
    Inexact(f64),
}

impl Number {
    fn from_value(value: Value, op: &str) -> Result<Self, Error> {
        match value {
            Value::Integer(n) => Ok(Number::Exact(n)),
            Value::Double(d) => Ok(Number::Inexact(d)),
            other => Err(Error::TypeError(format!(
                "{op} requires numeric arguments, got {}",
                other.type_name()
            ))),
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Number::Exact(n) => n as f64,
            Number::Inexact(d) => d,
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Exact(n) => Value::Integer(n),
            Number::Inexact(d) => Value::Double(d),
        }
    }
}

/// Destructure a fixed-size argument slice.
fn fixed_args<const N: usize>(op: &str, args: &[Value]) -> Result<[Value; N], Error> {
    args.try_into()
        .map_err(|_| Error::arity_error(op, Arity::Exact(N), args.len()))
}

/// Fold `step(element, acc)` over the arguments, starting from `identity`.
fn numeric_fold(
    op: &str,
    args: &[Value],
    identity: Number,
    step: fn(Number, Number) -> Result<Number, Error>,
) -> Result<Value, Error> {
    args.iter()
        .try_fold(identity, |acc, &arg| step(Number::from_value(arg, op)?, acc))
        .map(Value::from)
}

// Macro to generate one step of an arithmetic fold
macro_rules! arithmetic_step {
    ($name:ident, $checked:ident, $op:tt, $description:literal) => {
        fn $name(element: Number, acc: Number) -> Result<Number, Error> {
            match (element, acc) {
                (Number::Exact(a), Number::Exact(b)) => {
                    a.$checked(b).map(Number::Exact).ok_or_else(|| {
                        Error::EvalError(concat!("Integer overflow in ", $description).into())
                    })
                }
                _ => Ok(Number::Inexact(element.to_f64() $op acc.to_f64())),
            }
        }
    };
}

arithmetic_step!(add_step, checked_add, +, "addition");
arithmetic_step!(mul_step, checked_mul, *, "multiplication");
arithmetic_step!(sub_step, checked_sub, -, "subtraction");

/// Stays exact only while the exact accumulator divides the element evenly.
fn div_step(element: Number, acc: Number) -> Result<Number, Error> {
    if acc.to_f64() == 0.0 {
        return Err(Error::EvalError("Division by zero".into()));
    }
    match (element, acc) {
        (Number::Exact(n), Number::Exact(d)) => match n.checked_rem(d) {
            Some(0) => n
                .checked_div(d)
                .map(Number::Exact)
                .ok_or_else(|| Error::EvalError("Integer overflow in division".into())),
            Some(_) => Ok(Number::Inexact(n as f64 / d as f64)),
            None => Err(Error::EvalError("Integer overflow in division".into())),
        },
        _ => Ok(Number::Inexact(element.to_f64() / acc.to_f64())),
    }
}

fn builtin_add(args: &[Value], _arena: &mut Arena) -> Result<Value, Error> {
    numeric_fold("+", args, Number::Exact(0), add_step)
}

fn builtin_mul(args: &[Value], _arena: &mut Arena) -> Result<Value, Error> {
    numeric_fold("*", args, Number::Exact(1), mul_step)
}

fn builtin_sub(args: &[Value], _arena: &mut Arena) -> Result<Value, Error> {
    numeric_fold("-", args, Number::Exact(0), sub_step)
}

fn builtin_div(args: &[Value], _arena: &mut Arena) -> Result<Value, Error> {
    numeric_fold("/", args, Number::Exact(1), div_step)
}

fn builtin_modulo(args: &[Value], _arena: &mut Arena) -> Result<Value, Error> {
    let [divisor, dividend] = fixed_args::<2>("modulo", args)?;
    let divisor = NumberType::try_from(divisor)?;
    let dividend = NumberType::try_from(dividend)?;
    if divisor == 0 {
        return Err(Error::EvalError("Division by zero in modulo".into()));
    }
    dividend
        .checked_rem(divisor)
        .map(Value::Integer)
        .ok_or_else(|| Error::EvalError("Integer overflow in modulo".into()))
}

// Macro to generate numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:literal) => {
        fn $name(args: &[Value], _arena: &mut Arena) -> Result<Value, Error> {
            let [first, second] = fixed_args::<2>($op_str, args)?;
            let first = Number::from_value(first, $op_str)?.to_f64();
            let second = Number::from_value(second, $op_str)?.to_f64();
            Ok(Value::Boolean(first $op second))
        }
    };
}

// Operands arrive reversed: `(< a b)` compares `b > a`
numeric_comparison!(builtin_lt, >, "<");
numeric_comparison!(builtin_gt, <, ">");
numeric_comparison!(builtin_eq, ==, "=");

fn builtin_null(args: &[Value], _arena: &mut Arena) -> Result<Value, Error> {
    let [value] = fixed_args::<1>("null?", args)?;
    Ok(Value::Boolean(value.is_nil()))
}

fn builtin_car(args: &[Value], arena: &mut Arena) -> Result<Value, Error> {
    match fixed_args::<1>("car", args)? {
        [Value::Pair(id)] => Ok(arena.car(id)),
        [other] => Err(Error::TypeError(format!(
            "car requires a pair, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_cdr(args: &[Value], arena: &mut Arena) -> Result<Value, Error> {
    match fixed_args::<1>("cdr", args)? {
        [Value::Pair(id)] => Ok(arena.cdr(id)),
        [other] => Err(Error::TypeError(format!(
            "cdr requires a pair, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_cons(args: &[Value], arena: &mut Arena) -> Result<Value, Error> {
    let [rest, first] = fixed_args::<2>("cons", args)?;
    arena.cons(first, rest)
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    vec![
        // Special forms
        BuiltinOp {
            scheme_id: "if",
            op_kind: OpKind::SpecialForm(eval_if),
            arity: Arity::Exact(3),
        },
        BuiltinOp {
            scheme_id: "quote",
            op_kind: OpKind::SpecialForm(eval_quote),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "define",
            op_kind: OpKind::SpecialForm(eval_define),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "lambda",
            op_kind: OpKind::SpecialForm(eval_lambda),
            // Fixed parameter lists only; a single body expression
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "let",
            op_kind: OpKind::SpecialForm(eval_let),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            scheme_id: "let*",
            op_kind: OpKind::SpecialForm(eval_let_star),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            scheme_id: "letrec",
            op_kind: OpKind::SpecialForm(eval_letrec),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            scheme_id: "cond",
            op_kind: OpKind::SpecialForm(eval_cond),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            scheme_id: "set!",
            op_kind: OpKind::SpecialForm(eval_set),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "begin",
            op_kind: OpKind::SpecialForm(eval_begin),
            arity: Arity::Any,
        },
        BuiltinOp {
            scheme_id: "and",
            op_kind: OpKind::SpecialForm(eval_and),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            scheme_id: "or",
            op_kind: OpKind::SpecialForm(eval_or),
            arity: Arity::AtLeast(1),
        },
        // List operations
        BuiltinOp {
            scheme_id: "car",
            op_kind: OpKind::Primitive(builtin_car),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "cdr",
            op_kind: OpKind::Primitive(builtin_cdr),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "cons",
            op_kind: OpKind::Primitive(builtin_cons),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "null?",
            op_kind: OpKind::Primitive(builtin_null),
            arity: Arity::Exact(1),
        },
        // Arithmetic operations
        BuiltinOp {
            scheme_id: "modulo",
            op_kind: OpKind::Primitive(builtin_modulo),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "*",
            op_kind: OpKind::Primitive(builtin_mul),
            arity: Arity::Any,
        },
        BuiltinOp {
            scheme_id: "/",
            op_kind: OpKind::Primitive(builtin_div),
            arity: Arity::Any,
        },
        BuiltinOp {
            scheme_id: "+",
            op_kind: OpKind::Primitive(builtin_add),
            arity: Arity::Any,
        },
        BuiltinOp {
            scheme_id: "-",
            op_kind: OpKind::Primitive(builtin_sub),
            arity: Arity::Any,
        },
        // Comparison operations
        BuiltinOp {
            scheme_id: "<",
            op_kind: OpKind::Primitive(builtin_lt),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: ">",
            op_kind: OpKind::Primitive(builtin_gt),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "=",
            op_kind: OpKind::Primitive(builtin_eq),
            arity: Arity::Exact(2),
        },
    ]
});

/// Lazy static map from scheme_id to BuiltinOp (private - use find_scheme_op)
static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.scheme_id, op)).collect()
});

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// The primitive procedures, in the order they are bound into the root frame
pub fn primitives() -> impl Iterator<Item = &'static BuiltinOp> {
    get_builtin_ops().iter().filter(|op| !op.is_special_form())
}

/// Find a builtin operation by its Scheme identifier
pub fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}

/// Find a special-form keyword
pub(crate) fn find_special_form(id: &str) -> Option<&'static BuiltinOp> {
    find_scheme_op(id).filter(|op| op.is_special_form())
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    /// Invoke a primitive through the registry. `args` are given in source
    /// order and reversed here, as application would.
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_scheme_op(name).expect("builtin not found");
        let reversed: Vec<Value> = args.iter().rev().copied().collect();
        let mut arena = Arena::new();
        match op.op_kind {
            OpKind::Primitive(func) => {
                op.validate_arity(reversed.len())?;
                func(&reversed, &mut arena)
            }
            OpKind::SpecialForm(_) => {
                panic!("expected primitive in tests, got special form: {name}")
            }
        }
    }

    #[test]
    fn test_builtin_ops_registry() {
        let add_op = find_scheme_op("+").unwrap();
        assert_eq!(add_op.arity, Arity::Any);
        assert!(!add_op.is_special_form());

        let if_op = find_scheme_op("if").unwrap();
        assert!(if_op.is_special_form());
        assert_eq!(if_op.arity, Arity::Exact(3));

        // Keywords are not procedures and procedures are not keywords
        assert!(find_special_form("let*").is_some());
        assert!(find_special_form("car").is_none());
        assert!(find_scheme_op("unknown").is_none());
        assert!(find_scheme_op("list").is_none());

        let names: Vec<&str> = primitives().map(|op| op.scheme_id).collect();
        assert_eq!(
            names,
            vec!["car", "cdr", "cons", "null?", "modulo", "*", "/", "+", "-", "<", ">", "="]
        );

        let keywords = get_builtin_ops()
            .iter()
            .filter(|op| op.is_special_form())
            .count();
        assert_eq!(keywords, 12);
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let test_cases: Vec<TestCase> = vec![
            // Addition
            test!("+", &[], success(0)),
            test!("+", &[val(5)], success(5)),
            test!("+", &[val(1), val(2), val(3)], success(6)),
            test!("+", &[val(-5), val(10)], success(5)),
            test!("+", &[val(1), val(0.5)], success(1.5)),
            test!("+", &[val(0.25), val(0.25)], success(0.5)),
            test!("+", &[val(NumberType::MAX), val(1)], None),
            test!("+", &[val(true)], None),
            // Multiplication
            test!("*", &[], success(1)),
            test!("*", &[val(2), val(3), val(4)], success(24)),
            test!("*", &[val(2), val(1.5)], success(3.0)),
            test!("*", &[val(4611686018427387904i64), val(2)], None),
            // Subtraction folds from the right
            test!("-", &[], success(0)),
            test!("-", &[val(5)], success(5)),
            test!("-", &[val(10), val(3)], success(7)),
            test!("-", &[val(10), val(3), val(2)], success(9)),
            test!("-", &[val(1), val(0.5)], success(0.5)),
            test!("-", &[val(NumberType::MIN), val(1)], None),
            test!("-", &[val(5), val(false)], None),
            // Division stays exact while it divides evenly
            test!("/", &[], success(1)),
            test!("/", &[val(8), val(4), val(2)], success(4)),
            test!("/", &[val(10), val(2)], success(5)),
            test!("/", &[val(1), val(2)], success(0.5)),
            test!("/", &[val(0), val(5)], success(0)),
            test!("/", &[val(3.0), val(2)], success(1.5)),
            test!("/", &[val(4), val(2.0)], success(2.0)),
            test!("/", &[val(5), val(0)], None),
            test!("/", &[val(5), val(0.0)], None),
            test!("/", &[val(NumberType::MIN), val(-1)], None),
            // Modulo
            test!("modulo", &[val(7), val(3)], success(1)),
            test!("modulo", &[val(-7), val(3)], success(-1)),
            test!("modulo", &[val(7), val(-3)], success(1)),
            test!("modulo", &[val(6), val(3)], success(0)),
            test!("modulo", &[val(7), val(0)], None),
            test!("modulo", &[val(7.0), val(2)], None),
            test!("modulo", &[val(7)], None),
            // Comparisons
            test!("<", &[val(1), val(2)], success(true)),
            test!("<", &[val(2), val(1)], success(false)),
            test!("<", &[val(2), val(2)], success(false)),
            test!(">", &[val(1), val(2)], success(false)),
            test!(">", &[val(2), val(1)], success(true)),
            test!("<", &[val(1), val(1.5)], success(true)),
            test!("=", &[val(2), val(2.0)], success(true)),
            test!("=", &[val(2), val(3)], success(false)),
            test!("<", &[val(1), val(2), val(3)], None),
            test!("=", &[val(1)], None),
            test!(">", &[val(true), val(1)], None),
            // null?
            test!("null?", &[Value::Nil], success(true)),
            test!("null?", &[val(0)], success(false)),
            test!("null?", &[val(false)], success(false)),
            test!("null?", &[], None),
            // car/cdr reject non-pairs
            test!("car", &[Value::Nil], None),
            test!("cdr", &[val(1)], None),
            test!("car", &[val(1), val(2)], None),
            test!("cons", &[val(1)], None),
        ];

        for (i, (name, actual, expected)) in test_cases.into_iter().enumerate() {
            match (actual, expected) {
                (Ok(actual), Some(expected)) => {
                    assert_eq!(actual, expected, "Test case {} ({name}) failed", i + 1);
                }
                (Err(_), None) => {}
                (Ok(actual), None) => {
                    panic!("Test case {} ({name}): expected error, got {actual:?}", i + 1)
                }
                (Err(err), Some(expected)) => panic!(
                    "Test case {} ({name}): expected {expected:?}, got error {err:?}",
                    i + 1
                ),
            }
        }
    }

    #[test]
    fn test_pair_primitives_share_one_arena() {
        let mut arena = Arena::new();
        let cons = find_scheme_op("cons").unwrap();
        let OpKind::Primitive(cons) = cons.op_kind else {
            panic!("cons should be a primitive");
        };

        // (cons 1 2) arrives as [2, 1]
        let pair = cons(&[val(2), val(1)], &mut arena).unwrap();
        assert_eq!(builtin_car(&[pair], &mut arena).unwrap(), val(1));
        assert_eq!(builtin_cdr(&[pair], &mut arena).unwrap(), val(2));
        assert_eq!(builtin_null(&[pair], &mut arena).unwrap(), val(false));
    }

    #[test]
    fn test_error_messages() {
        let test_cases = vec![
            (call_builtin("+", &[val(1), val(true)]), "Type error: + requires numeric arguments, got boolean"),
            (call_builtin("/", &[val(1), val(0)]), "EvaluationError: Division by zero"),
            (call_builtin("+", &[val(NumberType::MAX), val(1)]), "EvaluationError: Integer overflow in addition"),
            (call_builtin("car", &[val(1)]), "Type error: car requires a pair, got integer"),
            (call_builtin("cons", &[val(1)]), "ArityError: cons expects exactly 2 arguments, got 1"),
        ];

        for (result, expected_msg) in test_cases {
            assert_eq!(result.unwrap_err().to_string(), expected_msg);
        }
    }

    #[test]
    fn test_arity_validation() {
        use Arity::*;

        Exact(2).validate("f", 2).unwrap();
        Exact(2).validate("f", 1).unwrap_err();
        Exact(2).validate("f", 3).unwrap_err();

        AtLeast(1).validate("f", 1).unwrap();
        AtLeast(1).validate("f", 2).unwrap();
        AtLeast(1).validate("f", 0).unwrap_err();

        Any.validate("f", 0).unwrap();
        Any.validate("f", 100).unwrap();

        match Exact(2).validate("f", 1).unwrap_err() {
            Error::ArityError {
                name,
                expected,
                got,
            } => {
                assert_eq!(name, "f");
                assert_eq!(expected, Exact(2));
                assert_eq!(got, 1);
            }
            other => panic!("Expected ArityError, got {other:?}"),
        }

        assert_eq!(Exact(1).to_string(), "exactly 1");
        assert_eq!(AtLeast(2).to_string(), "at least 2");
    }
}
