pub mod environment;

use tracing::{debug, trace};

use crate::arena::{Arena, Closure, FrameId, TextId};
use crate::ast::Value;
use crate::builtinops::{Arity, OpKind, find_special_form, primitives};
use crate::{Error, MAX_EVAL_DEPTH};
use environment::{define, lookup, new_frame, set_existing};

/// Recursive evaluator over an arena.
///
/// Every nested evaluation carries its depth; once it reaches `max_depth`
/// evaluation fails with an error instead of exhausting the native stack.
pub struct Evaluator<'a> {
    arena: &'a mut Arena,
    max_depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(arena: &'a mut Arena, max_depth: usize) -> Self {
        Evaluator { arena, max_depth }
    }

    pub fn arena(&self) -> &Arena {
        self.arena
    }

    /// Evaluate `expr` in `frame`
    pub fn eval(&mut self, expr: Value, frame: FrameId) -> Result<Value, Error> {
        self.eval_with_depth_tracking(expr, frame, 0)
    }

    fn eval_with_depth_tracking(
        &mut self,
        expr: Value,
        frame: FrameId,
        depth: usize,
    ) -> Result<Value, Error> {
        if depth >= self.max_depth {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {})",
                self.max_depth
            )));
        }
        match expr {
            // Self-evaluating forms
            Value::Integer(_)
            | Value::Double(_)
            | Value::Boolean(_)
            | Value::String(_)
            | Value::Nil
            | Value::Closure(_)
            | Value::Primitive(_)
            | Value::Void => Ok(expr),

            // Variable lookup
            Value::Symbol(name) => lookup(self.arena, name, frame),

            Value::Pair(id) => {
                let operator = self.arena.car(id);
                let operands = self.arena.cdr(id);

                // Keywords are recognized by spelling and cannot be rebound
                if let Value::Symbol(keyword) = operator
                    && let Some(op) = find_special_form(self.arena.text(keyword))
                    && let OpKind::SpecialForm(special_form) = op.op_kind
                {
                    let args = self
                        .arena
                        .list_to_vec(operands)
                        .ok_or_else(|| Error::shape_error(op.scheme_id, "improper form"))?;
                    op.validate_arity(args.len())?;
                    return special_form(self, &args, frame, depth);
                }

                self.eval_application(operator, operands, frame, depth)
            }
        }
    }

    /// Evaluate operands left to right, prepending each result, then the
    /// operator, then apply.
    fn eval_application(
        &mut self,
        operator: Value,
        operands: Value,
        frame: FrameId,
        depth: usize,
    ) -> Result<Value, Error> {
        let mut args = Value::Nil;
        let mut rest = operands;
        while let Value::Pair(cell) = rest {
            let expr = self.arena.car(cell);
            let value = self.eval_with_depth_tracking(expr, frame, depth + 1)?;
            args = self.arena.cons(value, args)?;
            rest = self.arena.cdr(cell);
        }
        if !rest.is_nil() {
            return Err(Error::shape_error(
                "application",
                "improper argument list",
            ));
        }

        let procedure = self.eval_with_depth_tracking(operator, frame, depth + 1)?;
        self.apply_with_depth_tracking(procedure, args, depth + 1)
    }

    fn apply_with_depth_tracking(
        &mut self,
        procedure: Value,
        args: Value,
        depth: usize,
    ) -> Result<Value, Error> {
        match procedure {
            Value::Closure(id) => {
                let Closure {
                    params,
                    body,
                    frame: captured,
                } = *self.arena.closure(id);
                let call_frame = new_frame(self.arena, Some(captured))?;

                // Both lists are last-first, so they line up positionally
                let (mut names, mut values) = (params, args);
                loop {
                    match (names, values) {
                        (Value::Pair(name_cell), Value::Pair(value_cell)) => {
                            let Value::Symbol(name) = self.arena.car(name_cell) else {
                                return Err(Error::shape_error(
                                    "lambda",
                                    "parameters must be symbols",
                                ));
                            };
                            let value = self.arena.car(value_cell);
                            define(self.arena, name, value, call_frame)?;
                            names = self.arena.cdr(name_cell);
                            values = self.arena.cdr(value_cell);
                        }
                        (Value::Nil, Value::Nil) => break,
                        _ => {
                            let expected = self.arena.list_len(params).unwrap_or_default();
                            let got = self.arena.list_len(args).unwrap_or_default();
                            return Err(Error::arity_error(
                                "procedure",
                                Arity::Exact(expected),
                                got,
                            ));
                        }
                    }
                }

                trace!(closure = ?id, frame = ?call_frame, depth, "applying closure");
                self.eval_with_depth_tracking(body, call_frame, depth + 1)
            }
            Value::Primitive(op) => {
                let OpKind::Primitive(func) = op.op_kind else {
                    return Err(Error::EvalError(format!(
                        "Invalid function: {} is a special form",
                        op.scheme_id
                    )));
                };
                let args = self
                    .arena
                    .list_to_vec(args)
                    .ok_or_else(|| Error::shape_error(op.scheme_id, "improper argument list"))?;
                op.validate_arity(args.len())?;
                func(&args, self.arena)
            }
            other => Err(Error::EvalError(format!(
                "Invalid function: cannot apply {}",
                other.type_name()
            ))),
        }
    }

    /// Evaluate a body in order and return the last value, or void if empty
    fn eval_body(&mut self, body: &[Value], frame: FrameId, depth: usize) -> Result<Value, Error> {
        let mut result = Value::Void;
        for &expr in body {
            result = self.eval_with_depth_tracking(expr, frame, depth + 1)?;
        }
        Ok(result)
    }
}

/// Evaluate an expression with the default depth limit (public API)
pub fn eval(expr: Value, frame: FrameId, arena: &mut Arena) -> Result<Value, Error> {
    Evaluator::new(arena, MAX_EVAL_DEPTH).eval(expr, frame)
}

/// Evaluate quote special form
pub(crate) fn eval_quote(
    _ev: &mut Evaluator<'_>,
    args: &[Value],
    _frame: FrameId,
    _depth: usize,
) -> Result<Value, Error> {
    match args {
        [datum] => Ok(*datum),
        _ => Err(Error::arity_error("quote", Arity::Exact(1), args.len())),
    }
}

/// Evaluate define special form
pub(crate) fn eval_define(
    ev: &mut Evaluator<'_>,
    args: &[Value],
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = ev.eval_with_depth_tracking(*expr, frame, depth + 1)?;
            define(ev.arena, *name, value, frame)?;
            Ok(Value::Void)
        }
        [_, _] => Err(Error::shape_error("define", "first argument must be a symbol")),
        _ => Err(Error::arity_error("define", Arity::Exact(2), args.len())),
    }
}

/// Evaluate if special form
pub(crate) fn eval_if(
    ev: &mut Evaluator<'_>,
    args: &[Value],
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [condition_expr, then_expr, else_expr] => {
            match ev.eval_with_depth_tracking(*condition_expr, frame, depth + 1)? {
                Value::Boolean(true) => ev.eval_with_depth_tracking(*then_expr, frame, depth + 1),
                Value::Boolean(false) => ev.eval_with_depth_tracking(*else_expr, frame, depth + 1),
                other => Err(Error::TypeError(format!(
                    "if condition must be a boolean, got {}",
                    other.type_name()
                ))),
            }
        }
        _ => Err(Error::arity_error("if", Arity::Exact(3), args.len())),
    }
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(
    ev: &mut Evaluator<'_>,
    args: &[Value],
    frame: FrameId,
    _depth: usize,
) -> Result<Value, Error> {
    let [params, body] = args else {
        return Err(Error::arity_error("lambda", Arity::Exact(2), args.len()));
    };
    let param_list = ev
        .arena
        .list_to_vec(*params)
        .ok_or_else(|| Error::shape_error("lambda", "parameters must be a list"))?;

    let mut seen: Vec<TextId> = Vec::with_capacity(param_list.len());
    for param in &param_list {
        let Value::Symbol(name) = *param else {
            return Err(Error::shape_error("lambda", "parameters must be symbols"));
        };
        let text = ev.arena.text(name);
        if seen.iter().any(|&other| ev.arena.text(other) == text) {
            return Err(Error::shape_error(
                "lambda",
                format!("duplicate parameter name: {text}"),
            ));
        }
        seen.push(name);
    }

    // Stored last-declared first to match the evaluated argument list
    let reversed: Vec<Value> = param_list.into_iter().rev().collect();
    let params = ev.arena.list(&reversed)?;
    let closure = ev.arena.alloc_closure(Closure {
        params,
        body: *body,
        frame,
    })?;
    Ok(Value::Closure(closure))
}

/// Check a `let`-family binding list: a proper list of `(name init)` lists
fn parse_bindings(
    arena: &Arena,
    form: &'static str,
    bindings: Value,
) -> Result<Vec<(TextId, Value)>, Error> {
    let list = arena
        .list_to_vec(bindings)
        .ok_or_else(|| Error::shape_error(form, "bindings must be a list"))?;
    list.into_iter()
        .map(|binding| match arena.list_array::<2>(binding) {
            Some([Value::Symbol(name), init]) => Ok((name, init)),
            _ => Err(Error::shape_error(
                form,
                "each binding must be a (name expression) list",
            )),
        })
        .collect()
}

/// Evaluate let special form. Every init sees only the outer frame.
pub(crate) fn eval_let(
    ev: &mut Evaluator<'_>,
    args: &[Value],
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    let [bindings, body @ ..] = args else {
        return Err(Error::arity_error("let", Arity::AtLeast(2), args.len()));
    };
    let bindings = parse_bindings(ev.arena, "let", *bindings)?;
    if bindings.is_empty() {
        return ev.eval_body(body, frame, depth);
    }

    let let_frame = new_frame(ev.arena, Some(frame))?;
    for (name, init) in bindings {
        let value = ev.eval_with_depth_tracking(init, frame, depth + 1)?;
        define(ev.arena, name, value, let_frame)?;
    }
    ev.eval_body(body, let_frame, depth)
}

/// Evaluate let* special form: one new frame per binding, each init
/// evaluated in the frame of the bindings before it.
pub(crate) fn eval_let_star(
    ev: &mut Evaluator<'_>,
    args: &[Value],
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    let [bindings, body @ ..] = args else {
        return Err(Error::arity_error("let*", Arity::AtLeast(2), args.len()));
    };
    let bindings = parse_bindings(ev.arena, "let*", *bindings)?;

    let mut current = frame;
    for (name, init) in bindings {
        let value = ev.eval_with_depth_tracking(init, current, depth + 1)?;
        let next = new_frame(ev.arena, Some(current))?;
        define(ev.arena, name, value, next)?;
        current = next;
    }
    ev.eval_body(body, current, depth)
}

/// Evaluate letrec special form: all inits are evaluated in the new frame
/// before any binding is installed.
pub(crate) fn eval_letrec(
    ev: &mut Evaluator<'_>,
    args: &[Value],
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    let [bindings, body @ ..] = args else {
        return Err(Error::arity_error("letrec", Arity::AtLeast(2), args.len()));
    };
    let bindings = parse_bindings(ev.arena, "letrec", *bindings)?;

    let letrec_frame = new_frame(ev.arena, Some(frame))?;
    let values = bindings
        .iter()
        .map(|&(_, init)| ev.eval_with_depth_tracking(init, letrec_frame, depth + 1))
        .collect::<Result<Vec<_>, _>>()?;

    // Prepending in reverse leaves the frame in declaration order
    for (&(name, _), &value) in bindings.iter().zip(&values).rev() {
        define(ev.arena, name, value, letrec_frame)?;
    }
    ev.eval_body(body, letrec_frame, depth)
}

/// Evaluate cond special form
pub(crate) fn eval_cond(
    ev: &mut Evaluator<'_>,
    args: &[Value],
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    for (index, clause) in args.iter().enumerate() {
        let Some([test, expr]) = ev.arena.list_array::<2>(*clause) else {
            return Err(Error::shape_error(
                "cond",
                "each clause must be a (test expression) list",
            ));
        };

        if test.is_symbol_named("else", ev.arena) {
            if index + 1 != args.len() {
                return Err(Error::shape_error("cond", "else must be the last clause"));
            }
            return ev.eval_with_depth_tracking(expr, frame, depth + 1);
        }

        match ev.eval_with_depth_tracking(test, frame, depth + 1)? {
            Value::Boolean(true) => return ev.eval_with_depth_tracking(expr, frame, depth + 1),
            Value::Boolean(false) => {}
            other => {
                return Err(Error::TypeError(format!(
                    "cond test must be a boolean, got {}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::Void)
}

/// Evaluate set! special form
pub(crate) fn eval_set(
    ev: &mut Evaluator<'_>,
    args: &[Value],
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = ev.eval_with_depth_tracking(*expr, frame, depth + 1)?;
            if set_existing(ev.arena, *name, value, frame) {
                Ok(Value::Void)
            } else {
                Err(Error::UnboundAssignment(ev.arena.text(*name).to_owned()))
            }
        }
        [_, _] => Err(Error::shape_error("set!", "first argument must be a symbol")),
        _ => Err(Error::arity_error("set!", Arity::Exact(2), args.len())),
    }
}

/// Evaluate begin special form
pub(crate) fn eval_begin(
    ev: &mut Evaluator<'_>,
    args: &[Value],
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    ev.eval_body(args, frame, depth)
}

// `and`/`or` return the first value whose truth reading matches the
// short-circuit value, otherwise the last value
macro_rules! truth_reading_op {
    ($name:ident, $short_circuit:literal) => {
        pub(crate) fn $name(
            ev: &mut Evaluator<'_>,
            args: &[Value],
            frame: FrameId,
            depth: usize,
        ) -> Result<Value, Error> {
            let mut result = Value::Void;
            for &arg in args {
                result = ev.eval_with_depth_tracking(arg, frame, depth + 1)?;
                if result.truth_reading() == Some($short_circuit) {
                    return Ok(result);
                }
            }
            Ok(result)
        }
    };
}

truth_reading_op!(eval_and, false);
truth_reading_op!(eval_or, true);

/// Create the root frame, binding every primitive procedure by name
pub fn create_root_frame(arena: &mut Arena) -> Result<FrameId, Error> {
    let root = new_frame(arena, None)?;
    for op in primitives() {
        let name = arena.alloc_text(op.scheme_id)?;
        define(arena, name, Value::Primitive(op), root)?;
    }
    debug!(frame = ?root, "seeded root frame with primitives");
    Ok(root)
}
