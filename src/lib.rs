//! arenascheme - a small Scheme-like interpreter backed by a bulk-release arena
//!
//! This crate reads Scheme source text, builds a tree of nested lists, and
//! evaluates that tree against a chain of lexically scoped frames. Every pair,
//! frame, closure and piece of text the interpreter creates is allocated in an
//! [`arena::Arena`] and lives until the arena is released in one step, either
//! at program end or when a fatal error tears the session down.
//!
//! ```scheme
//! (define square (lambda (x) (* x x)))
//! (square 12)                        ; 144
//! (let* ((x 1) (y (+ x 1))) y)       ; 2
//! (cons 1 2)                         ; (1 . 2)
//! (letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))
//!          (odd?  (lambda (n) (if (= n 0) #f (even? (- n 1))))))
//!   (even? 10))                      ; #t
//! ```
//!
//! ## Evaluation model
//!
//! - `if` and `cond` demand real booleans; there is no general truthiness.
//! - `and`/`or` short-circuit on the *truth reading* of a value (see
//!   [`ast::Value::truth_reading`]) and return the value itself.
//! - Procedure arguments are evaluated left to right and collected into a list
//!   in reverse source order. The primitives are written against that reversed
//!   list, which is why `-` and `/` fold from the right.
//! - There is no garbage collection and no tail-call elimination. Runaway
//!   recursion is stopped by a configurable depth limit.
//!
//! ## Modules
//!
//! - `arena`: typed bulk allocator for pairs, text, frames and closures
//! - `ast`: the [`ast::Value`] representation
//! - `scheme`: tokenizer and bracket-matching parser
//! - `evaluator`: `eval`/`apply`, special forms, and the frame model
//! - `builtinops`: the registry of special forms and primitive procedures
//! - `printer`: the textual output format
//! - `interpreter`: the program driver that owns the arena and root frame

use std::fmt;

use crate::builtinops::Arity;

/// Maximum list nesting accepted by the parser
pub const MAX_PARSE_DEPTH: usize = 1024;

/// Maximum nested `eval` depth before evaluation is abandoned with an error.
/// Fits an 8 MiB thread stack; callers on a larger stack can raise it through
/// [`Config::max_eval_depth`].
pub const MAX_EVAL_DEPTH: usize = 512;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad characters, malformed literals)
    InvalidSyntax,
    /// Input ended before a construct was complete (unterminated string, unclosed parens, dangling quote)
    Incomplete,
    /// A closing parenthesis with no matching opening parenthesis
    UnexpectedClose,
    /// List nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Implementation-imposed limit exceeded (integer width)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 60 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from `input` around the
    /// character offset `error_offset`
    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 60;

        let context_start = error_offset.saturating_sub(20);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        // Keep the report on one line
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, " (found '{found}')")?;
        }
        if let Some(context) = &self.context {
            write!(f, " near: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
///
/// Every error is fatal to the running program: it unwinds out of `eval` as a
/// `Result` and the driver decides how to tear down (see
/// [`interpreter::Interpreter::run`]).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    ParseError(ParseError),
    #[error("Unbound variable: {0}")]
    UnboundVariable(String),
    #[error("Cannot set! unbound variable: {0}")]
    UnboundAssignment(String),
    #[error("ArityError: {name} expects {expected} arguments, got {got}")]
    ArityError {
        name: String,
        expected: Arity,
        got: usize,
    },
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Bad syntax in {form}: {message}")]
    ShapeError { form: String, message: String },
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("Arena exhausted: no room for more {kind} (limit: {limit})")]
    ArenaExhausted { kind: &'static str, limit: u32 },
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    pub fn arity_error(name: impl Into<String>, expected: Arity, got: usize) -> Self {
        Error::ArityError {
            name: name.into(),
            expected,
            got,
        }
    }

    pub fn shape_error(form: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ShapeError {
            form: form.into(),
            message: message.into(),
        }
    }

    /// True for tokenizer and parser failures
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, Error::ParseError(_))
    }

    /// The single line printed when this error ends a program.
    pub fn report_line(&self) -> String {
        if self.is_syntax_error() {
            format!("Syntax error: {self}")
        } else {
            format!("Evaluation error: {self}")
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::ParseError(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

pub mod arena;
pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod interpreter;
pub mod printer;
pub mod scheme;

pub use interpreter::{Config, Interpreter};
