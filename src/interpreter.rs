//! Program driver.
//!
//! An [`Interpreter`] owns one arena and one root frame seeded with the
//! primitive procedures. Programs are read in full before the first form is
//! evaluated, so a syntax error anywhere means nothing runs.

use std::io::Write;

use tracing::{debug, trace};

use crate::arena::{Arena, ArenaStats, FrameId};
use crate::ast::Value;
use crate::evaluator::environment::visible_bindings;
use crate::evaluator::{Evaluator, create_root_frame};
use crate::printer::{Printed, display};
use crate::scheme::{parse_program, tokenize};
use crate::{Error, MAX_EVAL_DEPTH, MAX_PARSE_DEPTH};

/// Limits applied while reading and evaluating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Nested `eval` depth at which evaluation fails
    pub max_eval_depth: usize,
    /// List nesting at which parsing fails
    pub max_parse_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_eval_depth: MAX_EVAL_DEPTH,
            max_parse_depth: MAX_PARSE_DEPTH,
        }
    }
}

pub struct Interpreter {
    arena: Arena,
    root: FrameId,
    config: Config,
}

impl Interpreter {
    pub fn new() -> Result<Self, Error> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self, Error> {
        let mut arena = Arena::new();
        let root = create_root_frame(&mut arena)?;
        Ok(Interpreter {
            arena,
            root,
            config,
        })
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Tokenize and parse `source` into a list of top-level forms.
    pub fn read(&mut self, source: &str) -> Result<Value, Error> {
        let tokens = tokenize(source)?;
        parse_program(&tokens, &mut self.arena, self.config.max_parse_depth)
    }

    /// Evaluate one form in the root frame.
    pub fn eval(&mut self, expr: Value) -> Result<Value, Error> {
        trace!(form = %self.display(expr), "evaluating top-level form");
        Evaluator::new(&mut self.arena, self.config.max_eval_depth).eval(expr, self.root)
    }

    pub fn display(&self, value: Value) -> Printed<'_> {
        display(value, &self.arena)
    }

    /// Read `source`, then evaluate each form in order, writing every result
    /// followed by a newline. Stops at the first error.
    pub fn run<W: Write>(&mut self, source: &str, out: &mut W) -> Result<(), Error> {
        let mut forms = self.read(source)?;
        while let Value::Pair(cell) = forms {
            let result = self.eval(self.arena.car(cell))?;
            writeln!(out, "{}", self.display(result))?;
            forms = self.arena.cdr(cell);
        }
        Ok(())
    }

    /// Like [`Interpreter::run`], but a fatal error is written to `out` as a
    /// report line and the session is torn down and reseeded.
    ///
    /// Returns the process exit status: 0 on success, 1 after an error.
    pub fn run_reporting<W: Write>(&mut self, source: &str, out: &mut W) -> i32 {
        match self.run(source, out) {
            Ok(()) => 0,
            Err(err) => {
                debug!(error = %err, "fatal error, tearing down session");
                // Nothing useful can be done if the report itself fails
                let _ = writeln!(out, "{}", err.report_line());
                if let Err(err) = self.reset() {
                    debug!(error = %err, "could not reseed session");
                }
                1
            }
        }
    }

    /// Evaluate every form in `source` and return the printed form of the
    /// last result, or an empty string for an empty program.
    ///
    /// State persists across calls, including after an error.
    pub fn eval_str(&mut self, source: &str) -> Result<String, Error> {
        let mut forms = self.read(source)?;
        let mut last = Value::Void;
        while let Value::Pair(cell) = forms {
            last = self.eval(self.arena.car(cell))?;
            forms = self.arena.cdr(cell);
        }
        Ok(self.display(last).to_string())
    }

    /// Bindings visible at top level, most recent first
    pub fn bindings(&self) -> Vec<(String, Value)> {
        visible_bindings(&self.arena, self.root)
    }

    /// Release the arena and start over with a freshly seeded root frame.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.arena.release_all();
        self.root = create_root_frame(&mut self.arena)?;
        Ok(())
    }

    pub fn stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    /// Release the arena and exit the process with `status`.
    pub fn terminate(mut self, status: i32) -> ! {
        self.arena.terminate(status)
    }
}
