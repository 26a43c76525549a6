//! Bulk-release storage for everything the interpreter allocates.
//!
//! Pairs, text blocks, frames and closures each live in their own vector and
//! are addressed by small `Copy` indices. Nothing is freed individually:
//! [`Arena::release_all`] drops every block at once.

use std::fmt;

use tracing::debug;

use crate::Error;
use crate::ast::Value;

/// Index of a cons cell in the arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairId(pub(crate) u32);

/// Index of an immutable text block (string or symbol spelling).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextId(pub(crate) u32);

/// Index of an environment frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub(crate) u32);

/// Index of a closure record.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosureId(pub(crate) u32);

impl fmt::Debug for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pair#{}", self.0)
    }
}

impl fmt::Debug for TextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Text#{}", self.0)
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame#{}", self.0)
    }
}

impl fmt::Debug for ClosureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsCell {
    pub car: Value,
    pub cdr: Value,
}

/// One level of lexical scope. `bindings` is an arena list of
/// `(symbol . value)` pairs, newest first.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub bindings: Value,
    pub parent: Option<FrameId>,
}

/// A user procedure. `params` holds the parameter symbols last-declared
/// first, matching the order of an evaluated argument list.
#[derive(Debug, Clone, Copy)]
pub struct Closure {
    pub params: Value,
    pub body: Value,
    pub frame: FrameId,
}

/// Live block counts, per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    pub pairs: usize,
    pub texts: usize,
    pub frames: usize,
    pub closures: usize,
}

impl ArenaStats {
    pub fn total(&self) -> usize {
        self.pairs + self.texts + self.frames + self.closures
    }
}

impl fmt::Display for ArenaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pairs, {} texts, {} frames, {} closures ({} blocks)",
            self.pairs,
            self.texts,
            self.frames,
            self.closures,
            self.total()
        )
    }
}

/// The interpreter's allocator.
///
/// Handles are only meaningful for the arena that produced them and only
/// until the next [`Arena::release_all`]; reading a stale handle panics on
/// an out-of-range index. Allocation fails once a kind has used up the
/// `u32` handle space (or the configured block limit).
#[derive(Debug)]
pub struct Arena {
    cells: Vec<ConsCell>,
    texts: Vec<Box<str>>,
    frames: Vec<Frame>,
    closures: Vec<Closure>,
    block_limit: u32,
}

impl Default for Arena {
    fn default() -> Self {
        Arena {
            cells: Vec::new(),
            texts: Vec::new(),
            frames: Vec::new(),
            closures: Vec::new(),
            block_limit: u32::MAX,
        }
    }
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena whose per-kind block count may not exceed `limit`.
    pub fn with_block_limit(limit: u32) -> Self {
        Arena {
            block_limit: limit,
            ..Self::default()
        }
    }

    /// Index for the next block of a kind that currently holds `len` blocks
    fn next_index(&self, len: usize, kind: &'static str) -> Result<u32, Error> {
        u32::try_from(len)
            .ok()
            .filter(|&index| index < self.block_limit)
            .ok_or(Error::ArenaExhausted {
                kind,
                limit: self.block_limit,
            })
    }

    pub fn alloc_pair(&mut self, car: Value, cdr: Value) -> Result<PairId, Error> {
        let id = PairId(self.next_index(self.cells.len(), "pairs")?);
        self.cells.push(ConsCell { car, cdr });
        Ok(id)
    }

    /// Allocate a pair and wrap it as a value.
    pub fn cons(&mut self, car: Value, cdr: Value) -> Result<Value, Error> {
        self.alloc_pair(car, cdr).map(Value::Pair)
    }

    pub fn alloc_text(&mut self, text: &str) -> Result<TextId, Error> {
        let id = TextId(self.next_index(self.texts.len(), "texts")?);
        self.texts.push(text.into());
        Ok(id)
    }

    pub fn alloc_frame(&mut self, parent: Option<FrameId>) -> Result<FrameId, Error> {
        let id = FrameId(self.next_index(self.frames.len(), "frames")?);
        self.frames.push(Frame {
            bindings: Value::Nil,
            parent,
        });
        Ok(id)
    }

    pub fn alloc_closure(&mut self, closure: Closure) -> Result<ClosureId, Error> {
        let id = ClosureId(self.next_index(self.closures.len(), "closures")?);
        self.closures.push(closure);
        Ok(id)
    }

    #[inline]
    pub fn car(&self, id: PairId) -> Value {
        self.cells[id.0 as usize].car
    }

    #[inline]
    pub fn cdr(&self, id: PairId) -> Value {
        self.cells[id.0 as usize].cdr
    }

    #[inline]
    pub fn set_cdr(&mut self, id: PairId, value: Value) {
        self.cells[id.0 as usize].cdr = value;
    }

    #[inline]
    pub fn text(&self, id: TextId) -> &str {
        &self.texts[id.0 as usize]
    }

    #[inline]
    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0 as usize]
    }

    #[inline]
    pub fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id.0 as usize]
    }

    #[inline]
    pub fn closure(&self, id: ClosureId) -> &Closure {
        &self.closures[id.0 as usize]
    }

    /// Build a proper list from a slice of values.
    pub fn list(&mut self, values: &[Value]) -> Result<Value, Error> {
        values
            .iter()
            .rev()
            .try_fold(Value::Nil, |tail, &head| self.cons(head, tail))
    }

    /// Collect a proper list into a Vec. Returns None if not a proper list.
    pub fn list_to_vec(&self, list: Value) -> Option<Vec<Value>> {
        let mut result = Vec::new();
        let mut current = list;
        loop {
            match current {
                Value::Nil => return Some(result),
                Value::Pair(id) => {
                    result.push(self.car(id));
                    current = self.cdr(id);
                }
                _ => return None,
            }
        }
    }

    /// Destructure a proper list of exactly `N` elements.
    pub fn list_array<const N: usize>(&self, list: Value) -> Option<[Value; N]> {
        self.list_to_vec(list)?.try_into().ok()
    }

    /// Length of a proper list, None for an improper one.
    pub fn list_len(&self, list: Value) -> Option<usize> {
        let mut count = 0;
        let mut current = list;
        loop {
            match current {
                Value::Nil => return Some(count),
                Value::Pair(id) => {
                    count += 1;
                    current = self.cdr(id);
                }
                _ => return None,
            }
        }
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            pairs: self.cells.len(),
            texts: self.texts.len(),
            frames: self.frames.len(),
            closures: self.closures.len(),
        }
    }

    /// Free every block and the tracking storage, leaving an empty arena.
    pub fn release_all(&mut self) {
        debug!(released = %self.stats(), "releasing arena");
        self.cells = Vec::new();
        self.texts = Vec::new();
        self.frames = Vec::new();
        self.closures = Vec::new();
    }

    /// Release everything, then end the process with `status`.
    pub fn terminate(&mut self, status: i32) -> ! {
        self.release_all();
        std::process::exit(status)
    }
}
