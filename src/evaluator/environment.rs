//! Frames and the operations that walk them.
//!
//! A frame's bindings are an ordinary arena list of `(symbol . value)` pairs.
//! `define` conses a new binding onto the front, so a redefinition shadows
//! the older entry without removing it. `set!` overwrites the `cdr` of the
//! binding pair it finds, which every closure that captured the frame sees.

use std::collections::HashSet;

use crate::Error;
use crate::arena::{Arena, FrameId, PairId, TextId};
use crate::ast::Value;

pub fn new_frame(arena: &mut Arena, parent: Option<FrameId>) -> Result<FrameId, Error> {
    arena.alloc_frame(parent)
}

/// Prepend `(symbol . value)` to the frame's bindings.
pub fn define(
    arena: &mut Arena,
    symbol: TextId,
    value: Value,
    frame: FrameId,
) -> Result<(), Error> {
    let binding = arena.cons(Value::Symbol(symbol), value)?;
    let bindings = arena.frame(frame).bindings;
    let bindings = arena.cons(binding, bindings)?;
    arena.frame_mut(frame).bindings = bindings;
    Ok(())
}

/// Resolve `symbol` through the frame chain.
pub fn lookup(arena: &Arena, symbol: TextId, frame: FrameId) -> Result<Value, Error> {
    let name = arena.text(symbol);
    find_binding(arena, name, frame)
        .map(|binding| arena.cdr(binding))
        .ok_or_else(|| Error::UnboundVariable(name.to_owned()))
}

/// Overwrite the nearest existing binding of `symbol`, searching from `frame`
/// up to the root. Returns false if no frame binds it.
pub fn set_existing(arena: &mut Arena, symbol: TextId, value: Value, frame: FrameId) -> bool {
    match find_binding(arena, arena.text(symbol), frame) {
        Some(binding) => {
            arena.set_cdr(binding, value);
            true
        }
        None => false,
    }
}

/// The binding pair for `name` visible from `frame`, if any.
fn find_binding(arena: &Arena, name: &str, frame: FrameId) -> Option<PairId> {
    let mut current = Some(frame);
    while let Some(frame_id) = current {
        let frame = arena.frame(frame_id);
        let mut bindings = frame.bindings;
        while let Value::Pair(cell) = bindings {
            if let Value::Pair(binding) = arena.car(cell)
                && arena.car(binding).is_symbol_named(name, arena)
            {
                return Some(binding);
            }
            bindings = arena.cdr(cell);
        }
        current = frame.parent;
    }
    None
}

/// Every binding visible from `frame`, innermost first, with shadowed
/// entries dropped.
pub fn visible_bindings(arena: &Arena, frame: FrameId) -> Vec<(String, Value)> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    let mut current = Some(frame);
    while let Some(frame_id) = current {
        let frame = arena.frame(frame_id);
        let mut bindings = frame.bindings;
        while let Value::Pair(cell) = bindings {
            if let Value::Pair(binding) = arena.car(cell)
                && let Value::Symbol(symbol) = arena.car(binding)
            {
                let name = arena.text(symbol);
                if seen.insert(name) {
                    result.push((name.to_owned(), arena.cdr(binding)));
                }
            }
            bindings = arena.cdr(cell);
        }
        current = frame.parent;
    }
    result
}
