//! Request-scoped memory.
//!
//! All per-connection data lives in a single [`Arena`] reserved at start-up.
//! [`Buffer`]s are windows into it; everything allocated during a cycle is
//! reclaimed by restoring the arena to the checkpoint taken once
//! configuration is complete.

pub mod arena;
pub mod buffer;

pub use arena::{Arena, Checkpoint, Region};
pub use buffer::Buffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("cannot reserve {capacity} bytes")]
    Reserve { capacity: usize },
    #[error("out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },
    #[error("only the most recent allocation can grow")]
    NotMostRecent,
    #[error("formatted text does not fit in buffer")]
    FormatOverflow,
}
