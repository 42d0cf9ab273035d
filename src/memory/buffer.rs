//! Growable byte window carved from an [`Arena`].
//!
//! ```text
//! 0 ........ start ........ len ........ capacity
//! | consumed |   pending    |    spare    |
//! ```
//!
//! Invariant: `start <= len <= capacity`.

use std::fmt;

use super::MemoryError;
use super::arena::{Arena, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffer {
    region: Region,
    len: usize,
    start: usize,
}

impl Buffer {
    pub fn allocate(arena: &mut Arena, capacity: usize) -> Result<Self, MemoryError> {
        Ok(Self {
            region: arena.allocate(capacity)?,
            len: 0,
            start: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the first byte not yet handled.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Bytes in `[start, len)`.
    pub fn pending_len(&self) -> usize {
        self.len - self.start
    }

    pub fn spare_len(&self) -> usize {
        self.capacity() - self.len
    }

    /// All filled bytes, consumed prefix included.
    pub fn filled(&self) -> Region {
        self.region.slice(0, self.len)
    }

    pub fn pending(&self) -> Region {
        self.region.slice(self.start, self.pending_len())
    }

    pub fn as_slice<'a>(&self, arena: &'a Arena) -> &'a [u8] {
        arena.get(self.filled())
    }

    pub fn pending_slice<'a>(&self, arena: &'a Arena) -> &'a [u8] {
        arena.get(self.pending())
    }

    /// Unfilled tail, for reading into directly. Pair with [`Buffer::commit`].
    pub fn spare_mut<'a>(&self, arena: &'a mut Arena) -> &'a mut [u8] {
        let spare = self.region.slice(self.len, self.spare_len());
        arena.get_mut(spare)
    }

    /// Marks `n` spare bytes as filled.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(n <= self.spare_len());
        self.len += n;
    }

    /// Marks `n` pending bytes as handled.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.pending_len());
        self.start += n;
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.start = 0;
    }

    /// Extends capacity in place. Only the arena's most recent allocation can grow.
    pub fn grow(&mut self, arena: &mut Arena, extra: usize) -> Result<(), MemoryError> {
        arena.grow(&mut self.region, extra)
    }

    /// Grows just enough for `additional` more bytes to fit.
    pub fn reserve(&mut self, arena: &mut Arena, additional: usize) -> Result<(), MemoryError> {
        let spare = self.spare_len();
        if additional > spare {
            self.grow(arena, additional - spare)?;
        }
        Ok(())
    }

    /// Appends `bytes`, growing first if needed. Nothing is written when growth is refused.
    pub fn append(&mut self, arena: &mut Arena, bytes: &[u8]) -> Result<(), MemoryError> {
        self.reserve(arena, bytes.len())?;
        self.spare_mut(arena)[..bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Appends bytes that already live in the arena (typically another buffer).
    pub fn append_region(&mut self, arena: &mut Arena, source: Region) -> Result<(), MemoryError> {
        self.reserve(arena, source.len())?;
        arena.copy_within(source, self.region.offset() + self.len);
        self.len += source.len();
        Ok(())
    }

    /// Formats into the spare capacity without growing.
    ///
    /// On overflow the buffer is left exactly as it was.
    pub fn append_fmt(&mut self, arena: &mut Arena, args: fmt::Arguments<'_>) -> Result<(), MemoryError> {
        let mut writer = SliceWriter {
            dest: self.spare_mut(arena),
            written: 0,
        };
        fmt::write(&mut writer, args).map_err(|_| MemoryError::FormatOverflow)?;
        self.len += writer.written;
        Ok(())
    }

    /// Moves the pending bytes to offset 0, reclaiming the consumed prefix.
    ///
    /// Returns `false` when there was nothing to reclaim.
    pub fn compact(&mut self, arena: &mut Arena) -> bool {
        if self.start == 0 {
            return false;
        }
        arena.copy_within(self.pending(), self.region.offset());
        self.len -= self.start;
        self.start = 0;
        true
    }
}

struct SliceWriter<'a> {
    dest: &'a mut [u8],
    written: usize,
}

impl fmt::Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.written + s.len();
        if end > self.dest.len() {
            return Err(fmt::Error);
        }
        self.dest[self.written..end].copy_from_slice(s.as_bytes());
        self.written = end;
        Ok(())
    }
}
