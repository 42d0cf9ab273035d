//! Fixed-capacity bump allocator.
//!
//! The arena reserves one contiguous region up front and hands out
//! [`Region`]s (offset/length pairs) carved from it. Nothing is freed
//! individually: a [`Checkpoint`] snapshots the cursor and
//! [`Arena::restore`] rewinds to it, reclaiming everything allocated since in
//! one step. Only the most recent allocation may grow in place.

use std::mem;
use std::ops::Range;

use super::MemoryError;

/// Allocation granularity. Every allocation starts on a pointer-aligned offset.
const ALIGN: usize = mem::align_of::<usize>();

/// A span of bytes owned by an [`Arena`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    offset: usize,
    len: usize,
}

impl Region {
    pub(crate) fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte of the region.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    /// Sub-span starting `start` bytes into this region.
    ///
    /// The caller guarantees `start + len <= self.len()`.
    pub(crate) fn slice(&self, start: usize, len: usize) -> Region {
        debug_assert!(start + len <= self.len);
        Region::new(self.offset + start, len)
    }
}

/// Snapshot of the arena cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

impl Checkpoint {
    /// Bytes in use when the checkpoint was taken.
    pub fn used(&self) -> usize {
        self.0
    }
}

pub struct Arena {
    memory: Box<[u8]>,
    cursor: usize,
    high_water: usize,
}

impl Arena {
    /// Reserves `capacity` bytes. The region is never resized afterwards.
    pub fn new(capacity: usize) -> Result<Self, MemoryError> {
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(capacity)
            .map_err(|_| MemoryError::Reserve { capacity })?;
        memory.resize(capacity, 0);

        Ok(Self {
            memory: memory.into_boxed_slice(),
            cursor: 0,
            high_water: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Bytes currently allocated, alignment padding included.
    pub fn used(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }

    /// Largest `used()` ever observed.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Bump-allocates `size` bytes.
    ///
    /// Existing regions are never moved. Fails with
    /// [`MemoryError::OutOfMemory`] when the aligned request does not fit.
    pub fn allocate(&mut self, size: usize) -> Result<Region, MemoryError> {
        let start = align_up(self.cursor);
        let end = start
            .checked_add(size)
            .filter(|end| *end <= self.capacity())
            .ok_or(MemoryError::OutOfMemory {
                requested: size,
                available: self.capacity().saturating_sub(start),
            })?;

        self.advance(end);
        Ok(Region::new(start, size))
    }

    /// Allocates a copy of `bytes`.
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> Result<Region, MemoryError> {
        let region = self.allocate(bytes.len())?;
        self.memory[region.range()].copy_from_slice(bytes);
        Ok(region)
    }

    /// Allocates a copy of bytes already held by the arena.
    pub fn duplicate(&mut self, source: Region) -> Result<Region, MemoryError> {
        let region = self.allocate(source.len())?;
        self.memory.copy_within(source.range(), region.offset());
        Ok(region)
    }

    /// Extends `region` in place by `extra` bytes.
    ///
    /// Only legal while `region` is the most recent allocation.
    pub fn grow(&mut self, region: &mut Region, extra: usize) -> Result<(), MemoryError> {
        if region.end() != self.cursor {
            return Err(MemoryError::NotMostRecent);
        }

        let end = self
            .cursor
            .checked_add(extra)
            .filter(|end| *end <= self.capacity())
            .ok_or(MemoryError::OutOfMemory {
                requested: extra,
                available: self.remaining(),
            })?;

        self.advance(end);
        region.len += extra;
        Ok(())
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.cursor)
    }

    /// Rewinds the cursor, reclaiming everything allocated after `checkpoint`.
    ///
    /// Regions handed out after the checkpoint must not be used afterwards.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        debug_assert!(checkpoint.0 <= self.cursor, "checkpoint is ahead of the cursor");
        self.cursor = checkpoint.0.min(self.cursor);
    }

    pub fn get(&self, region: Region) -> &[u8] {
        &self.memory[region.range()]
    }

    pub fn get_mut(&mut self, region: Region) -> &mut [u8] {
        &mut self.memory[region.range()]
    }

    /// Copies `source` to `dest_offset` within the arena. The ranges may overlap.
    pub(crate) fn copy_within(&mut self, source: Region, dest_offset: usize) {
        self.memory.copy_within(source.range(), dest_offset);
    }

    fn advance(&mut self, cursor: usize) {
        self.cursor = cursor;
        self.high_water = self.high_water.max(cursor);
    }
}

fn align_up(offset: usize) -> usize {
    (offset + ALIGN - 1) & !(ALIGN - 1)
}
