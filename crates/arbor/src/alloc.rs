//! Logical offset allocator for the tensor arena.
//!
//! Offsets are handed out before any real memory exists: the allocator
//! tracks a growing high-water mark (`peak`) and a free list of reclaimed
//! ranges, and only acquires backing memory once, lazily, when the planner
//! asks for the materialized buffer. By that point `peak` is exactly the
//! arena size the lifetime-aware packing realized.
//!
//! Allocation is first-fit over the free list in ascending offset order;
//! frees coalesce with both neighbors, and free space that reaches `peak`
//! shrinks it back. The free list therefore never contains adjacent blocks
//! and never extends to `peak`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::GraphError;
use crate::runtime::{ArenaBuffer, Runtime};

/// Allocation granularity, the width of the widest supported element type.
pub const ARENA_ALIGNMENT: usize = 8;

/// First-fit free-list allocator over byte offsets in a single arena.
pub struct ArenaAllocator {
    runtime: Arc<dyn Runtime>,
    alignment: usize,
    /// Bytes currently allocated (diagnostic).
    used: usize,
    /// Lowest offset never used by any allocation; the final arena size.
    peak: usize,
    /// Free ranges keyed by offset; non-overlapping and non-adjacent.
    free_blocks: BTreeMap<usize, usize>,
    buffer: Option<Arc<ArenaBuffer>>,
}

/// Point-in-time usage snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaUsage {
    pub used: usize,
    pub peak: usize,
}

impl fmt::Display for ArenaUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "used {} bytes, peak {} bytes", self.used, self.peak)
    }
}

impl ArenaAllocator {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        ArenaAllocator {
            runtime,
            alignment: ARENA_ALIGNMENT,
            used: 0,
            peak: 0,
            free_blocks: BTreeMap::new(),
            buffer: None,
        }
    }

    /// Reserves `size` bytes and returns the chosen offset.
    ///
    /// The size is padded to the alignment. The lowest-offset free block
    /// large enough wins; without one the arena grows at `peak`.
    pub fn alloc(&mut self, size: usize) -> Result<usize, GraphError> {
        if self.buffer.is_some() {
            return Err(GraphError::ArenaMaterialized);
        }
        let size = self.aligned(size);

        let hit = self
            .free_blocks
            .iter()
            .find(|(_, &block_size)| block_size >= size)
            .map(|(&offset, &block_size)| (offset, block_size));
        if let Some((offset, block_size)) = hit {
            self.free_blocks.remove(&offset);
            if block_size > size {
                self.free_blocks.insert(offset + size, block_size - size);
            }
            self.used += size;
            return Ok(offset);
        }

        let offset = self.peak;
        self.peak += size;
        self.used += size;
        Ok(offset)
    }

    /// Returns a previously allocated range to the free list.
    pub fn free(&mut self, offset: usize, size: usize) -> Result<(), GraphError> {
        if self.buffer.is_some() {
            return Err(GraphError::ArenaMaterialized);
        }
        let size = self.aligned(size);
        if self.used < size {
            return Err(GraphError::OverFree {
                size,
                used: self.used,
            });
        }
        self.used -= size;
        self.insert_free_block(offset, size);
        Ok(())
    }

    fn insert_free_block(&mut self, mut offset: usize, mut size: usize) {
        // Merge with the immediate left neighbor.
        if let Some((&left_offset, &left_size)) = self.free_blocks.range(..offset).next_back() {
            if left_offset + left_size == offset {
                self.free_blocks.remove(&left_offset);
                offset = left_offset;
                size += left_size;
            }
        }
        // Merge with the immediate right neighbor.
        if let Some(&right_size) = self.free_blocks.get(&(offset + size)) {
            self.free_blocks.remove(&(offset + size));
            size += right_size;
        }
        self.free_blocks.insert(offset, size);

        // Only the top-most block can shrink the arena: absorb free blocks
        // flush with `peak` until the invariant holds again.
        while let Some((&top_offset, &top_size)) = self.free_blocks.iter().next_back() {
            if top_offset + top_size != self.peak {
                break;
            }
            self.peak = top_offset;
            self.free_blocks.remove(&top_offset);
        }
    }

    /// Acquires the backing buffer sized to `peak`, once; subsequent calls
    /// return the same buffer. After this no alloc/free is permitted.
    pub fn materialize(&mut self) -> Arc<ArenaBuffer> {
        if self.buffer.is_none() {
            let buffer = Arc::new(ArenaBuffer::allocate(Arc::clone(&self.runtime), self.peak));
            tracing::debug!(
                runtime = self.runtime.name(),
                bytes = self.peak,
                "arena materialized"
            );
            self.buffer = Some(buffer);
        }
        Arc::clone(self.buffer.as_ref().expect("arena buffer just set"))
    }

    pub fn is_materialized(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn usage(&self) -> ArenaUsage {
        ArenaUsage {
            used: self.used,
            peak: self.peak,
        }
    }

    /// Iterates the current free ranges as `(offset, size)` pairs in
    /// ascending offset order.
    pub fn free_blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.free_blocks.iter().map(|(&offset, &size)| (offset, size))
    }

    fn aligned(&self, size: usize) -> usize {
        size.div_ceil(self.alignment) * self.alignment
    }
}

impl fmt::Debug for ArenaAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("runtime", &self.runtime.name())
            .field("used", &self.used)
            .field("peak", &self.peak)
            .field("free_blocks", &self.free_blocks)
            .field("materialized", &self.buffer.is_some())
            .finish()
    }
}
