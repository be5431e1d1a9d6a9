//! Block recycling allocator
//!
//! `FreeList<T>` hands out heap blocks for fixed-size values (jobs, timer
//! events) and keeps a bounded stack of released blocks around so that a
//! steady alloc/free cycle stops touching the system allocator.
//!
//! There is no internal locking: the owner of the list provides
//! synchronization, typically by keeping the list inside the same mutex that
//! guards the queues the blocks travel through.

use std::fmt;
use std::ops::{Deref, DerefMut};

/// A heap block holding one value, obtained from [`FreeList::alloc`]
///
/// A block always holds a value while it is alive; the value is moved out
/// only by [`FreeList::free`] or [`Block::into_inner`], both of which consume
/// the block.
pub struct Block<T> {
    cell: Box<Option<T>>,
}

impl<T> Block<T> {
    /// Take the value out and drop the block without recycling it
    pub fn into_inner(mut self) -> T {
        match self.cell.take() {
            Some(value) => value,
            None => unreachable!("block vacated while still owned"),
        }
    }
}

impl<T> Deref for Block<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.cell.as_ref() {
            Some(value) => value,
            None => unreachable!("block vacated while still owned"),
        }
    }
}

impl<T> DerefMut for Block<T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.cell.as_mut() {
            Some(value) => value,
            None => unreachable!("block vacated while still owned"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Block<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Block").field(&**self).finish()
    }
}

/// Capped free list of heap blocks
pub struct FreeList<T> {
    spare: Vec<Box<Option<T>>>,
    max_free_len: usize,
    system_allocations: u64,
}

impl<T> FreeList<T> {
    /// Create a free list that keeps fewer than `max_free_len` spare blocks
    pub fn new(max_free_len: usize) -> Self {
        Self {
            spare: Vec::new(),
            max_free_len,
            system_allocations: 0,
        }
    }

    /// Store `value` in a block, reusing a spare block when one is available
    pub fn alloc(&mut self, value: T) -> Block<T> {
        match self.spare.pop() {
            Some(mut cell) => {
                *cell = Some(value);
                Block { cell }
            }
            None => {
                self.system_allocations += 1;
                Block {
                    cell: Box::new(Some(value)),
                }
            }
        }
    }

    /// Release a block, returning its value to the caller
    ///
    /// The emptied block goes onto the spare stack unless the stack is full,
    /// in which case it is returned to the system.
    pub fn free(&mut self, mut block: Block<T>) -> T {
        let value = match block.cell.take() {
            Some(value) => value,
            None => unreachable!("block vacated while still owned"),
        };

        if self.spare.len() + 1 < self.max_free_len {
            self.spare.push(block.cell);
        }

        value
    }

    /// Release a block and drop its value
    pub fn release(&mut self, block: Block<T>) {
        drop(self.free(block));
    }

    /// Number of spare blocks currently held
    pub fn spare(&self) -> usize {
        self.spare.len()
    }

    /// Cap on the spare stack
    pub fn max_free_len(&self) -> usize {
        self.max_free_len
    }

    /// Number of blocks obtained from the system allocator so far
    pub fn system_allocations(&self) -> u64 {
        self.system_allocations
    }

    /// Return every spare block to the system
    pub fn clear(&mut self) {
        self.spare.clear();
    }
}

impl<T> fmt::Debug for FreeList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeList")
            .field("spare", &self.spare.len())
            .field("max_free_len", &self.max_free_len)
            .field("system_allocations", &self.system_allocations)
            .finish()
    }
}
