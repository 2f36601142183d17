//! Blocks of memory acquired from the OS
//!
//! Blocks are aligned to their own (power of two) byte size so that any
//! interior pointer can recover the block base by masking.

use std::alloc::{alloc, dealloc, Layout};
use std::mem::forget;
use std::ptr::NonNull;

use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum BlockError {
    /// Block sizes must be powers of two
    #[error("block size is not a power of two")]
    BadSize,
    /// The upstream allocator refused the request
    #[error("out of memory")]
    OOM,
}

/// A block of memory allocated by the OS / upstream allocator, aligned
/// to its size
#[derive(Debug)]
pub struct Block {
    /// Pointer to memory
    ptr: NonNull<u8>,
    /// Size (and alignment) of block
    size: usize,
}

impl Block {
    /// Allocate a block of `size` bytes aligned to `size`
    pub fn new(size: usize) -> Result<Self, BlockError> {
        if !size.is_power_of_two() {
            Err(BlockError::BadSize)
        } else {
            Ok(Block {
                ptr: Self::alloc_block(size)?,
                size,
            })
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Relinquish ownership, returning the base pointer.
    ///
    /// The memory must eventually be handed back via `from_raw` so it
    /// is returned to the OS with the matching layout.
    pub fn into_raw(self) -> NonNull<u8> {
        let ptr = self.ptr;
        forget(self);
        ptr
    }

    /// Re-adopt memory previously released with `into_raw`.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `into_raw` on a block of exactly
    /// `size` bytes and must not be adopted twice.
    pub unsafe fn from_raw(ptr: NonNull<u8>, size: usize) -> Self {
        Block { ptr, size }
    }

    fn alloc_block(size: usize) -> Result<NonNull<u8>, BlockError> {
        let layout = Layout::from_size_align(size, size).map_err(|_| BlockError::BadSize)?;
        NonNull::new(unsafe { alloc(layout) }).ok_or(BlockError::OOM)
    }

    fn dealloc_block(ptr: NonNull<u8>, size: usize) {
        unsafe { dealloc(ptr.as_ptr(), Layout::from_size_align_unchecked(size, size)) }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        Self::dealloc_block(self.ptr, self.size);
    }
}
