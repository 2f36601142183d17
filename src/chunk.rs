//! Chunks of root slot storage
//!
//! A chunk is a single size-aligned block holding a small header and a
//! trailing array of value slots. Byte size equals alignment, so the
//! chunk owning any slot is recoverable by masking the slot address.
//! Freed slots thread into a per-chunk free list through their own
//! payload storage, using the value encoding's native-pointer variant.

use std::fmt;
use std::mem::{align_of, needs_drop, size_of};
use std::process::abort;
use std::ptr::{self, NonNull};
use std::slice;

use crate::block::Block;
use crate::value::Value;

/// 1K chunk
pub const CHUNK_SIZE_BITS: usize = 10;
/// 1K chunk
pub const CHUNK_BYTES: usize = 1 << CHUNK_SIZE_BITS;
/// Alignment equals byte size so slot addresses mask down to their chunk
pub const CHUNK_ALIGN: usize = CHUNK_BYTES;

/// Storage for a single pinned value
///
/// While free, the slot's value is a native-pointer encoding of the
/// next free slot in the same chunk (or null for the last). Slots are
/// reached only through raw pointers into chunk storage; they never
/// move and are never copied.
pub struct Slot {
    value: Value,
}

impl Slot {
    pub(crate) fn new(value: Value) -> Self {
        Slot { value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }
}

/// Byte offset of the slot array within a chunk
const SLOTS_OFFSET: usize =
    (size_of::<Chunk>() + align_of::<Slot>() - 1) & !(align_of::<Slot>() - 1);

/// Slots in each chunk's trailing array
pub const SLOTS_PER_CHUNK: usize = (CHUNK_BYTES - SLOTS_OFFSET) / size_of::<Slot>();

// Byte size may not exceed alignment or slots would mask down to the
// wrong chunk, and header plus slot array must fit the block. Slot
// values must be plain data: allocation reuses slot storage without
// running destructors.
const _: () = assert!(CHUNK_BYTES <= CHUNK_ALIGN);
const _: () = assert!(SLOTS_OFFSET + SLOTS_PER_CHUNK * size_of::<Slot>() <= CHUNK_BYTES);
const _: () = assert!(SLOTS_PER_CHUNK > 0);
const _: () = assert!(!needs_drop::<Value>());

/// Header of a chunk of slots
///
/// Sits at the base of the aligned block with the slot array following.
/// Slot storage beyond the high-water mark is deliberately left
/// uninitialised and must never be read.
#[repr(C)]
pub struct Chunk {
    /// Next chunk in the allocator's list
    pub(crate) next: Option<NonNull<Chunk>>,
    /// First slot of the free list, threaded through slot values
    free_head: Option<NonNull<Slot>>,
    /// Slots below this index have been handed out at least once
    high_water: u32,
}

impl Chunk {
    /// Allocate an aligned block and plant a chunk header at its base.
    ///
    /// Aborts the process if the block allocation fails: this storage
    /// holds the machine's root set and cannot degrade.
    pub(crate) fn create() -> NonNull<Chunk> {
        let block = Block::new(CHUNK_BYTES).unwrap_or_else(|e| {
            eprintln!("root chunk allocation failed: {}", e);
            abort()
        });
        let header = block.into_raw().cast::<Chunk>();
        unsafe {
            ptr::write(
                header.as_ptr(),
                Chunk {
                    next: None,
                    free_head: None,
                    high_water: 0,
                },
            );
        }
        header
    }

    /// Tear down a chunk produced by `create`, returning its memory.
    ///
    /// # Safety
    ///
    /// `chunk` must have come from `create`, must not be used again,
    /// and no slot in it may be referenced afterwards.
    pub(crate) unsafe fn destroy(chunk: NonNull<Chunk>) {
        ptr::drop_in_place(chunk.as_ptr());
        drop(Block::from_raw(chunk.cast::<u8>(), CHUNK_BYTES));
    }

    /// Base of the trailing slot array
    fn slot_base(&self) -> *mut Slot {
        (self as *const Chunk as usize + SLOTS_OFFSET) as *mut Slot
    }

    /// Hand out a slot, or None if the chunk is full.
    ///
    /// Freed slots are reused (most recently freed first) before the
    /// high-water mark advances over untouched storage. The value in
    /// the returned slot is uninitialised; the caller must write it
    /// before exposing the slot.
    pub fn try_allocate(&mut self) -> Option<NonNull<Slot>> {
        if let Some(head) = self.free_head {
            let link = unsafe { head.as_ref() }.value().as_native_ptr();
            debug_assert!(link.is_some(), "free slot without a link encoding");
            self.free_head = link.and_then(|p| NonNull::new(p as *mut Slot));
            debug_assert!(
                self.free_head.map_or(true, |s| self.contains(s)),
                "corrupt free list"
            );
            Some(head)
        } else if (self.high_water as usize) < SLOTS_PER_CHUNK {
            let slot = unsafe { self.slot_base().add(self.high_water as usize) };
            self.high_water += 1;
            NonNull::new(slot)
        } else {
            None
        }
    }

    /// Push a slot onto the chunk's free list.
    ///
    /// The slot must belong to this chunk and must not already be on
    /// the free list (an undetected double free would produce a cycle).
    pub fn free(&mut self, slot: NonNull<Slot>) {
        debug_assert!(self.contains(slot), "slot belongs to another chunk");
        let link = self
            .free_head
            .map_or(ptr::null_mut(), |s| s.as_ptr() as *mut ());
        unsafe { ptr::write(slot.as_ptr(), Slot::new(Value::native_ptr(link))) };
        self.free_head = Some(slot);
    }

    /// Whether the slot lies within this chunk's slot array
    pub fn contains(&self, slot: NonNull<Slot>) -> bool {
        let base = self.slot_base() as usize;
        let end = base + SLOTS_PER_CHUNK * size_of::<Slot>();
        let addr = slot.as_ptr() as usize;
        addr >= base && addr < end
    }

    /// Recover a slot's owning chunk by alignment arithmetic
    pub fn for_slot(slot: NonNull<Slot>) -> NonNull<Chunk> {
        let addr = slot.as_ptr() as usize;
        let chunk = (addr & !(CHUNK_BYTES - 1)) as *mut Chunk;
        let chunk = unsafe { NonNull::new_unchecked(chunk) };
        debug_assert!(
            unsafe { chunk.as_ref() }.contains(slot),
            "recovered chunk does not contain the slot"
        );
        chunk
    }

    /// Every slot ever handed out, in index order.
    ///
    /// Free slots are included; they carry the native-pointer tag that
    /// marking treats as a non-reference. Slots beyond the high-water
    /// mark hold undefined bytes and are never visited.
    pub fn live_slots_mut(&mut self) -> &mut [Slot] {
        unsafe { slice::from_raw_parts_mut(self.slot_base(), self.high_water as usize) }
    }

    /// Count of slots ever handed out
    pub fn high_water(&self) -> usize {
        self.high_water as usize
    }

    /// Length of the free list
    pub fn free_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.free_head;
        while let Some(slot) = cursor {
            debug_assert!(self.contains(slot), "corrupt free list");
            count += 1;
            cursor = unsafe { slot.as_ref() }
                .value()
                .as_native_ptr()
                .and_then(|p| NonNull::new(p as *mut Slot));
        }
        count
    }

    /// Slots handed out and not since freed
    pub fn live_count(&self) -> usize {
        self.high_water() - self.free_count()
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:p} {}/{} free {}",
            self,
            self.high_water,
            SLOTS_PER_CHUNK,
            self.free_count()
        )
    }
}
