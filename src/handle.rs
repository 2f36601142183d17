//! Move-only handles over root slots
//!
//! A handle owns exactly one slot. Dropping it recovers the owning
//! chunk by alignment arithmetic and pushes the slot onto that chunk's
//! free list. Handles borrow the allocator, so the compiler enforces
//! that every handle is gone before the chunks are torn down.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::chunk::{Chunk, Slot};
use crate::roots::RootAllocator;
use crate::value::Value;

/// An owning handle over a single root slot
///
/// A valid handle owns its slot; an invalid one (default-constructed,
/// or emptied with `std::mem::take`) owns nothing and cannot produce a
/// value. Handles move - the compiler retires the source - and never
/// copy: each live slot has exactly one owner.
pub struct RootHandle<'heap> {
    /// The slot where the pinned value lives
    slot: Option<NonNull<Slot>>,
    /// Handles may not outlive the allocator's chunks
    _heap: PhantomData<&'heap RootAllocator>,
}

impl<'heap> RootHandle<'heap> {
    pub(crate) fn new(slot: NonNull<Slot>) -> Self {
        RootHandle {
            slot: Some(slot),
            _heap: PhantomData,
        }
    }

    /// Whether this handle owns a slot
    pub fn valid(&self) -> bool {
        self.slot.is_some()
    }

    /// A copy of the pinned value
    ///
    /// Panics if the handle is invalid.
    pub fn get(&self) -> Value {
        self.value().clone()
    }

    /// Borrow the pinned value for the handle's lifetime
    ///
    /// Panics if the handle is invalid.
    pub fn value(&self) -> &Value {
        let slot = self.slot.expect("invalid root handle");
        unsafe { &*slot.as_ptr() }.value()
    }

    /// Borrow the pinned value mutably for the handle's lifetime
    ///
    /// Panics if the handle is invalid.
    pub fn value_mut(&mut self) -> &mut Value {
        let slot = self.slot.expect("invalid root handle");
        unsafe { &mut *slot.as_ptr() }.value_mut()
    }

    /// Return the slot to its chunk early, leaving the handle invalid
    pub fn release(&mut self) {
        if let Some(slot) = self.slot.take() {
            let mut chunk = Chunk::for_slot(slot);
            unsafe { chunk.as_mut() }.free(slot);
        }
    }

    #[cfg(test)]
    pub(crate) fn slot_ptr(&self) -> Option<NonNull<Slot>> {
        self.slot
    }
}

impl Default for RootHandle<'_> {
    /// An invalid handle owning no slot
    fn default() -> Self {
        RootHandle {
            slot: None,
            _heap: PhantomData,
        }
    }
}

impl Drop for RootHandle<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub mod tests {

    use super::*;
    use crate::roots::RootAllocator;

    #[test]
    pub fn test_default_is_invalid() {
        let handle = RootHandle::default();
        assert!(!handle.valid());
    }

    #[test]
    #[should_panic(expected = "invalid root handle")]
    pub fn test_invalid_handle_has_no_value() {
        let handle = RootHandle::default();
        handle.value();
    }

    #[test]
    pub fn test_release_returns_slot() {
        let allocator = RootAllocator::new();
        let mut handle = allocator.allocate(Value::num(9));
        assert_eq!(allocator.live_count(), 1);

        handle.release();
        assert!(!handle.valid());
        assert_eq!(allocator.live_count(), 0);

        // releasing twice is a no-op
        handle.release();
        assert_eq!(allocator.live_count(), 0);
    }

    #[test]
    pub fn test_drop_returns_slot() {
        let allocator = RootAllocator::new();
        {
            let _handle = allocator.allocate(Value::num(9));
            assert_eq!(allocator.live_count(), 1);
        }
        assert_eq!(allocator.live_count(), 0);
    }

    #[test]
    pub fn test_mutation_through_handle() {
        let allocator = RootAllocator::new();
        let mut handle = allocator.allocate(Value::Bool(false));
        *handle.value_mut() = Value::num(42);
        assert_eq!(handle.get(), Value::num(42));
    }
}
