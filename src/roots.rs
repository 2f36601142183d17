//! The root allocator
//!
//! Owns the chunk list. Allocation tries the head chunk first; the
//! slow path walks the rest of the list splicing the first chunk with
//! capacity to the front, or grows the list by one chunk. The
//! collector enumerates roots through `mark_roots`.

use std::cell::UnsafeCell;
use std::ptr::{self, NonNull};

use crate::chunk::{Chunk, Slot};
use crate::handle::RootHandle;
use crate::value::Value;

/// Visitor for root enumeration
///
/// During collection every slot ever handed out is offered to the
/// acceptor. Free slots are offered too; they carry the native-pointer
/// tag and must be treated as non-references.
pub trait RootAcceptor {
    fn accept(&mut self, value: &mut Value);
}

/// Chunk usage statistics
#[derive(Debug)]
pub struct RootStats {
    /// Chunks in the list
    pub chunks_allocated: usize,
    /// Slots pinning client values
    pub live_roots: usize,
    /// Freed slots awaiting reuse
    pub free_slots: usize,
}

/// Allocator for dynamic-lifetime roots
///
/// Hands out move-only [`RootHandle`]s over stable slots. The
/// allocator and all its handles belong to the machine's thread;
/// nothing here is Send or Sync.
pub struct RootAllocator {
    state: UnsafeCell<AllocatorState>,
}

/// The chunk list behind the allocator facade
struct AllocatorState {
    /// Head of the singly linked chunk list
    chunks: Option<NonNull<Chunk>>,
}

impl Default for RootAllocator {
    fn default() -> Self {
        RootAllocator::new()
    }
}

impl RootAllocator {
    pub fn new() -> Self {
        RootAllocator {
            state: UnsafeCell::new(AllocatorState { chunks: None }),
        }
    }

    /// Allocate a root pinning `value`.
    ///
    /// Infallible from the caller's point of view; growing the chunk
    /// list aborts the process on memory exhaustion.
    pub fn allocate(&self, value: Value) -> RootHandle<'_> {
        let state = unsafe { &mut *self.state.get() };
        let slot = state.allocate_slot();
        unsafe { ptr::write(slot.as_ptr(), Slot::new(value)) };
        RootHandle::new(slot)
    }

    /// Allocate a root pinning the default (unit) value
    pub fn allocate_default(&self) -> RootHandle<'_> {
        self.allocate(Value::default())
    }

    /// Offer every slot ever handed out to the acceptor, in chunk-list
    /// order.
    ///
    /// The machine must be paused for the duration: no handle may be
    /// created, dropped or written through while enumeration runs.
    pub fn mark_roots(&self, acceptor: &mut dyn RootAcceptor) {
        let state = unsafe { &mut *self.state.get() };
        let mut cursor = state.chunks;
        while let Some(mut c) = cursor {
            cursor = unsafe { c.as_ref() }.next;
            for slot in unsafe { c.as_mut() }.live_slots_mut() {
                acceptor.accept(slot.value_mut());
            }
        }
    }

    /// Roots currently allocated and not yet released
    pub fn live_count(&self) -> usize {
        self.stats().live_roots
    }

    /// Statistics from a walk of the chunk list
    pub fn stats(&self) -> RootStats {
        let state = unsafe { &*self.state.get() };
        let mut stats = RootStats {
            chunks_allocated: 0,
            live_roots: 0,
            free_slots: 0,
        };
        let mut cursor = state.chunks;
        while let Some(c) = cursor {
            let chunk = unsafe { c.as_ref() };
            stats.chunks_allocated += 1;
            stats.live_roots += chunk.live_count();
            stats.free_slots += chunk.free_count();
            cursor = chunk.next;
        }
        stats
    }
}

impl AllocatorState {
    /// Fast path: the head chunk usually has capacity
    fn allocate_slot(&mut self) -> NonNull<Slot> {
        self.chunks
            .and_then(|mut head| unsafe { head.as_mut() }.try_allocate())
            .unwrap_or_else(|| self.allocate_slot_slow())
    }

    /// Walk the remaining chunks for capacity, splicing any winner to
    /// the head so subsequent allocations hit it first; failing that,
    /// grow the list by one chunk.
    fn allocate_slot_slow(&mut self) -> NonNull<Slot> {
        let mut prev: Option<NonNull<Chunk>> = None;
        let mut cursor = self.chunks;
        while let Some(mut c) = cursor {
            let chunk = unsafe { c.as_mut() };
            if let Some(slot) = chunk.try_allocate() {
                if let Some(mut p) = prev {
                    unsafe { p.as_mut() }.next = chunk.next;
                    chunk.next = self.chunks;
                    self.chunks = Some(c);
                }
                return slot;
            }
            prev = cursor;
            cursor = chunk.next;
        }

        let mut chunk = Chunk::create();
        unsafe { chunk.as_mut() }.next = self.chunks;
        self.chunks = Some(chunk);
        unsafe { chunk.as_mut() }
            .try_allocate()
            .expect("fresh chunk must have a slot")
    }
}

impl Drop for AllocatorState {
    fn drop(&mut self) {
        let mut cursor = self.chunks.take();
        while let Some(chunk) = cursor {
            cursor = unsafe { chunk.as_ref() }.next;
            unsafe { Chunk::destroy(chunk) };
        }
    }
}

#[cfg(test)]
pub mod tests {

    use super::*;
    use crate::chunk::SLOTS_PER_CHUNK;

    #[test]
    pub fn test_single_chunk_until_full() {
        let allocator = RootAllocator::new();
        let handles: Vec<_> = (0..SLOTS_PER_CHUNK)
            .map(|i| allocator.allocate(Value::num(i as i64)))
            .collect();

        let stats = allocator.stats();
        assert_eq!(stats.chunks_allocated, 1);
        assert_eq!(stats.live_roots, SLOTS_PER_CHUNK);
        assert_eq!(stats.free_slots, 0);
        drop(handles);

        let stats = allocator.stats();
        assert_eq!(stats.chunks_allocated, 1);
        assert_eq!(stats.live_roots, 0);
        assert_eq!(stats.free_slots, SLOTS_PER_CHUNK);
    }

    #[test]
    pub fn test_grows_by_one_chunk() {
        let allocator = RootAllocator::new();
        let _handles: Vec<_> = (0..SLOTS_PER_CHUNK + 1)
            .map(|i| allocator.allocate(Value::num(i as i64)))
            .collect();
        assert_eq!(allocator.stats().chunks_allocated, 2);
    }

    #[test]
    pub fn test_lifo_reuse_through_handles() {
        let allocator = RootAllocator::new();
        let _a = allocator.allocate(Value::num(1));
        let mut b = allocator.allocate(Value::num(2));
        let _c = allocator.allocate(Value::num(3));

        let freed = b.slot_ptr().unwrap();
        b.release();

        let d = allocator.allocate(Value::num(4));
        assert_eq!(d.slot_ptr().unwrap(), freed);
    }

    #[test]
    pub fn test_move_to_front() {
        let allocator = RootAllocator::new();
        let mut handles: Vec<_> = (0..2 * SLOTS_PER_CHUNK)
            .map(|i| allocator.allocate(Value::num(i as i64)))
            .collect();
        assert_eq!(allocator.stats().chunks_allocated, 2);

        // the earliest handles live in the tail chunk
        let tail = Chunk::for_slot(handles[0].slot_ptr().unwrap());
        let head = unsafe { &*allocator.state.get() }.chunks.unwrap();
        assert_ne!(tail, head);

        // free one tail slot; the next allocation must come from the
        // tail chunk and splice it to the head
        let freed = handles[0].slot_ptr().unwrap();
        drop(handles.remove(0));

        let fresh = allocator.allocate(Value::Bool(true));
        assert_eq!(fresh.slot_ptr().unwrap(), freed);
        assert_eq!(Chunk::for_slot(freed), tail);

        let head = unsafe { &*allocator.state.get() }.chunks.unwrap();
        assert_eq!(head, tail);
        handles.push(fresh);
    }

    #[test]
    pub fn test_live_count_tracks_handles() {
        let allocator = RootAllocator::new();
        let mut handles = Vec::new();
        for wave in 0..4i64 {
            for i in 0..100i64 {
                handles.push(allocator.allocate(Value::num(wave * 100 + i)));
            }
            assert_eq!(allocator.live_count(), handles.len());

            handles.truncate(handles.len() / 2);
            assert_eq!(allocator.live_count(), handles.len());
        }
    }

    #[test]
    pub fn test_mark_roots_visits_chunks_in_list_order() {
        struct Collecting {
            chunks_seen: Vec<NonNull<Chunk>>,
        }

        impl RootAcceptor for Collecting {
            fn accept(&mut self, value: &mut Value) {
                let slot = NonNull::from(&*value).cast::<Slot>();
                let chunk = Chunk::for_slot(slot);
                if self.chunks_seen.last() != Some(&chunk) {
                    self.chunks_seen.push(chunk);
                }
            }
        }

        let allocator = RootAllocator::new();
        let _handles: Vec<_> = (0..2 * SLOTS_PER_CHUNK)
            .map(|i| allocator.allocate(Value::num(i as i64)))
            .collect();

        let mut acceptor = Collecting {
            chunks_seen: Vec::new(),
        };
        allocator.mark_roots(&mut acceptor);

        let head = unsafe { &*allocator.state.get() }.chunks.unwrap();
        assert_eq!(acceptor.chunks_seen.len(), 2);
        assert_eq!(acceptor.chunks_seen[0], head);
    }
}
