//! Dynamic-lifetime root storage for a tracing collector
//!
//! The machine pins values it must retain across collections in root
//! slots. Slots are packed into chunks - size-aligned blocks carrying a
//! small header, an intrusive free list threaded through the slot
//! payloads and a high-water mark over untouched storage. Clients hold
//! move-only handles over slots; the collector enumerates every slot
//! ever handed out through [`roots::RootAllocator::mark_roots`].

pub mod block;
pub mod chunk;
pub mod handle;
pub mod roots;
pub mod value;
