//! # arenalloc - A Thread-Local Arena Allocator
//!
//! This crate provides a user-space allocator with `allocate` / `free` /
//! `resize` semantics built from three cooperating strategies:
//!
//! - **Arena bump allocation** into fixed 4 KiB arenas chained together
//! - **Exact size-class free lists** that recycle freed blocks LIFO
//! - **Dedicated mappings** for requests too big for any arena
//!
//! Every thread owns a fully independent [`Heap`]; nothing is shared and
//! nothing is locked.
//!
//! ## Overview
//!
//! ```text
//!   alloc_new(size)
//!        │
//!        ├── total_size!(size) > ARENA_SIZE ──────► dedicated mmap (large object)
//!        │
//!        ├── bucket[index(size)] not empty ──────► pop most recently freed block
//!        │
//!        └── otherwise ──────────────────────────► bump the tail arena
//!                                                  (map a new arena if full)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   arenalloc
//!   ├── align      - Alignment macros (align!, total_size!)
//!   ├── config     - Compile-time constants (ARENA_SIZE, MIN_ALLOC_SIZE, ...)
//!   ├── error      - AllocError and the per-thread last-error slot
//!   ├── mmap       - Scoped anonymous mappings (internal)
//!   ├── block      - Block header and validity tag (internal)
//!   ├── arena      - Arena chain: expand, bump, collapse, reset (internal)
//!   ├── free_list  - Exact size-class LIFO buckets (internal)
//!   ├── large      - Large-object path (internal)
//!   └── heap       - Heap, one thread's allocator
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use arenalloc::{alloc_del, alloc_new, alloc_resize};
//!
//! let mut ptr = alloc_new(1024);
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     ptr.write(42);
//!
//!     assert_eq!(alloc_resize(Some(&mut ptr), 2048), 0);
//!     assert_eq!(*ptr, 42);
//!
//!     alloc_del(ptr);
//! }
//! ```
//!
//! ## How It Works
//!
//! Each allocation is a header followed by its payload:
//!
//! ```text
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ data, size      │  │  ┌──────────────────────────┐  │
//!   │  │ arena (or null) │  │  │                          │  │
//!   │  │ state tag       │  │  │  align!(size) bytes      │  │
//!   │  │ valid links     │  │  │                          │  │
//!   │  │ free links      │  │  └──────────────────────────┘  │
//!   │  └─────────────────┘  │                                │
//!   │     HEADER_SIZE       │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! Freeing recovers the header by subtracting `HEADER_SIZE` and checks its
//! state tag. Arena blocks go onto the bucket for their rounded size, except
//! when the block is the only one its arena ever held and the previous arena
//! still has room: then the whole arena is unmapped instead.
//!
//! ## Limitations
//!
//! - **No coalescing**: a freed block only serves requests of the same
//!   rounded size
//! - **No compaction**: arenas are never defragmented
//! - **Thread confinement**: a pointer must be freed or resized on the thread
//!   that allocated it; violations are not detected
//! - **Unix-only**: requires `libc` and `mmap(2)`
//!
//! ## Safety
//!
//! The validity tag is a diagnostic, not a proof. It catches double frees and
//! most foreign pointers, but a foreign pointer preceded by bytes that happen
//! to hold the valid tag passes undetected.

pub mod align;
mod arena;
mod block;
pub mod config;
mod error;
mod free_list;
mod heap;
mod large;
mod mmap;

use std::cell::UnsafeCell;
use std::ptr;

pub use error::{AllocError, clear_last_error, last_error};
pub use heap::{Heap, HeapStats};

use error::set_last_error;

thread_local! {
  static HEAP: UnsafeCell<Heap> = UnsafeCell::new(Heap::new());
}

/// Runs `f` against the calling thread's heap, building it on first use.
fn with_heap<R>(
  f: impl FnOnce(&mut Heap) -> Result<R, AllocError>,
) -> Result<R, AllocError> {
  HEAP
    // The heap is only reachable from its own thread and `f` never re-enters
    // `with_heap`, so this is the only live reference.
    .try_with(|h| f(unsafe { &mut *h.get() }))
    .unwrap_or(Err(AllocError::invalid("thread allocator already torn down")))
}

fn report<R>(
  result: Result<R, AllocError>,
) -> Option<R> {
  result.map_err(set_last_error).ok()
}

/// Allocates `size` bytes on the calling thread's heap.
///
/// Returns null and records [`last_error`] if `size` is zero or the OS
/// refuses memory.
pub fn alloc_new(
  size: usize,
) -> *mut u8 {
  report(with_heap(|heap| heap.allocate(size)))
    .map(|p| p.as_ptr())
    .unwrap_or(ptr::null_mut())
}

/// Frees a pointer returned by [`alloc_new`] on this thread.
///
/// Null, already freed, and foreign pointers record [`last_error`].
///
/// # Safety
///
/// `ptr` must be null or have at least
/// [`HEADER_SIZE`](config::HEADER_SIZE) readable bytes in front of it, and
/// must not belong to another thread's heap.
pub unsafe fn alloc_del(
  ptr: *mut u8,
) {
  report(with_heap(|heap| unsafe { heap.free(ptr) }));
}

/// Moves the block in `slot` to a new block of `size` bytes, keeping the
/// leading `min(old, size)` bytes, and frees the old block.
///
/// Returns `0` on success and `1` on failure, recording [`last_error`]. A
/// `None` or null slot, or a zero `size`, fails with the slot unchanged.
///
/// # Safety
///
/// Same as [`alloc_del`] for `*slot`.
pub unsafe fn alloc_resize(
  slot: Option<&mut *mut u8>,
  size: usize,
) -> i32 {
  let result = match slot {
    Some(slot) => with_heap(|heap| unsafe { heap.resize(slot, size) }),
    None => Err(AllocError::invalid("ptr cannot be null")),
  };
  match report(result) {
    Some(()) => 0,
    None => 1,
  }
}

/// Size recorded for a live block, or `0` (recording [`last_error`]) if the
/// pointer fails the validity check.
///
/// # Safety
///
/// Same as [`alloc_del`].
pub unsafe fn alloc_usable_size(
  ptr: *mut u8,
) -> usize {
  report(with_heap(|heap| unsafe { heap.usable_size(ptr) })).unwrap_or(0)
}

/// Tears the calling thread's heap back down to its head arena and empties
/// every bucket. Returns `0` on success and `1` if an arena could not be
/// released.
///
/// Every pointer into an arena becomes dangling. Large objects are not
/// affected.
pub fn alloc_reset() -> i32 {
  match report(with_heap(Heap::reset)) {
    Some(()) => 0,
    None => 1,
  }
}

/// Bookkeeping snapshot of the calling thread's heap.
pub fn thread_stats() -> Option<HeapStats> {
  report(with_heap(|heap| Ok(heap.stats())))
}
