//! Compile-time allocator parameters.
//!
//! Every thread's [`Heap`](crate::Heap) shares these values; none of them
//! can be changed at runtime.

use std::mem;

use crate::block::BlockHeader;

/// Capacity of a single arena buffer in bytes.
pub const ARENA_SIZE: usize = 1024 * 4;

/// Minimum allocation granularity: the alignment of `max_align_t`.
///
/// Every request is rounded up to a multiple of this value, and every
/// payload pointer handed out is aligned to it.
pub const MIN_ALLOC_SIZE: usize = mem::align_of::<libc::max_align_t>();

/// Bytes reserved in front of every payload for its [`BlockHeader`].
pub const HEADER_SIZE: usize = crate::align!(mem::size_of::<BlockHeader>());

/// Number of exact size classes, one per rounded payload size that still
/// fits inside one arena.
pub const NUM_ALLOC_SIZES: usize = (ARENA_SIZE - HEADER_SIZE) / MIN_ALLOC_SIZE;

/// Offset below which an arena still has room for one minimum-size block.
///
/// Freeing the only block of an arena whose predecessor sits below this
/// offset unmaps the arena instead of free-listing the block. The exact
/// cutoff is a heuristic and may be tuned.
pub const RETIRE_THRESHOLD: usize = ARENA_SIZE - MIN_ALLOC_SIZE - HEADER_SIZE;

const _: () = assert!(MIN_ALLOC_SIZE.is_power_of_two());
const _: () = assert!(HEADER_SIZE + MIN_ALLOC_SIZE <= ARENA_SIZE);
