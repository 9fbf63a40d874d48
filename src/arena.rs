//! Arenas and the per-thread arena chain.
//!
//! ```text
//!   head (permanent)       mapped on demand        tail
//!   ┌──────────────┐ next ┌──────────────┐ next ┌──────────────┐
//!   │ H│data│H│data│ ───► │ H│data│      │ ───► │ H│data│H│    │ ──► null
//!   │              │ ◄─── │              │ ◄─── │         ▲    │
//!   └──────────────┘ prev └──────────────┘ prev └─────────┼────┘
//!                                                      offset
//! ```
//!
//! Only the tail arena is bump-allocated from. When it runs out of room a
//! new arena is mapped and linked after it.

use std::mem;
use std::ptr::{self, NonNull};

use crate::block::{BlockHeader, BlockState};
use crate::config::{ARENA_SIZE, MIN_ALLOC_SIZE, RETIRE_THRESHOLD};
use crate::error::AllocError;
use crate::free_list::FreeLists;
use crate::mmap::Mapping;
use crate::total_size;

#[repr(C, align(16))]
struct ArenaBuf([u8; ARENA_SIZE]);

const _: () = assert!(mem::align_of::<ArenaBuf>() >= MIN_ALLOC_SIZE);

/// A fixed-capacity buffer of bump-allocated headers and payloads.
///
/// An all-zero `Arena` is a valid empty arena.
#[repr(C)]
pub struct Arena {
  buff: ArenaBuf,
  /// Bytes consumed; never exceeds `ARENA_SIZE`.
  pub offset: usize,
  /// Most recently placed header.
  pub ptrs_tail: *mut BlockHeader,
  pub next: *mut Arena,
  pub prev: *mut Arena,
}

impl Arena {
  const fn new() -> Self {
    Self {
      buff: ArenaBuf([0; ARENA_SIZE]),
      offset: 0,
      ptrs_tail: ptr::null_mut(),
      next: ptr::null_mut(),
      prev: ptr::null_mut(),
    }
  }
}

/// The doubly-linked chain of arenas owned by one [`Heap`](crate::Heap).
pub struct ArenaChain {
  head: NonNull<Arena>,
  tail: *mut Arena,
  len: usize,
}

impl ArenaChain {
  pub fn new() -> Self {
    let head = NonNull::from(Box::leak(Box::new(Arena::new())));
    Self {
      head,
      tail: head.as_ptr(),
      len: 1,
    }
  }

  pub fn head(
    &self,
  ) -> *mut Arena {
    self.head.as_ptr()
  }

  #[cfg(test)]
  pub fn tail(
    &self,
  ) -> *mut Arena {
    self.tail
  }

  /// Number of arenas in the chain, head included.
  pub fn len(
    &self,
  ) -> usize {
    self.len
  }

  pub fn contains(
    &self,
    arena: *mut Arena,
  ) -> bool {
    self.iter().any(|a| a == arena)
  }

  /// Arenas from head to tail.
  pub fn iter(
    &self,
  ) -> impl Iterator<Item = *mut Arena> + '_ {
    let mut cur = self.head();
    std::iter::from_fn(move || {
      if cur.is_null() {
        return None;
      }
      let arena = cur;
      cur = unsafe { (*arena).next };
      Some(arena)
    })
  }

  pub fn bytes_used(
    &self,
  ) -> usize {
    self.iter().map(|a| unsafe { (*a).offset }).sum()
  }

  /// Maps a new arena and links it after the current tail.
  pub fn expand(
    &mut self,
  ) -> Result<(), AllocError> {
    let map = Mapping::new(mem::size_of::<Arena>())?;
    let arena = map.leak().as_ptr().cast::<Arena>();

    unsafe {
      ptr::write_bytes(arena, 0, 1);
      (*arena).prev = self.tail;
      (*self.tail).next = arena;
    }
    self.tail = arena;
    self.len += 1;

    log::debug!("[arenalloc] expand: new arena {:p}, chain length {}", arena, self.len);
    Ok(())
  }

  /// Bump-allocates a header and `size` payload bytes from the tail arena,
  /// expanding the chain first if the tail lacks room.
  pub fn arena_use(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::invalid("size cannot be 0"));
    }
    if size > ARENA_SIZE || total_size!(size) > ARENA_SIZE {
      return Err(AllocError::invalid("size does not fit in an arena"));
    }
    let total = total_size!(size);

    unsafe {
      if (*self.tail).offset + total > ARENA_SIZE {
        self.expand()?;
      }

      let arena = self.tail;
      let at = ptr::addr_of_mut!((*arena).buff)
        .cast::<u8>()
        .add((*arena).offset);
      let header = BlockHeader::init(at, size, arena);

      let prev = (*arena).ptrs_tail;
      (*header).prev_valid = prev;
      if !prev.is_null() {
        (*prev).next_valid = header;
      }
      (*arena).ptrs_tail = header;
      (*arena).offset += total;

      log::trace!(
        "[arenalloc] arena_use({size}) -> {:p} in {:p} (offset {})",
        (*header).data,
        arena,
        (*arena).offset
      );

      NonNull::new((*header).data).ok_or(AllocError::AllocationFailure { requested: size, errno: 0 })
    }
  }

  /// Whether freeing `header` should unmap its whole arena: it is the only
  /// block ever placed there, the arena is not the head, and the preceding
  /// arena still has room below [`RETIRE_THRESHOLD`].
  ///
  /// # Safety
  ///
  /// `header` must be a valid arena-backed header owned by this chain.
  pub unsafe fn is_retirable(
    &self,
    header: *mut BlockHeader,
  ) -> bool {
    unsafe {
      let arena = (*header).arena;
      if arena.is_null() || arena == self.head() {
        return false;
      }
      let tail = (*arena).ptrs_tail;
      let prev = (*arena).prev;
      !tail.is_null() && (*tail).prev_valid.is_null() && !prev.is_null() && (*prev).offset < RETIRE_THRESHOLD
    }
  }

  /// Unlinks a non-head arena and releases its mapping. Any of its blocks
  /// still sitting in `free` are removed from their buckets first.
  pub fn arena_del(
    &mut self,
    arena: *mut Arena,
    free: &mut FreeLists,
  ) -> Result<(), AllocError> {
    if arena.is_null() {
      return Err(AllocError::invalid("arena cannot be null"));
    }
    if arena == self.head() {
      log::warn!("[arenalloc] refusing to delete the head arena");
      return Err(AllocError::invalid("head arena is permanent"));
    }
    if !self.contains(arena) {
      return Err(AllocError::invalid("arena is not in this chain"));
    }

    unsafe {
      let mut cur = (*arena).ptrs_tail;
      while !cur.is_null() {
        if (*cur).state() == Some(BlockState::Free) {
          free.unlink(cur);
        }
        cur = (*cur).prev_valid;
      }

      self.unlink_and_release(arena)
    }
  }

  /// # Safety
  ///
  /// `arena` must be a mapped, non-head member of this chain.
  unsafe fn unlink_and_release(
    &mut self,
    arena: *mut Arena,
  ) -> Result<(), AllocError> {
    unsafe {
      let prev = (*arena).prev;
      let next = (*arena).next;

      (*prev).next = next;
      if next.is_null() {
        self.tail = prev;
      } else {
        (*next).prev = prev;
      }
      self.len -= 1;

      log::debug!("[arenalloc] arena_del: {:p}, chain length {}", arena, self.len);

      let map = Mapping::from_raw(NonNull::new_unchecked(arena.cast()), mem::size_of::<Arena>());
      map.release()
    }
  }

  /// Unwinds the chain back to the head alone, zeroes the head, and clears
  /// every bucket of `free`.
  ///
  /// Every arena is unlinked even if releasing one fails; the first failure
  /// is returned.
  pub fn reset(
    &mut self,
    free: &mut FreeLists,
  ) -> Result<(), AllocError> {
    let mut result = Ok(());

    while self.tail != self.head() {
      let arena = self.tail;
      if let Err(err) = unsafe { self.unlink_and_release(arena) } {
        if result.is_ok() {
          result = Err(err);
        }
      }
    }

    unsafe { ptr::write_bytes(self.head(), 0, 1) };
    free.clear();

    log::debug!("[arenalloc] reset");
    result
  }
}

impl Default for ArenaChain {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for ArenaChain {
  fn drop(
    &mut self,
  ) {
    let mut free = FreeLists::new();
    let _ = self.reset(&mut free);
    drop(unsafe { Box::from_raw(self.head.as_ptr()) });
  }
}
