use std::ptr::{self, NonNull};

use crate::arena::ArenaChain;
use crate::block::valid_header;
use crate::error::AllocError;
use crate::free_list::{self, FreeLists};
use crate::large;

/// Snapshot of a heap's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  /// Arenas in the chain, head included.
  pub arenas: usize,
  /// Bytes bump-allocated across all arenas.
  pub arena_bytes_used: usize,
  /// Blocks waiting in size-class buckets.
  pub free_blocks: usize,
}

/// One thread's allocator: an arena chain plus its size-class free lists.
///
/// A `Heap` is `!Send`; pointers it hands out must be freed and resized
/// through the same heap.
pub struct Heap {
  pub(crate) chain: ArenaChain,
  pub(crate) free: FreeLists,
}

impl Heap {
  pub fn new() -> Self {
    Self {
      chain: ArenaChain::new(),
      free: FreeLists::new(),
    }
  }

  /// Returns a pointer to `size` usable bytes aligned to
  /// [`MIN_ALLOC_SIZE`](crate::config::MIN_ALLOC_SIZE).
  ///
  /// Requests too big for an arena get their own mapping; otherwise a freed
  /// block of the same rounded size is reused before bump-allocating.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::invalid("size cannot be 0"));
    }

    if free_list::index(size).is_none() {
      return large::map_use(size);
    }
    if self.free.has(size) {
      return self.free_ptr_use(size);
    }
    self.chain.arena_use(size)
  }

  /// Releases a block.
  ///
  /// # Safety
  ///
  /// `ptr` must be null, or have at least
  /// [`HEADER_SIZE`](crate::config::HEADER_SIZE) readable bytes in front of
  /// it. Pointers returned by this heap and not yet freed always qualify.
  /// Double frees and foreign pointers are rejected on a best-effort basis.
  pub unsafe fn free(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), AllocError> {
    if ptr.is_null() {
      return Err(AllocError::invalid("ptr cannot be null"));
    }
    unsafe { self.ptr_free(ptr) }
  }

  /// Moves the block in `slot` to a fresh block of `size` bytes, preserving
  /// the leading `min(old, size)` bytes, then frees the old block.
  ///
  /// On failure before the copy `slot` is left unchanged.
  ///
  /// # Safety
  ///
  /// Same as [`Heap::free`] for `*slot`.
  pub unsafe fn resize(
    &mut self,
    slot: &mut *mut u8,
    size: usize,
  ) -> Result<(), AllocError> {
    if size == 0 {
      return Err(AllocError::invalid("size cannot be 0"));
    }
    let old = *slot;
    let header = unsafe { valid_header(old)? };
    let old_size = unsafe { (*header).size };

    let new = self.allocate(size)?;
    unsafe { ptr::copy_nonoverlapping(old, new.as_ptr(), old_size.min(size)) };
    *slot = new.as_ptr();

    log::trace!("[arenalloc] resize {:p} ({old_size}) -> {:p} ({size})", old, new);

    unsafe { self.ptr_free(old) }
  }

  /// Requested size recorded for a live block.
  ///
  /// # Safety
  ///
  /// Same as [`Heap::free`].
  pub unsafe fn usable_size(
    &self,
    ptr: *mut u8,
  ) -> Result<usize, AllocError> {
    unsafe {
      let header = valid_header(ptr)?;
      Ok((*header).size)
    }
  }

  /// Releases every arena but the head, zeroes the head, and empties every
  /// bucket. Pointers into arenas become dangling; large objects stay mapped
  /// and freeable.
  pub fn reset(
    &mut self,
  ) -> Result<(), AllocError> {
    self.chain.reset(&mut self.free)
  }

  pub fn arena_count(
    &self,
  ) -> usize {
    self.chain.len()
  }

  /// Number of freed blocks that could serve a request of `size` bytes.
  pub fn free_count(
    &self,
    size: usize,
  ) -> usize {
    self.free.len(size)
  }

  pub fn stats(
    &self,
  ) -> HeapStats {
    HeapStats {
      arenas: self.chain.len(),
      arena_bytes_used: self.chain.bytes_used(),
      free_blocks: self.free.total(),
    }
  }

  /// Pops the most recently freed block of `size`'s class.
  pub(crate) fn free_ptr_use(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::invalid("size cannot be 0"));
    }
    let header = self
      .free
      .pop(size)
      .ok_or(AllocError::AllocationFailure { requested: size, errno: 0 })?;

    unsafe {
      (*header).size = size;
      log::trace!("[arenalloc] free_ptr_use({size}) -> {:p}", (*header).data);
      NonNull::new((*header).data).ok_or(AllocError::AllocationFailure { requested: size, errno: 0 })
    }
  }

  /// # Safety
  ///
  /// Same as [`Heap::free`].
  pub(crate) unsafe fn ptr_free(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), AllocError> {
    unsafe {
      let header = valid_header(ptr)?;

      if (*header).is_large() {
        return large::map_free(header);
      }

      if self.chain.is_retirable(header) {
        log::debug!("[arenalloc] ptr_free({:p}) retires its arena", ptr);
        return self.chain.arena_del((*header).arena, &mut self.free);
      }

      log::trace!("[arenalloc] ptr_free({:p}) size {}", ptr, (*header).size);
      self.free.push(header);
      Ok(())
    }
  }
}

impl Default for Heap {
  fn default() -> Self {
    Self::new()
  }
}
