use std::ptr;

use crate::arena::Arena;
use crate::config::HEADER_SIZE;
use crate::error::AllocError;

/// Validity tag stored in every header.
///
/// The tags are arbitrary bit patterns rather than `0`/`1` so that zeroed or
/// freshly mapped memory never reads as a live block. This is a diagnostic
/// aid only: a foreign pointer whose preceding bytes happen to hold
/// [`BlockState::Valid`]'s tag passes the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BlockState {
  Valid = 0xA110_C8ED,
  Free = 0xF4EE_B10C,
}

impl BlockState {
  fn from_tag(
    tag: u32,
  ) -> Option<Self> {
    match tag {
      t if t == Self::Valid as u32 => Some(Self::Valid),
      t if t == Self::Free as u32 => Some(Self::Free),
      _ => None,
    }
  }
}

/// Metadata placed immediately before every payload.
///
/// Each header sits on two independent intrusive lists: the allocation-order
/// list of its arena (`prev_valid`/`next_valid`, permanent), and the list of
/// its size-class bucket (`prev_free`/`next_free`, only while free).
#[repr(C)]
#[derive(Debug)]
pub struct BlockHeader {
  pub data: *mut u8,
  /// Requested size, before rounding.
  pub size: usize,
  /// Owning arena; null for large objects.
  pub arena: *mut Arena,
  state: u32,
  pub prev_valid: *mut BlockHeader,
  pub next_valid: *mut BlockHeader,
  pub prev_free: *mut BlockHeader,
  pub next_free: *mut BlockHeader,
}

impl BlockHeader {
  /// Writes a fresh, valid header at `at` and returns it.
  ///
  /// # Safety
  ///
  /// `at` must be aligned and point to at least `total_size!(size)`
  /// writable bytes.
  pub unsafe fn init(
    at: *mut u8,
    size: usize,
    arena: *mut Arena,
  ) -> *mut BlockHeader {
    let header = at.cast::<BlockHeader>();
    unsafe {
      header.write(BlockHeader {
        data: at.add(HEADER_SIZE),
        size,
        arena,
        state: BlockState::Valid as u32,
        prev_valid: ptr::null_mut(),
        next_valid: ptr::null_mut(),
        prev_free: ptr::null_mut(),
        next_free: ptr::null_mut(),
      });
    }
    header
  }

  pub fn state(
    &self,
  ) -> Option<BlockState> {
    BlockState::from_tag(self.state)
  }

  pub fn set_state(
    &mut self,
    state: BlockState,
  ) {
    self.state = state as u32;
  }

  pub fn is_valid(
    &self,
  ) -> bool {
    self.state() == Some(BlockState::Valid)
  }

  pub fn is_large(
    &self,
  ) -> bool {
    self.arena.is_null()
  }
}

/// Recovers the header of a payload pointer by fixed-offset back-calculation.
///
/// # Safety
///
/// `data` must have at least `HEADER_SIZE` readable bytes in front of it.
pub unsafe fn header_of(
  data: *mut u8,
) -> *mut BlockHeader {
  unsafe { data.sub(HEADER_SIZE).cast() }
}

/// Recovers the header of `data` and checks that it is currently
/// [`BlockState::Valid`].
///
/// # Safety
///
/// Same as [`header_of`]. The check catches double frees and most foreign
/// pointers but cannot prove a pointer came from this allocator.
pub unsafe fn valid_header(
  data: *mut u8,
) -> Result<*mut BlockHeader, AllocError> {
  if data.is_null() {
    return Err(AllocError::invalid("ptr cannot be null"));
  }

  let header = unsafe { header_of(data) };
  let tag = unsafe { ptr::addr_of!((*header).state).read_unaligned() };

  match BlockState::from_tag(tag) {
    Some(BlockState::Valid) => Ok(header),
    Some(BlockState::Free) => {
      log::warn!("[arenalloc] {:p} is already free", data);
      Err(AllocError::invalid("ptr is already free"))
    }
    None => {
      log::warn!("[arenalloc] {:p} was not returned by this allocator", data);
      Err(AllocError::invalid("ptr was not returned by this allocator"))
    }
  }
}
