//! Large-object path: one dedicated mapping per request too big for an arena.

use std::ptr::{self, NonNull};

use crate::block::BlockHeader;
use crate::config::{ARENA_SIZE, HEADER_SIZE, MIN_ALLOC_SIZE};
use crate::error::AllocError;
use crate::mmap::Mapping;

/// Header plus payload footprint, or `None` on overflow.
fn checked_total(
  size: usize,
) -> Option<usize> {
  let rounded = size.checked_add(MIN_ALLOC_SIZE - 1)? & !(MIN_ALLOC_SIZE - 1);
  rounded.checked_add(HEADER_SIZE)
}

/// Maps a region sized to `size` plus its header and returns the payload.
///
/// Requests that fit in an arena are refused.
pub fn map_use(
  size: usize,
) -> Result<NonNull<u8>, AllocError> {
  if size == 0 {
    return Err(AllocError::invalid("size cannot be 0"));
  }
  let total = checked_total(size).ok_or(AllocError::AllocationFailure {
    requested: size,
    errno: libc::ENOMEM,
  })?;
  if total <= ARENA_SIZE {
    return Err(AllocError::invalid("size fits in an arena"));
  }

  let map = Mapping::new(total)?;
  let header = unsafe { BlockHeader::init(map.as_ptr(), size, ptr::null_mut()) };
  let data = unsafe { (*header).data };

  log::trace!("[arenalloc] map_use({size}) -> {:p} ({total} bytes mapped)", data);

  map.leak();
  NonNull::new(data).ok_or(AllocError::AllocationFailure { requested: size, errno: 0 })
}

/// Releases the mapping behind a large-object header.
///
/// # Safety
///
/// `header` must be a valid header returned through [`map_use`] that has not
/// been released yet.
pub unsafe fn map_free(
  header: *mut BlockHeader,
) -> Result<(), AllocError> {
  unsafe {
    debug_assert!((*header).is_large());
    let size = (*header).size;
    let total = checked_total(size).ok_or(AllocError::invalid("corrupt large-object header"))?;

    log::trace!("[arenalloc] map_free({:p}) releasing {total} bytes", (*header).data);

    let base = NonNull::new_unchecked(header.cast::<u8>());
    Mapping::from_raw(base, total).release()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::{header_of, valid_header};
  use crate::total_size;

  #[test]
  fn test_map_use() {
    let size = ARENA_SIZE * 10;
    let data = map_use(size).unwrap().as_ptr();

    unsafe {
      let header = header_of(data);
      assert!((*header).is_valid());
      assert!((*header).is_large());
      assert_eq!((*header).size, size);
      assert_eq!((*header).data, data);
      assert_eq!(data as usize % MIN_ALLOC_SIZE, 0);

      std::ptr::write_bytes(data, 0xCD, size);
      assert_eq!(*data.add(size - 1), 0xCD);

      map_free(valid_header(data).unwrap()).unwrap();
    }
  }

  #[test]
  fn test_map_use_rejects_small_and_zero() {
    assert!(map_use(0).is_err());
    assert!(map_use(MIN_ALLOC_SIZE).is_err());
    assert!(map_use(ARENA_SIZE - HEADER_SIZE).is_err());
  }

  #[test]
  fn test_map_use_just_over_arena() {
    let size = ARENA_SIZE - HEADER_SIZE + 1;
    assert!(total_size!(size) > ARENA_SIZE);

    let data = map_use(size).unwrap();
    unsafe { map_free(header_of(data.as_ptr())).unwrap() };
  }

  #[test]
  fn test_map_use_overflow() {
    assert!(matches!(
      map_use(usize::MAX),
      Err(AllocError::AllocationFailure { .. })
    ));
  }

  #[test]
  fn test_checked_total() {
    assert_eq!(checked_total(1), Some(HEADER_SIZE + MIN_ALLOC_SIZE));
    assert_eq!(checked_total(usize::MAX - HEADER_SIZE), None);
  }
}
