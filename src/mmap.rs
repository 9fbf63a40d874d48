//! Scoped anonymous OS mappings.

use std::mem;
use std::ptr::{self, NonNull};

use crate::error::AllocError;

#[cfg(test)]
thread_local! {
  static LIVE: std::cell::Cell<isize> = const { std::cell::Cell::new(0) };
}

/// Mappings created and not yet unmapped on this thread.
#[cfg(test)]
pub(crate) fn live_mappings() -> isize {
  LIVE.with(std::cell::Cell::get)
}

#[cfg(test)]
fn track(
  delta: isize,
) {
  LIVE.with(|live| live.set(live.get() + delta));
}

/// An anonymous, private, read/write mapping that is released when dropped.
///
/// Arenas and large objects outlive the scope that created them, so a
/// mapping is usually [`leak`](Mapping::leak)ed once it has been linked
/// into allocator state, and reclaimed later with
/// [`from_raw`](Mapping::from_raw) for an explicit [`release`](Mapping::release).
#[derive(Debug)]
pub struct Mapping {
  ptr: NonNull<u8>,
  len: usize,
}

impl Mapping {
  /// Maps `len` zeroed bytes.
  pub fn new(
    len: usize,
  ) -> Result<Self, AllocError> {
    if len == 0 {
      return Err(AllocError::invalid("mapping length cannot be 0"));
    }

    let addr = unsafe {
      libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if addr == libc::MAP_FAILED {
      let err = AllocError::os_alloc(len);
      log::warn!("[arenalloc] mmap({len}) failed: {err}");
      return Err(err);
    }

    match NonNull::new(addr.cast::<u8>()) {
      Some(ptr) => {
        #[cfg(test)]
        track(1);
        Ok(Self { ptr, len })
      }
      None => Err(AllocError::os_alloc(len)),
    }
  }

  /// Takes ownership of a mapping previously given up with [`leak`](Mapping::leak).
  ///
  /// # Safety
  ///
  /// `ptr` and `len` must describe a live mapping created by
  /// [`Mapping::new`] that nothing else will release.
  pub unsafe fn from_raw(
    ptr: NonNull<u8>,
    len: usize,
  ) -> Self {
    Self { ptr, len }
  }

  pub fn as_ptr(
    &self,
  ) -> *mut u8 {
    self.ptr.as_ptr()
  }

  /// Gives up ownership without unmapping.
  pub fn leak(
    self,
  ) -> NonNull<u8> {
    let ptr = self.ptr;
    mem::forget(self);
    ptr
  }

  /// Unmaps the region, reporting OS failure instead of swallowing it.
  pub fn release(
    self,
  ) -> Result<(), AllocError> {
    let (ptr, len) = (self.ptr, self.len);
    mem::forget(self);

    if unsafe { libc::munmap(ptr.as_ptr().cast(), len) } == -1 {
      let err = AllocError::os_release(len);
      log::warn!("[arenalloc] munmap({:p}, {len}) failed: {err}", ptr);
      return Err(err);
    }

    #[cfg(test)]
    track(-1);
    Ok(())
  }
}

impl Drop for Mapping {
  fn drop(
    &mut self,
  ) {
    if unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) } == -1 {
      log::warn!(
        "[arenalloc] munmap({:p}, {}) failed during drop",
        self.ptr,
        self.len
      );
      return;
    }

    #[cfg(test)]
    track(-1);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_map_is_zeroed_and_writable() {
    let map = Mapping::new(4096).unwrap();
    unsafe {
      let bytes = std::slice::from_raw_parts_mut(map.as_ptr(), 4096);
      assert!(bytes.iter().all(|&b| b == 0));
      bytes[4095] = 0xAB;
      assert_eq!(*map.as_ptr().add(4095), 0xAB);
    }

    map.release().unwrap();
  }

  #[test]
  fn test_zero_length_rejected() {
    assert!(matches!(
      Mapping::new(0),
      Err(AllocError::InvalidArgument { .. })
    ));
  }

  #[test]
  fn test_drop_and_release_unmap() {
    let before = live_mappings();
    let kept = Mapping::new(4096).unwrap();
    let dropped = Mapping::new(4096).unwrap();
    assert_eq!(live_mappings(), before + 2);

    drop(dropped);
    assert_eq!(live_mappings(), before + 1);
    kept.release().unwrap();
    assert_eq!(live_mappings(), before);
  }

  #[test]
  fn test_leak_then_reclaim() {
    let before = live_mappings();
    let map = Mapping::new(128).unwrap();
    let ptr = map.leak();
    assert_eq!(live_mappings(), before + 1);

    unsafe { ptr.as_ptr().write(7) };

    let map = unsafe { Mapping::from_raw(ptr, 128) };
    assert_eq!(unsafe { *map.as_ptr() }, 7);
    map.release().unwrap();
  }
}
