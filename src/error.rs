//! Allocator error taxonomy and the per-thread last-error slot.

use std::cell::Cell;

use thiserror::Error;

/// Errors reported by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// Zero size, null pointer, or a pointer whose header failed the
  /// validity check.
  #[error("invalid argument: {reason}")]
  InvalidArgument {
    /// What was wrong with the argument.
    reason: &'static str,
  },
  /// The OS declined a mapping, or no free-list entry matched.
  #[error("allocation failure: {requested} bytes (errno {errno})")]
  AllocationFailure {
    /// Bytes that were being requested.
    requested: usize,
    /// OS error code, `0` when no syscall was involved.
    errno: i32,
  },
  /// The OS declined to release a mapping.
  #[error("release failure: {len} bytes (errno {errno})")]
  ReleaseFailure {
    /// Length of the mapping that could not be released.
    len: usize,
    /// OS error code.
    errno: i32,
  },
}

impl AllocError {
  pub(crate) const fn invalid(
    reason: &'static str,
  ) -> Self {
    Self::InvalidArgument { reason }
  }

  /// Builds an OS-backed failure from the current `errno`.
  pub(crate) fn os_alloc(
    requested: usize,
  ) -> Self {
    Self::AllocationFailure {
      requested,
      errno: last_errno(),
    }
  }

  pub(crate) fn os_release(
    len: usize,
  ) -> Self {
    Self::ReleaseFailure {
      len,
      errno: last_errno(),
    }
  }
}

fn last_errno() -> i32 {
  std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

thread_local! {
  static LAST_ERROR: Cell<Option<AllocError>> = const { Cell::new(None) };
}

/// Returns the error recorded by the most recent failing call of the
/// C-style API on this thread.
///
/// Successful calls leave the slot untouched, like `errno`.
pub fn last_error() -> Option<AllocError> {
  LAST_ERROR.try_with(Cell::get).ok().flatten()
}

/// Clears this thread's last-error slot.
pub fn clear_last_error() {
  let _ = LAST_ERROR.try_with(|slot| slot.set(None));
}

pub(crate) fn set_last_error(
  err: AllocError,
) {
  // Ignored once the thread's locals are being destroyed.
  let _ = LAST_ERROR.try_with(|slot| slot.set(Some(err)));
}
