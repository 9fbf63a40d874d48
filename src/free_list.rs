//! Exact size-class free lists.
//!
//! ```text
//!   tails[index(size)]
//!          │
//!          ▼
//!   ┌────────┐ prev_free ┌────────┐ prev_free ┌────────┐
//!   │ last   │ ────────► │  ...   │ ────────► │ first  │ ──► null
//!   │ freed  │ ◄──────── │        │ ◄──────── │ freed  │
//!   └────────┘ next_free └────────┘ next_free └────────┘
//! ```
//!
//! Buckets are exact: a freed block only satisfies a later request whose
//! rounded size is identical. Each bucket is LIFO.

use std::ptr;

use crate::block::{BlockHeader, BlockState};
use crate::config::{ARENA_SIZE, MIN_ALLOC_SIZE, NUM_ALLOC_SIZES};
use crate::{align, total_size};

/// Bucket index for a request of `size` bytes, or `None` if the request is
/// zero or too large for any arena.
pub fn index(
  size: usize,
) -> Option<usize> {
  if size == 0 || size > ARENA_SIZE || total_size!(size) > ARENA_SIZE {
    return None;
  }
  Some(align!(size) / MIN_ALLOC_SIZE - 1)
}

pub struct FreeLists {
  tails: [*mut BlockHeader; NUM_ALLOC_SIZES],
}

impl FreeLists {
  pub const fn new() -> Self {
    Self {
      tails: [ptr::null_mut(); NUM_ALLOC_SIZES],
    }
  }

  /// Most recently freed header of the bucket serving `size`.
  pub fn tail(
    &self,
    size: usize,
  ) -> *mut BlockHeader {
    match index(size) {
      Some(i) => self.tails[i],
      None => ptr::null_mut(),
    }
  }

  pub fn has(
    &self,
    size: usize,
  ) -> bool {
    !self.tail(size).is_null()
  }

  /// Number of headers resident in the bucket serving `size`.
  pub fn len(
    &self,
    size: usize,
  ) -> usize {
    let mut count = 0;
    let mut cur = self.tail(size);
    while !cur.is_null() {
      count += 1;
      cur = unsafe { (*cur).prev_free };
    }
    count
  }

  /// Total number of free headers across all buckets.
  pub fn total(
    &self,
  ) -> usize {
    self
      .tails
      .iter()
      .map(|&tail| {
        let mut count = 0;
        let mut cur = tail;
        while !cur.is_null() {
          count += 1;
          cur = unsafe { (*cur).prev_free };
        }
        count
      })
      .sum()
  }

  /// Threads `header` onto its bucket and marks it free.
  ///
  /// # Safety
  ///
  /// `header` must be a valid, arena-backed header not already on a list.
  pub unsafe fn push(
    &mut self,
    header: *mut BlockHeader,
  ) {
    unsafe {
      debug_assert!((*header).is_valid());
      let Some(i) = index((*header).size) else {
        debug_assert!(false, "arena block with no size class");
        return;
      };
      let tail = self.tails[i];

      (*header).prev_free = tail;
      (*header).next_free = ptr::null_mut();
      if !tail.is_null() {
        (*tail).next_free = header;
      }
      (*header).set_state(BlockState::Free);
      self.tails[i] = header;
    }
  }

  /// Detaches the most recently freed header serving `size` and marks it
  /// valid. The payload is not cleared.
  pub fn pop(
    &mut self,
    size: usize,
  ) -> Option<*mut BlockHeader> {
    let i = index(size)?;
    let header = self.tails[i];
    if header.is_null() {
      return None;
    }

    unsafe {
      let prev = (*header).prev_free;
      if !prev.is_null() {
        (*prev).next_free = ptr::null_mut();
      }
      self.tails[i] = prev;

      (*header).prev_free = ptr::null_mut();
      (*header).next_free = ptr::null_mut();
      (*header).set_state(BlockState::Valid);
    }

    Some(header)
  }

  /// Removes a free header from anywhere in its bucket.
  ///
  /// # Safety
  ///
  /// `header` must currently be resident in one of this table's buckets.
  pub unsafe fn unlink(
    &mut self,
    header: *mut BlockHeader,
  ) {
    unsafe {
      let Some(i) = index((*header).size) else {
        return;
      };
      let prev = (*header).prev_free;
      let next = (*header).next_free;

      if !prev.is_null() {
        (*prev).next_free = next;
      }
      if next.is_null() {
        self.tails[i] = prev;
      } else {
        (*next).prev_free = prev;
      }

      (*header).prev_free = ptr::null_mut();
      (*header).next_free = ptr::null_mut();
    }
  }

  pub fn clear(
    &mut self,
  ) {
    self.tails = [ptr::null_mut(); NUM_ALLOC_SIZES];
  }
}

impl Default for FreeLists {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::HEADER_SIZE;

  #[repr(C, align(16))]
  struct Slab([u8; 1024]);

  unsafe fn header_at(
    slab: &mut Slab,
    slot: usize,
    size: usize,
  ) -> *mut BlockHeader {
    unsafe { BlockHeader::init(slab.0.as_mut_ptr().add(slot * 128), size, ptr::null_mut()) }
  }

  #[test]
  fn test_index() {
    assert_eq!(index(MIN_ALLOC_SIZE), Some(0));
    assert_eq!(index(MIN_ALLOC_SIZE * 2), Some(1));
    assert_eq!(index(MIN_ALLOC_SIZE * 3), Some(2));
    assert_eq!(index(1), Some(0));
    assert_eq!(index(MIN_ALLOC_SIZE + 1), Some(1));
    assert_eq!(index(0), None);
  }

  #[test]
  fn test_index_bounds() {
    let largest = ARENA_SIZE - HEADER_SIZE;
    assert_eq!(index(largest), Some(NUM_ALLOC_SIZES - 1));
    assert_eq!(index(largest + 1), None);
    assert_eq!(index(usize::MAX), None);
  }

  #[test]
  fn test_push_pop_lifo() {
    let mut slab = Slab([0; 1024]);
    let mut lists = FreeLists::new();

    unsafe {
      let a = header_at(&mut slab, 0, 8);
      let b = header_at(&mut slab, 1, 8);
      let c = header_at(&mut slab, 2, MIN_ALLOC_SIZE * 2);

      lists.push(a);
      lists.push(b);
      lists.push(c);

      assert_eq!(lists.len(8), 2);
      assert_eq!(lists.len(MIN_ALLOC_SIZE * 2), 1);
      assert_eq!(lists.total(), 3);
      assert_eq!(lists.tail(8), b);
      assert_eq!((*b).prev_free, a);
      assert_eq!((*a).next_free, b);
      assert!((*b).next_free.is_null());
      assert_eq!((*a).state(), Some(BlockState::Free));

      assert_eq!(lists.pop(8), Some(b));
      assert!((*b).is_valid());
      assert!((*b).prev_free.is_null());
      assert!((*a).next_free.is_null());
      assert_eq!(lists.pop(8), Some(a));
      assert_eq!(lists.pop(8), None);
      assert_eq!(lists.pop(MIN_ALLOC_SIZE * 2), Some(c));
    }
  }

  #[test]
  fn test_rounded_sizes_share_a_bucket() {
    let mut slab = Slab([0; 1024]);
    let mut lists = FreeLists::new();

    unsafe {
      let a = header_at(&mut slab, 0, 3);
      lists.push(a);
      assert!(lists.has(MIN_ALLOC_SIZE));
      assert!(!lists.has(MIN_ALLOC_SIZE + 1));
      assert_eq!(lists.pop(MIN_ALLOC_SIZE), Some(a));
    }
  }

  #[test]
  fn test_unlink_middle_and_tail() {
    let mut slab = Slab([0; 1024]);
    let mut lists = FreeLists::new();

    unsafe {
      let a = header_at(&mut slab, 0, 8);
      let b = header_at(&mut slab, 1, 8);
      let c = header_at(&mut slab, 2, 8);
      lists.push(a);
      lists.push(b);
      lists.push(c);

      lists.unlink(b);
      assert_eq!((*c).prev_free, a);
      assert_eq!((*a).next_free, c);
      assert_eq!(lists.len(8), 2);

      lists.unlink(c);
      assert_eq!(lists.tail(8), a);
      assert!((*a).next_free.is_null());

      lists.unlink(a);
      assert!(!lists.has(8));
    }
  }

  #[test]
  #[cfg(debug_assertions)]
  #[should_panic]
  fn test_push_rejects_free_header() {
    let mut slab = Slab([0; 1024]);
    let mut lists = FreeLists::new();

    unsafe {
      let a = header_at(&mut slab, 0, 8);
      lists.push(a);
      lists.push(a);
    }
  }

  #[test]
  fn test_clear() {
    let mut slab = Slab([0; 1024]);
    let mut lists = FreeLists::new();

    unsafe { lists.push(header_at(&mut slab, 0, 8)) };
    lists.clear();
    assert_eq!(lists.total(), 0);
  }
}
