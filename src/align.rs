/// Rounds a size up to the platform's maximum scalar alignment
/// (`alignof(max_align_t)`).
///
/// # Examples
///
/// ```rust
/// use arenalloc::{align, config::MIN_ALLOC_SIZE};
///
/// assert_eq!(align!(1), MIN_ALLOC_SIZE);
/// assert_eq!(align!(MIN_ALLOC_SIZE), MIN_ALLOC_SIZE);
/// assert_eq!(align!(MIN_ALLOC_SIZE + 1), MIN_ALLOC_SIZE * 2);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ((($value) + $crate::config::MIN_ALLOC_SIZE - 1) & !($crate::config::MIN_ALLOC_SIZE - 1))
  };
}

/// Header plus payload footprint of a request of `$size` bytes.
///
/// ```text
///   ┌────────────────────┬──────────────────────────┐
///   │  align!(header)    │      align!(size)        │
///   └────────────────────┴──────────────────────────┘
/// ```
#[macro_export]
macro_rules! total_size {
  ($size:expr) => {
    ($crate::config::HEADER_SIZE + $crate::align!($size))
  };
}

#[cfg(test)]
mod tests {
  use crate::config::{HEADER_SIZE, MIN_ALLOC_SIZE};

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (MIN_ALLOC_SIZE * i + 1)..=(MIN_ALLOC_SIZE * (i + 1));

      let expected_alignment = MIN_ALLOC_SIZE * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
      }
    }
  }

  #[test]
  fn test_align_half() {
    assert_eq!(align!(MIN_ALLOC_SIZE / 2), MIN_ALLOC_SIZE);
  }

  #[test]
  fn test_total_size() {
    let size = MIN_ALLOC_SIZE / 2;
    assert_eq!(total_size!(size), MIN_ALLOC_SIZE + HEADER_SIZE);
    assert_eq!(total_size!(MIN_ALLOC_SIZE * 3), MIN_ALLOC_SIZE * 3 + HEADER_SIZE);
  }
}
