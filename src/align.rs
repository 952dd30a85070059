/// Rounds a byte count up to the next multiple of the 8-byte double word.
///
/// Every block size and every payload offset in the heap is a multiple of
/// this value, which is what keeps payloads 8-byte aligned.
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(1), 8);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::block::ALIGNMENT - 1) & !($crate::block::ALIGNMENT - 1)
  };
}

/// Like [`align!`], but returns `None` instead of wrapping around.
#[macro_export]
macro_rules! checked_align {
  ($value:expr) => {
    ($value as usize)
      .checked_add($crate::block::ALIGNMENT - 1)
      .map(|v| v & !($crate::block::ALIGNMENT - 1))
  };
}

#[cfg(test)]
mod tests {
  use crate::block::ALIGNMENT;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
      }
    }
  }

  #[test]
  fn test_checked_align() {
    assert_eq!(checked_align!(0usize), Some(0));
    assert_eq!(checked_align!(17usize), Some(24));
    assert_eq!(checked_align!(usize::MAX), None);
  }
}
