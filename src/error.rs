use core::fmt;

/// Everything that can go wrong while growing or carving up the heap.
///
/// Only arena growth can fail. List maintenance, placement and coalescing
/// have no error path of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
  /// The arena provider could not grow by `requested` bytes.
  OutOfMemory { requested: usize },
  /// The heap extender was asked for zero words.
  ZeroSizedGrowth,
  /// The program break moved underneath an `SbrkArena`.
  Discontiguous { expected: usize, found: usize },
  /// The adjusted block size for a request of `size` bytes is not representable.
  SizeOverflow { size: usize },
}

impl fmt::Display for HeapError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::OutOfMemory { requested } => {
        write!(f, "out of memory: arena cannot grow by {requested} bytes")
      }
      Self::ZeroSizedGrowth => write!(f, "refusing to grow the heap by zero bytes"),
      Self::Discontiguous { expected, found } => write!(
        f,
        "program break moved: expected new region at {expected:#x}, got {found:#x}"
      ),
      Self::SizeOverflow { size } => write!(f, "request of {size} bytes is too large"),
    }
  }
}

impl std::error::Error for HeapError {}

impl HeapError {
  /// Whether this error means "no more memory", as opposed to a misuse of the extender.
  #[must_use]
  pub fn is_exhaustion(&self) -> bool {
    matches!(
      self,
      Self::OutOfMemory { .. } | Self::Discontiguous { .. } | Self::SizeOverflow { .. }
    )
  }
}

pub type Result<T> = core::result::Result<T, HeapError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_out_of_memory_display() {
    let err = HeapError::OutOfMemory { requested: 4096 };
    let msg = format!("{}", err);
    assert!(msg.contains("4096"), "message should name the failed request");
  }

  #[test]
  fn test_exhaustion_classes() {
    assert!(HeapError::OutOfMemory { requested: 8 }.is_exhaustion());
    assert!(HeapError::SizeOverflow { size: usize::MAX }.is_exhaustion());
    assert!(!HeapError::ZeroSizedGrowth.is_exhaustion());
  }
}
