//! Configuration.
//!
//! Tunables for heap growth and the small-request fast path.

use crate::align;
use crate::block::{MIN_BLOCK_SIZE, OVERHEAD};

/// Initial heap size, and the minimum growth when no free block fits.
pub const CHUNKSIZE: usize = 1 << 16;

/// Adjusted sizes up to this many bytes skip the free lists and grow the heap directly.
pub const SMALL_REQUEST_LIMIT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  /// Bytes granted by `init`, and the floor for general-path growth.
  pub chunk_size: usize,
  /// Fast-path threshold on the adjusted block size. `0` disables the fast path.
  pub small_request_limit: usize,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      chunk_size: CHUNKSIZE,
      small_request_limit: SMALL_REQUEST_LIMIT,
    }
  }
}

impl HeapConfig {
  /// Rounds the chunk up to whole double words, large enough for the
  /// prologue, one minimum block and the epilogue.
  pub(crate) fn normalized(self) -> Self {
    Self {
      chunk_size: align!(self.chunk_size.max(OVERHEAD + MIN_BLOCK_SIZE)),
      ..self
    }
  }
}
