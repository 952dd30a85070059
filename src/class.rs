//! Size-class index.

use crate::block::MIN_BLOCK_SIZE;

/// Number of segregated free lists.
pub const NUM_CLASSES: usize = 11;

const MIN_SHIFT: u32 = MIN_BLOCK_SIZE.ilog2();

/// Maps a block size to its free list.
///
/// Class `i < 10` holds sizes in `[32 << i, 32 << (i + 1))`; class 10 holds
/// everything from 32 KiB up.
#[inline]
pub fn class_of(size: usize) -> usize {
  let log = size.max(1).ilog2();

  (log.saturating_sub(MIN_SHIFT) as usize).min(NUM_CLASSES - 1)
}
