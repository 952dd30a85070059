//! Heap extension.

use crate::allocator::Allocator;
use crate::arena::Arena;
use crate::block::{BlockRef, Tag, WSIZE};
use crate::class::class_of;
use crate::error::{HeapError, Result};

impl<A: Arena> Allocator<A> {
  /// Grows the heap by `words` double words and returns the new free block.
  ///
  /// The old epilogue header becomes the new block's header and a fresh
  /// epilogue is written at the new end. The block is listed before anything
  /// else happens. With `coalesce` it is merged into a free predecessor and
  /// the merged block is returned instead.
  pub(crate) fn extend(
    &mut self,
    words: usize,
    coalesce: bool,
  ) -> Result<BlockRef> {
    let size = words
      .checked_mul(WSIZE)
      .ok_or(HeapError::SizeOverflow { size: words })?;

    if size == 0 {
      return Err(HeapError::ZeroSizedGrowth);
    }

    let brk = self.arena.grow(size)?;
    let block = BlockRef::at(brk - WSIZE);

    let mem = self.arena.words_mut();
    block.set_tags(mem, Tag::free(size));
    block.right(mem).set_header(mem, Tag::allocated(0));
    self.lists.insert(mem, block, class_of(size));

    log::debug!("[segalloc] heap grown by {} bytes at {}", size, block);

    if coalesce {
      Ok(self.coalesce(block))
    } else {
      Ok(block)
    }
  }
}
