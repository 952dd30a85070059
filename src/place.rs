//! Placement: first fit over ascending size classes, then split or absorb.

use crate::allocator::Allocator;
use crate::arena::Arena;
use crate::block::{BlockRef, MIN_BLOCK_SIZE, Tag};
use crate::class::{NUM_CLASSES, class_of};

impl<A: Arena> Allocator<A> {
  /// Finds the first listed block of at least `asize` bytes, starting from the
  /// class of `asize` and moving to larger classes.
  pub(crate) fn find_fit(
    &self,
    asize: usize,
  ) -> Option<BlockRef> {
    let mem = self.arena.words();

    (class_of(asize)..NUM_CLASSES).find_map(|class| {
      self
        .lists
        .iter(mem, class)
        .find(|block| block.size(mem) >= asize)
    })
  }

  /// Allocates `asize` bytes at the start of the free `block`.
  ///
  /// A remainder of at least [`MIN_BLOCK_SIZE`] becomes a new free block;
  /// anything smaller stays inside the allocation as a splinter.
  pub(crate) fn place(
    &mut self,
    block: BlockRef,
    asize: usize,
  ) {
    let mem = self.arena.words_mut();
    let size = block.size(mem);

    debug_assert!(!block.is_allocated(mem), "placing into allocated block {}", block);

    self.lists.remove(mem, block, class_of(size));

    let remainder = size - asize;

    if remainder >= MIN_BLOCK_SIZE {
      block.set_tags(mem, Tag::allocated(asize));

      let rest = block.right(mem);
      rest.set_tags(mem, Tag::free(remainder));
      self.lists.insert(mem, rest, class_of(remainder));

      log::trace!("[segalloc] place {} bytes at {}, split off {} bytes", asize, block, remainder);
    } else {
      block.set_tags(mem, Tag::allocated(size));

      log::trace!("[segalloc] place {} bytes at {}, absorbed {} byte splinter", asize, block, remainder);
    }
  }
}
