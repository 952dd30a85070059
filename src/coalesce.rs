//! Boundary-tag coalescing.
//!
//! ```text
//!   case 1:  [a][B][a]   nothing to merge
//!   case 2:  [a][B][f]   B absorbs its right neighbor
//!   case 3:  [f][B][a]   the left neighbor absorbs B
//!   case 4:  [f][B][f]   the left neighbor absorbs B and the right neighbor
//! ```
//!
//! Every participant leaves its list before any size is rewritten, since the
//! size decides which list it is in.

use crate::allocator::Allocator;
use crate::arena::Arena;
use crate::block::{BlockRef, Tag};
use crate::class::class_of;

impl<A: Arena> Allocator<A> {
  /// Merges the listed free `block` with its free neighbors.
  ///
  /// Returns the block that now covers `block`, which is `block` itself or its
  /// left neighbor.
  pub(crate) fn coalesce(
    &mut self,
    block: BlockRef,
  ) -> BlockRef {
    let mem = self.arena.words_mut();

    let size = block.size(mem);
    let left_tag = block.left_tag(mem);
    let right = block.right(mem);
    let right_tag = right.header(mem);

    match (left_tag.allocated, right_tag.allocated) {
      (true, true) => block,
      (true, false) => {
        self.lists.remove(mem, block, class_of(size));
        self.lists.remove(mem, right, class_of(right_tag.size));

        let merged = size + right_tag.size;
        block.set_tags(mem, Tag::free(merged));
        self.lists.insert(mem, block, class_of(merged));

        log::trace!("[segalloc] coalesce {} with right {} -> {} bytes", block, right, merged);

        block
      }
      (false, true) => {
        let left = block.left(mem);

        self.lists.remove(mem, block, class_of(size));
        self.lists.remove(mem, left, class_of(left_tag.size));

        let merged = left_tag.size + size;
        left.set_tags(mem, Tag::free(merged));
        self.lists.insert(mem, left, class_of(merged));

        log::trace!("[segalloc] coalesce {} into left {} -> {} bytes", block, left, merged);

        left
      }
      (false, false) => {
        let left = block.left(mem);

        self.lists.remove(mem, block, class_of(size));
        self.lists.remove(mem, right, class_of(right_tag.size));
        self.lists.remove(mem, left, class_of(left_tag.size));

        let merged = left_tag.size + size + right_tag.size;
        left.set_tags(mem, Tag::free(merged));
        self.lists.insert(mem, left, class_of(merged));

        log::trace!(
          "[segalloc] coalesce {} between {} and {} -> {} bytes",
          block,
          left,
          right,
          merged
        );

        left
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::allocator::Allocator;
  use crate::arena::{Arena, MemArena};
  use crate::block::{Payload, Tag};
  use crate::class::class_of;
  use crate::config::HeapConfig;

  /// Three adjacent 128 byte blocks followed by an allocated guard.
  fn three_blocks() -> (Allocator<MemArena>, [Payload; 3]) {
    let config = HeapConfig {
      small_request_limit: 0,
      ..HeapConfig::default()
    };
    let mut allocator = Allocator::with_config(MemArena::new(), config).unwrap();

    let a = allocator.alloc(112).unwrap().unwrap();
    let b = allocator.alloc(112).unwrap().unwrap();
    let c = allocator.alloc(112).unwrap().unwrap();
    allocator.alloc(16).unwrap().unwrap();

    (allocator, [a, b, c])
  }

  fn listed(allocator: &Allocator<MemArena>, size: usize) -> usize {
    let mem = allocator.arena.words();
    allocator
      .free_list(class_of(size))
      .filter(|block| block.size(mem) == size)
      .count()
  }

  #[test]
  fn test_case_1_no_merge() {
    let (mut allocator, [_, b, _]) = three_blocks();

    allocator.free(b);

    assert_eq!(b.block().header(allocator.arena.words()), Tag::free(128));
    assert_eq!(listed(&allocator, 128), 1);
  }

  #[test]
  fn test_case_2_merge_right() {
    let (mut allocator, [_, b, c]) = three_blocks();

    allocator.free(c);
    allocator.free(b);

    let mem = allocator.arena.words();
    assert_eq!(b.block().header(mem), Tag::free(256));
    assert_eq!(b.block().footer(mem), Tag::free(256));
    assert_eq!(listed(&allocator, 128), 0);
    assert_eq!(listed(&allocator, 256), 1);
  }

  #[test]
  fn test_case_3_merge_left() {
    let (mut allocator, [a, b, _]) = three_blocks();

    allocator.free(a);
    allocator.free(b);

    let mem = allocator.arena.words();
    assert_eq!(a.block().header(mem), Tag::free(256));
    assert_eq!(a.block().right(mem), b.block().right(mem));
    assert_eq!(listed(&allocator, 256), 1);
  }

  #[test]
  fn test_case_4_merge_both() {
    let (mut allocator, [a, b, c]) = three_blocks();

    allocator.free(a);
    allocator.free(c);
    allocator.free(b);

    let mem = allocator.arena.words();
    assert_eq!(a.block().header(mem), Tag::free(384));
    assert_eq!(a.block().footer(mem), Tag::free(384));
    assert_eq!(listed(&allocator, 128), 0);
    assert_eq!(listed(&allocator, 384), 1);
  }

  #[test]
  fn test_merge_with_tail_of_heap() {
    let config = HeapConfig {
      small_request_limit: 0,
      ..HeapConfig::default()
    };
    let mut allocator = Allocator::with_config(MemArena::new(), config).unwrap();

    let a = allocator.alloc(112).unwrap().unwrap();
    allocator.free(a);

    let mem = allocator.arena.words();
    assert_eq!(a.block().header(mem), Tag::free(65520));
    assert_eq!(allocator.free_list(10).count(), 1);
  }
}
