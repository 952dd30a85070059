//! Heap walking and consistency checking.
//!
//! Nothing here runs on the allocation paths. The checker is for tests and
//! tools: it walks the heap from prologue to epilogue, then every free list,
//! and reports what it finds instead of failing.

use std::collections::BTreeSet;
use std::fmt;

use crate::allocator::Allocator;
use crate::arena::Arena;
use crate::block::{ALIGNMENT, Block, BlockRef, MIN_BLOCK_SIZE, Tag, WSIZE};
use crate::class::{NUM_CLASSES, class_of};

/// A broken heap invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
  BadPrologue(Tag),
  BadEpilogue { at: BlockRef, tag: Tag },
  Misaligned(BlockRef),
  TagMismatch { at: BlockRef, header: Tag, footer: Tag },
  Undersized { at: BlockRef, size: usize },
  AdjacentFree { left: BlockRef, right: BlockRef },
  OutOfBounds(BlockRef),
  SizeMismatch { blocks: usize, arena: usize },
  NotListed(BlockRef),
  ListedTwice(BlockRef),
  AllocatedListed { at: BlockRef, class: usize },
  WrongClass { at: BlockRef, class: usize, expected: usize },
  BrokenLink(BlockRef),
}

impl fmt::Display for Violation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::BadPrologue(tag) => write!(f, "bad prologue header {tag}"),
      Self::BadEpilogue { at, tag } => write!(f, "bad epilogue header {tag} at {at}"),
      Self::Misaligned(at) => write!(f, "payload for block at {at} is not aligned"),
      Self::TagMismatch { at, header, footer } => {
        write!(f, "header {header} does not match footer {footer} at {at}")
      }
      Self::Undersized { at, size } => write!(f, "block at {at} is only {size} bytes"),
      Self::AdjacentFree { left, right } => write!(f, "free blocks at {left} and {right} touch"),
      Self::OutOfBounds(at) => write!(f, "block at {at} runs past the end of the heap"),
      Self::SizeMismatch { blocks, arena } => {
        write!(f, "blocks cover {blocks} bytes but the arena holds {arena}")
      }
      Self::NotListed(at) => write!(f, "free block at {at} is in no list"),
      Self::ListedTwice(at) => write!(f, "block at {at} is listed more than once"),
      Self::AllocatedListed { at, class } => {
        write!(f, "allocated block at {at} is in list {class}")
      }
      Self::WrongClass { at, class, expected } => {
        write!(f, "block at {at} is in list {class}, belongs in {expected}")
      }
      Self::BrokenLink(at) => write!(f, "free list links around {at} are inconsistent"),
    }
  }
}

/// Iterator over the blocks between the prologue and the epilogue.
pub struct Blocks<'a> {
  mem: &'a [u64],
  cur: BlockRef,
}

impl Iterator for Blocks<'_> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let size = self.cur.size(self.mem);

    if size == 0 {
      return None;
    }

    let block = Block::read(self.mem, self.cur);
    self.cur = BlockRef::at(self.cur.offset() + size);

    Some(block)
  }
}

impl<A: Arena> Allocator<A> {
  /// Walks every block in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      mem: self.arena.words(),
      cur: BlockRef::at(self.prologue.offset() + WSIZE),
    }
  }

  /// Checks every heap invariant and returns the first violation.
  ///
  /// Each violation is logged as a warning. With `verbose`, each block is
  /// logged at debug level as the walk passes it.
  pub fn check_heap(
    &self,
    verbose: bool,
  ) -> Option<Violation> {
    let violations = self.violations(verbose);

    for violation in &violations {
      log::warn!("[segalloc] check: {}", violation);
    }

    violations.into_iter().next()
  }

  fn violations(
    &self,
    verbose: bool,
  ) -> Vec<Violation> {
    let mem = self.arena.words();
    let end = self.arena.size();
    let base = self.arena.base() as usize;
    let mut found = Vec::new();

    if verbose {
      log::debug!("[segalloc] heap ({:#x}, {} bytes):", base, end);
    }

    let prologue = self.prologue.header(mem);
    if prologue != Tag::allocated(WSIZE) {
      found.push(Violation::BadPrologue(prologue));
    }

    let mut free = BTreeSet::new();
    let mut covered = WSIZE;
    let mut last_free: Option<BlockRef> = None;
    let mut at = BlockRef::at(self.prologue.offset() + WSIZE);

    loop {
      if at.offset() + WSIZE > end {
        found.push(Violation::OutOfBounds(at));
        break;
      }

      let tag = at.header(mem);

      if tag.size == 0 {
        if verbose {
          log::debug!("[segalloc] {}: EOL", at);
        }

        if !tag.allocated || at.offset() + WSIZE != end {
          found.push(Violation::BadEpilogue { at, tag });
        }

        let arena = end - self.prologue.offset();
        if covered + WSIZE != arena {
          found.push(Violation::SizeMismatch {
            blocks: covered,
            arena,
          });
        }

        break;
      }

      if at.offset() + tag.size + WSIZE > end {
        found.push(Violation::OutOfBounds(at));
        break;
      }

      if verbose {
        if tag.size >= MIN_BLOCK_SIZE {
          log::debug!("[segalloc] {}", Block::read(mem, at));
        } else {
          log::debug!("[segalloc] {}: {}", at, tag);
        }
      }

      if (base + at.payload().offset()) % ALIGNMENT != 0 {
        found.push(Violation::Misaligned(at));
      }

      let footer = at.footer(mem);
      if footer != tag {
        found.push(Violation::TagMismatch {
          at,
          header: tag,
          footer,
        });
      }

      if tag.size < MIN_BLOCK_SIZE {
        found.push(Violation::Undersized { at, size: tag.size });
      }

      if tag.allocated {
        last_free = None;
      } else {
        if let Some(left) = last_free {
          found.push(Violation::AdjacentFree { left, right: at });
        }

        free.insert(at);
        last_free = Some(at);
      }

      covered += tag.size;
      at = BlockRef::at(at.offset() + tag.size);
    }

    self.check_lists(&free, &mut found);

    found
  }

  fn check_lists(
    &self,
    free: &BTreeSet<BlockRef>,
    found: &mut Vec<Violation>,
  ) {
    let mem = self.arena.words();
    let end = self.arena.size();
    let mut listed = BTreeSet::new();

    for class in 0..NUM_CLASSES {
      let mut prev = None;
      let mut cur = self.lists.head(class);

      while let Some(block) = cur {
        if block <= self.prologue || block.offset() + MIN_BLOCK_SIZE > end {
          found.push(Violation::OutOfBounds(block));
          break;
        }

        if block.prev(mem) != prev {
          found.push(Violation::BrokenLink(block));
        }

        if !listed.insert(block) {
          // Either a duplicate or a cycle; stop walking this list.
          found.push(Violation::ListedTwice(block));
          break;
        }

        let tag = block.header(mem);
        if tag.allocated {
          found.push(Violation::AllocatedListed { at: block, class });
        } else if class_of(tag.size) != class {
          found.push(Violation::WrongClass {
            at: block,
            class,
            expected: class_of(tag.size),
          });
        }

        prev = cur;
        cur = block.next(mem);
      }
    }

    for &block in free.difference(&listed) {
      found.push(Violation::NotListed(block));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arena::MemArena;
  use crate::config::HeapConfig;

  fn heap() -> Allocator<MemArena> {
    let config = HeapConfig {
      small_request_limit: 0,
      ..HeapConfig::default()
    };

    Allocator::with_config(MemArena::new(), config).unwrap()
  }

  #[test]
  fn test_fresh_heap_is_consistent() {
    let allocator = heap();

    assert_eq!(allocator.check_heap(true), None);
  }

  #[test]
  fn test_blocks_walk() {
    let mut allocator = heap();

    let a = allocator.alloc(100).unwrap().unwrap();
    let b = allocator.alloc(100).unwrap().unwrap();
    allocator.free(a);

    let blocks: Vec<_> = allocator.blocks().collect();

    assert_eq!(blocks.len(), 3);
    assert!(blocks[0].is_free());
    assert_eq!(blocks[1], Block::Allocated { at: b.block(), size: 120 });
    assert_eq!(blocks.iter().map(Block::size).sum::<usize>() + 16, 65536);
  }

  #[test]
  fn test_detects_tag_mismatch() {
    let mut allocator = heap();
    let a = allocator.alloc(100).unwrap().unwrap();

    let footer = (a.block().offset() + 120 - WSIZE) / WSIZE;
    allocator.arena.words_mut()[footer] = Tag::free(120).pack();

    assert_eq!(
      allocator.check_heap(false),
      Some(Violation::TagMismatch {
        at: a.block(),
        header: Tag::allocated(120),
        footer: Tag::free(120),
      })
    );
  }

  #[test]
  fn test_detects_unlisted_and_adjacent_free() {
    let mut allocator = heap();
    let a = allocator.alloc(100).unwrap().unwrap();

    // Mark `a` free behind the allocator's back.
    let mem = allocator.arena.words_mut();
    a.block().set_tags(mem, Tag::free(120));

    let violation = allocator.check_heap(false);

    assert_eq!(
      violation,
      Some(Violation::AdjacentFree {
        left: a.block(),
        right: BlockRef::at(128),
      })
    );
    assert!(allocator.violations(false).contains(&Violation::NotListed(a.block())));
  }

  #[test]
  fn test_detects_allocated_block_in_list() {
    let mut allocator = heap();
    let a = allocator.alloc(100).unwrap().unwrap();

    let mem = allocator.arena.words_mut();
    allocator.lists.insert(mem, a.block(), class_of(120));

    assert_eq!(
      allocator.check_heap(false),
      Some(Violation::AllocatedListed {
        at: a.block(),
        class: class_of(120),
      })
    );
  }

  #[test]
  fn test_detects_bad_epilogue() {
    let mut allocator = heap();
    let last = allocator.arena.words().len() - 1;
    allocator.arena.words_mut()[last] = Tag::free(0).pack();

    assert!(matches!(
      allocator.check_heap(false),
      Some(Violation::BadEpilogue { .. })
    ));
  }

  #[test]
  fn test_detects_bad_prologue() {
    let mut allocator = heap();
    allocator.arena.words_mut()[0] = Tag::free(WSIZE).pack();

    assert_eq!(
      allocator.check_heap(false),
      Some(Violation::BadPrologue(Tag::free(WSIZE)))
    );
  }
}
