//! Segregated free lists.
//!
//! Eleven unordered, doubly linked lists threaded through the payloads of
//! free blocks. Insertion pushes at the head; removal unlinks in place.
//!
//! Neither operation validates its input. `remove` must be given the class
//! the block currently sits in, computed from its size before that size is
//! changed; anything else silently corrupts another list.

use crate::block::BlockRef;
use crate::class::NUM_CLASSES;

#[derive(Debug, Default, Clone)]
pub struct SegList {
  heads: [Option<BlockRef>; NUM_CLASSES],
}

impl SegList {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn head(
    &self,
    class: usize,
  ) -> Option<BlockRef> {
    self.heads[class]
  }

  pub fn is_empty(&self) -> bool {
    self.heads.iter().all(Option::is_none)
  }

  pub(crate) fn insert(
    &mut self,
    mem: &mut [u64],
    block: BlockRef,
    class: usize,
  ) {
    let head = self.heads[class];

    block.set_next(mem, head);
    block.set_prev(mem, None);

    if let Some(head) = head {
      head.set_prev(mem, Some(block));
    }

    self.heads[class] = Some(block);
  }

  pub(crate) fn remove(
    &mut self,
    mem: &mut [u64],
    block: BlockRef,
    class: usize,
  ) {
    let next = block.next(mem);
    let prev = block.prev(mem);

    match prev {
      Some(prev) => prev.set_next(mem, next),
      None => {
        debug_assert_eq!(self.heads[class], Some(block), "block is not the head of class {class}");
        self.heads[class] = next;
      }
    }

    if let Some(next) = next {
      next.set_prev(mem, prev);
    }
  }

  /// Walks one class from head to tail.
  pub fn iter<'a>(
    &self,
    mem: &'a [u64],
    class: usize,
  ) -> ClassIter<'a> {
    ClassIter {
      mem,
      cur: self.heads[class],
    }
  }
}

pub struct ClassIter<'a> {
  mem: &'a [u64],
  cur: Option<BlockRef>,
}

impl Iterator for ClassIter<'_> {
  type Item = BlockRef;

  fn next(&mut self) -> Option<BlockRef> {
    let block = self.cur?;
    self.cur = block.next(self.mem);
    Some(block)
  }
}
