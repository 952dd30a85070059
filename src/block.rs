//! Block layout.
//!
//! A block is `[header][payload][footer]`. Header and footer are the same
//! 64-bit boundary tag, `size | allocated`. While a block is free, the first
//! two payload words hold its free-list links.

use std::fmt;

/// Size of a header, a footer, or a free-list link.
pub const WSIZE: usize = 8;
/// Alignment of every block and every payload.
pub const ALIGNMENT: usize = 8;
/// Header plus footer.
pub const OVERHEAD: usize = 2 * WSIZE;
/// Header, `next`, `prev` and footer.
pub const MIN_BLOCK_SIZE: usize = 32;

const ALLOC_BIT: u64 = 0x1;
const SIZE_MASK: u64 = !(ALIGNMENT as u64 - 1);

/// A decoded boundary tag.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Tag {
  pub size: usize,
  pub allocated: bool,
}

impl Tag {
  pub const fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    Self { size, allocated }
  }

  pub const fn free(size: usize) -> Self {
    Self::new(size, false)
  }

  pub const fn allocated(size: usize) -> Self {
    Self::new(size, true)
  }

  pub fn pack(self) -> u64 {
    debug_assert!(self.size % ALIGNMENT == 0, "unaligned block size {}", self.size);

    self.size as u64 | if self.allocated { ALLOC_BIT } else { 0 }
  }

  pub fn unpack(word: u64) -> Self {
    Self {
      size: (word & SIZE_MASK) as usize,
      allocated: word & ALLOC_BIT != 0,
    }
  }
}

impl fmt::Display for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "[{}:{}]", self.size, if self.allocated { 'a' } else { 'f' })
  }
}

/// Arena offset of a block header.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlockRef(usize);

/// Arena offset of a block payload. This is what `alloc` hands out.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Payload(usize);

impl Payload {
  pub fn offset(self) -> usize {
    self.0
  }

  pub fn block(self) -> BlockRef {
    BlockRef(self.0 - WSIZE)
  }
}

impl fmt::Display for Payload {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "+{:#x}", self.0)
  }
}

impl fmt::Display for BlockRef {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "@{:#x}", self.0)
  }
}

/// Encodes an optional link. Offset 0 is the prologue and never a list member.
fn encode(link: Option<BlockRef>) -> u64 {
  link.map_or(0, |block| block.0 as u64)
}

fn decode(word: u64) -> Option<BlockRef> {
  (word != 0).then_some(BlockRef(word as usize))
}

impl BlockRef {
  pub(crate) const fn at(offset: usize) -> Self {
    Self(offset)
  }

  pub fn offset(self) -> usize {
    self.0
  }

  pub fn payload(self) -> Payload {
    Payload(self.0 + WSIZE)
  }

  pub(crate) fn header(
    self,
    mem: &[u64],
  ) -> Tag {
    Tag::unpack(mem[self.0 / WSIZE])
  }

  pub(crate) fn footer(
    self,
    mem: &[u64],
  ) -> Tag {
    let size = self.header(mem).size;
    Tag::unpack(mem[(self.0 + size - WSIZE) / WSIZE])
  }

  pub(crate) fn size(
    self,
    mem: &[u64],
  ) -> usize {
    self.header(mem).size
  }

  pub(crate) fn is_allocated(
    self,
    mem: &[u64],
  ) -> bool {
    self.header(mem).allocated
  }

  /// Writes only the header word. Used for sentinels.
  pub(crate) fn set_header(
    self,
    mem: &mut [u64],
    tag: Tag,
  ) {
    mem[self.0 / WSIZE] = tag.pack();
  }

  /// Writes the same tag to the header and to the footer `tag.size` bytes on.
  pub(crate) fn set_tags(
    self,
    mem: &mut [u64],
    tag: Tag,
  ) {
    let word = tag.pack();
    mem[self.0 / WSIZE] = word;
    mem[(self.0 + tag.size - WSIZE) / WSIZE] = word;
  }

  /// The tag of the block physically to the left, read from its footer.
  pub(crate) fn left_tag(
    self,
    mem: &[u64],
  ) -> Tag {
    Tag::unpack(mem[self.0 / WSIZE - 1])
  }

  pub(crate) fn left(
    self,
    mem: &[u64],
  ) -> BlockRef {
    BlockRef(self.0 - self.left_tag(mem).size)
  }

  pub(crate) fn right(
    self,
    mem: &[u64],
  ) -> BlockRef {
    BlockRef(self.0 + self.size(mem))
  }

  pub(crate) fn next(
    self,
    mem: &[u64],
  ) -> Option<BlockRef> {
    decode(mem[self.0 / WSIZE + 1])
  }

  pub(crate) fn prev(
    self,
    mem: &[u64],
  ) -> Option<BlockRef> {
    decode(mem[self.0 / WSIZE + 2])
  }

  pub(crate) fn set_next(
    self,
    mem: &mut [u64],
    next: Option<BlockRef>,
  ) {
    mem[self.0 / WSIZE + 1] = encode(next);
  }

  pub(crate) fn set_prev(
    self,
    mem: &mut [u64],
    prev: Option<BlockRef>,
  ) {
    mem[self.0 / WSIZE + 2] = encode(prev);
  }
}

/// A block as seen by a heap walk.
///
/// Links only exist on the free variant; once a block is allocated those
/// words belong to the caller.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Block {
  Free {
    at: BlockRef,
    size: usize,
    prev: Option<BlockRef>,
    next: Option<BlockRef>,
  },
  Allocated {
    at: BlockRef,
    size: usize,
  },
}

impl Block {
  pub(crate) fn read(
    mem: &[u64],
    at: BlockRef,
  ) -> Self {
    let tag = at.header(mem);

    if tag.allocated {
      Block::Allocated { at, size: tag.size }
    } else {
      Block::Free {
        at,
        size: tag.size,
        prev: at.prev(mem),
        next: at.next(mem),
      }
    }
  }

  pub fn at(&self) -> BlockRef {
    match *self {
      Block::Free { at, .. } | Block::Allocated { at, .. } => at,
    }
  }

  pub fn size(&self) -> usize {
    match *self {
      Block::Free { size, .. } | Block::Allocated { size, .. } => size,
    }
  }

  pub fn is_free(&self) -> bool {
    matches!(self, Block::Free { .. })
  }
}

impl fmt::Display for Block {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let link = |l: Option<BlockRef>| l.map_or_else(|| "NUL".to_string(), |b| b.to_string());

    match *self {
      Block::Allocated { at, size } => write!(f, "{at}: {} allocated", Tag::allocated(size)),
      Block::Free {
        at,
        size,
        prev,
        next,
      } => write!(
        f,
        "{at}: {} prev={} next={}",
        Tag::free(size),
        link(prev),
        link(next)
      ),
    }
  }
}
