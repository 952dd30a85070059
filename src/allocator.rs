//! The allocator facade.

use crate::arena::{Arena, as_bytes, as_bytes_mut};
use crate::block::{BlockRef, MIN_BLOCK_SIZE, OVERHEAD, Payload, Tag, WSIZE};
use crate::checked_align;
use crate::class::class_of;
use crate::config::HeapConfig;
use crate::error::{HeapError, Result};
use crate::fail::{self, OomHandler};
use crate::list::{ClassIter, SegList};

/// A segregated-fit allocator over one arena.
///
/// Every operation runs to completion on `&mut self`; there is no internal
/// locking. Callers sharing an allocator between threads must wrap it in a
/// single lock.
pub struct Allocator<A: Arena> {
  pub(crate) arena: A,
  pub(crate) lists: SegList,
  pub(crate) prologue: BlockRef,
  pub(crate) config: HeapConfig,
  oom_handler: OomHandler,
}

/// Block size needed to serve `size` payload bytes.
fn adjusted_size(size: usize) -> Result<usize> {
  size
    .checked_add(OVERHEAD)
    .and_then(|size| checked_align!(size))
    .map(|asize| asize.max(MIN_BLOCK_SIZE))
    .ok_or(HeapError::SizeOverflow { size })
}

impl<A: Arena> Allocator<A> {
  /// Builds an allocator with the default configuration.
  pub fn init(arena: A) -> Result<Self> {
    Self::with_config(arena, HeapConfig::default())
  }

  /// Grows `arena` by one chunk and lays out the initial heap:
  ///
  /// ```text
  ///   | prologue [8:a] | free [chunk - 16:f] ... | epilogue [0:a] |
  /// ```
  pub fn with_config(
    arena: A,
    config: HeapConfig,
  ) -> Result<Self> {
    let mut allocator = Self {
      arena,
      lists: SegList::new(),
      prologue: BlockRef::at(0),
      config: config.normalized(),
      oom_handler: fail::default_oom_handler,
    };

    let chunk = allocator.config.chunk_size;
    let base = allocator.arena.grow(chunk).inspect_err(|err| {
      log::warn!("[segalloc] init failed: {}", err);
    })?;

    let prologue = BlockRef::at(base);
    let first = BlockRef::at(base + WSIZE);
    let size = chunk - OVERHEAD;

    let mem = allocator.arena.words_mut();
    prologue.set_header(mem, Tag::allocated(WSIZE));
    first.set_tags(mem, Tag::free(size));
    first.right(mem).set_header(mem, Tag::allocated(0));
    allocator.lists.insert(mem, first, class_of(size));

    allocator.prologue = prologue;

    log::debug!(
      "[segalloc] init: {} byte chunk, first free block {} of {} bytes",
      chunk,
      first,
      size
    );

    Ok(allocator)
  }

  /// Allocates at least `size` bytes.
  ///
  /// Returns `Ok(None)` for a zero-sized request and an error when the arena
  /// is exhausted.
  pub fn alloc(
    &mut self,
    size: usize,
  ) -> Result<Option<Payload>> {
    if size == 0 {
      return Ok(None);
    }

    let asize = adjusted_size(size)?;

    if asize <= self.config.small_request_limit {
      match self.extend(asize / WSIZE, false) {
        Ok(block) => {
          self.place(block, asize);
          log::trace!("[segalloc] alloc({}) -> {} (direct)", size, block.payload());
          return Ok(Some(block.payload()));
        }
        Err(err) => {
          log::debug!("[segalloc] direct growth for {} bytes failed ({}), searching", asize, err);
        }
      }
    }

    if let Some(block) = self.find_fit(asize) {
      self.place(block, asize);
      log::trace!("[segalloc] alloc({}) -> {}", size, block.payload());
      return Ok(Some(block.payload()));
    }

    let extend = asize.max(self.config.chunk_size);
    let block = self.extend(extend / WSIZE, true).inspect_err(|err| {
      log::warn!("[segalloc] alloc({}) -> out of memory: {}", size, err);
    })?;

    self.place(block, asize);
    log::trace!("[segalloc] alloc({}) -> {} (grown by {})", size, block.payload(), extend);

    Ok(Some(block.payload()))
  }

  /// Returns a block to the free lists, merging it with free neighbors.
  ///
  /// `payload` must come from `alloc`/`realloc` on this allocator and must not
  /// have been freed since. Nothing checks this.
  pub fn free(
    &mut self,
    payload: Payload,
  ) {
    let block = payload.block();
    let mem = self.arena.words_mut();
    let size = block.size(mem);

    block.set_tags(mem, Tag::free(size));
    self.lists.insert(mem, block, class_of(size));

    let merged = self.coalesce(block);
    log::trace!("[segalloc] free({}) -> {} bytes at {}", payload, self.block_size(merged), merged);
  }

  /// Moves an allocation into a fresh block of at least `size` bytes.
  ///
  /// Copies `min(capacity, size)` bytes and frees the old block. A zero `size`
  /// frees `payload` and returns `None`. If the new block cannot be allocated
  /// the OOM handler runs and this never returns.
  pub fn realloc(
    &mut self,
    payload: Payload,
    size: usize,
  ) -> Option<Payload> {
    if size == 0 {
      self.free(payload);
      return None;
    }

    let new = match self.alloc(size) {
      Ok(Some(new)) => new,
      other => {
        log::error!("[segalloc] realloc({}, {}) failed: {:?}", payload, size, other);
        (self.oom_handler)()
      }
    };

    let copy = self.capacity(payload).min(size);
    let from = payload.offset();

    as_bytes_mut(self.arena.words_mut()).copy_within(from..from + copy, new.offset());
    self.free(payload);

    log::trace!("[segalloc] realloc({}, {}) -> {} ({} bytes copied)", payload, size, new, copy);

    Some(new)
  }

  /// Usable bytes behind `payload`, splinter included.
  pub fn capacity(
    &self,
    payload: Payload,
  ) -> usize {
    payload.block().size(self.arena.words()) - OVERHEAD
  }

  pub fn payload(
    &self,
    payload: Payload,
  ) -> &[u8] {
    let start = payload.offset();
    &as_bytes(self.arena.words())[start..start + self.capacity(payload)]
  }

  pub fn payload_mut(
    &mut self,
    payload: Payload,
  ) -> &mut [u8] {
    let start = payload.offset();
    let end = start + self.capacity(payload);
    &mut as_bytes_mut(self.arena.words_mut())[start..end]
  }

  /// Absolute address of `payload` at this moment.
  pub fn addr(
    &self,
    payload: Payload,
  ) -> usize {
    self.arena.base() as usize + payload.offset()
  }

  /// Free blocks of one size class, head first.
  pub fn free_list(
    &self,
    class: usize,
  ) -> ClassIter<'_> {
    self.lists.iter(self.arena.words(), class)
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  /// Replaces the handler `realloc` calls when it cannot allocate.
  pub fn set_oom_handler(
    &mut self,
    handler: OomHandler,
  ) {
    self.oom_handler = handler;
  }

  fn block_size(
    &self,
    block: BlockRef,
  ) -> usize {
    block.size(self.arena.words())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arena::MemArena;
  use crate::class::NUM_CLASSES;

  #[test]
  fn test_adjusted_size() {
    assert_eq!(adjusted_size(1), Ok(32));
    assert_eq!(adjusted_size(16), Ok(32));
    assert_eq!(adjusted_size(17), Ok(40));
    assert_eq!(adjusted_size(200), Ok(216));
    assert_eq!(adjusted_size(usize::MAX), Err(HeapError::SizeOverflow { size: usize::MAX }));
  }

  #[test]
  fn test_init_layout() {
    let allocator = Allocator::init(MemArena::new()).unwrap();
    let mem = allocator.arena.words();

    assert_eq!(allocator.prologue.header(mem), Tag::allocated(8));

    let first = BlockRef::at(8);
    assert_eq!(first.header(mem), Tag::free(65536 - 16));
    assert_eq!(first.footer(mem), Tag::free(65536 - 16));
    assert_eq!(first.right(mem).header(mem), Tag::allocated(0));
    assert_eq!(allocator.free_list(NUM_CLASSES - 1).collect::<Vec<_>>(), vec![first]);
  }

  #[test]
  fn test_init_small_chunk_uses_its_own_class() {
    let config = HeapConfig {
      chunk_size: 256,
      ..HeapConfig::default()
    };
    let allocator = Allocator::with_config(MemArena::new(), config).unwrap();

    assert_eq!(allocator.free_list(class_of(240)).count(), 1);
    assert!(allocator.free_list(NUM_CLASSES - 1).next().is_none());
  }

  #[test]
  fn test_init_fails_without_memory() {
    let result = Allocator::init(MemArena::with_limit(1024));

    assert!(matches!(result, Err(HeapError::OutOfMemory { requested: 65536 })));
  }

  #[test]
  fn test_alloc_zero_is_noop() {
    let mut allocator = Allocator::init(MemArena::new()).unwrap();
    let before = allocator.arena.words().to_vec();

    assert_eq!(allocator.alloc(0), Ok(None));
    assert_eq!(allocator.arena.words(), &before[..]);
  }

  #[test]
  fn test_small_request_grows_heap_directly() {
    let mut allocator = Allocator::init(MemArena::new()).unwrap();

    let p = allocator.alloc(8).unwrap().unwrap();

    // Placed right after the initial chunk, not carved from the big free block.
    assert_eq!(p.block(), BlockRef::at(65536 - 8));
    assert_eq!(allocator.arena.size(), 65536 + 32);
    assert_eq!(allocator.capacity(p), 16);
  }

  #[test]
  fn test_fast_path_falls_back_to_free_lists() {
    let mut allocator = Allocator::init(MemArena::with_limit(65536)).unwrap();

    let p = allocator.alloc(8).unwrap().unwrap();

    assert_eq!(p.block(), BlockRef::at(8));
    assert_eq!(allocator.arena.size(), 65536);
  }

  #[test]
  fn test_general_path_splits_first_block() {
    let mut allocator = Allocator::init(MemArena::new()).unwrap();

    let p = allocator.alloc(200).unwrap().unwrap();
    let mem = allocator.arena.words();

    assert_eq!(p.block(), BlockRef::at(8));
    assert_eq!(p.block().header(mem), Tag::allocated(216));
    assert_eq!(p.block().right(mem).header(mem), Tag::free(65536 - 16 - 216));
  }

  #[test]
  fn test_payload_bytes() {
    let mut allocator = Allocator::init(MemArena::new()).unwrap();
    let p = allocator.alloc(100).unwrap().unwrap();

    allocator.payload_mut(p)[..5].copy_from_slice(b"hello");

    assert_eq!(&allocator.payload(p)[..5], b"hello");
    assert_eq!(allocator.payload(p).len(), 104);
    assert_eq!(allocator.addr(p) % 8, 0);
  }

  #[test]
  fn test_realloc_copies_and_frees() {
    let mut allocator = Allocator::init(MemArena::new()).unwrap();
    let p = allocator.alloc(100).unwrap().unwrap();

    for (i, byte) in allocator.payload_mut(p).iter_mut().enumerate() {
      *byte = i as u8;
    }

    let q = allocator.realloc(p, 300).unwrap();

    assert_ne!(p, q);
    assert!(allocator.capacity(q) >= 300);
    assert!(allocator.payload(q)[..104].iter().enumerate().all(|(i, &b)| b == i as u8));
    assert!(!p.block().is_allocated(allocator.arena.words()));
  }

  #[test]
  fn test_realloc_shrink_truncates() {
    let mut allocator = Allocator::init(MemArena::new()).unwrap();
    let p = allocator.alloc(300).unwrap().unwrap();
    allocator.payload_mut(p).fill(0xAB);

    let q = allocator.realloc(p, 40).unwrap();

    assert_eq!(allocator.capacity(q), 40);
    assert!(allocator.payload(q).iter().all(|&b| b == 0xAB));
  }

  #[test]
  fn test_realloc_to_zero_frees() {
    let mut allocator = Allocator::init(MemArena::new()).unwrap();
    let p = allocator.alloc(300).unwrap().unwrap();

    assert_eq!(allocator.realloc(p, 0), None);
    assert!(!p.block().is_allocated(allocator.arena.words()));
  }

  fn panicking_oom_handler() -> ! {
    panic!("out of memory");
  }

  #[test]
  #[should_panic(expected = "out of memory")]
  fn test_realloc_failure_is_fatal() {
    let mut allocator = Allocator::init(MemArena::with_limit(65536)).unwrap();
    allocator.set_oom_handler(panicking_oom_handler);

    let p = allocator.alloc(100).unwrap().unwrap();
    allocator.realloc(p, 1 << 20);
  }
}
