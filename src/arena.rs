//! Heap arena providers.
//!
//! An arena is one contiguous, append-only region. The allocator only ever
//! asks it to grow by some number of bytes and addresses everything inside it
//! by byte offset from the arena base, so a provider is free to move its
//! backing storage as long as offsets stay stable.

use std::{mem, ptr, slice};

use libc::{c_void, intptr_t, sbrk};

use crate::block::ALIGNMENT;
use crate::error::{HeapError, Result};

/// The growth primitive underneath the allocator.
pub trait Arena {
  /// Extends the arena by exactly `incr` bytes.
  ///
  /// Returns the offset of the first byte of the new region, which is always
  /// the arena size before the call. Previously returned offsets stay valid.
  fn grow(
    &mut self,
    incr: usize,
  ) -> Result<usize>;

  /// Number of bytes granted so far.
  fn size(&self) -> usize;

  /// The granted region viewed as 64-bit words.
  fn words(&self) -> &[u64];

  fn words_mut(&mut self) -> &mut [u64];

  /// Absolute address of the arena base.
  fn base(&self) -> *const u8 {
    self.words().as_ptr().cast()
  }
}

/// Views a word slice as its underlying bytes.
pub(crate) fn as_bytes(words: &[u64]) -> &[u8] {
  // SAFETY: u8 has no alignment requirement and every bit pattern is valid.
  unsafe { slice::from_raw_parts(words.as_ptr().cast(), mem::size_of_val(words)) }
}

pub(crate) fn as_bytes_mut(words: &mut [u64]) -> &mut [u8] {
  // SAFETY: as above, and every byte pattern written back is a valid u64.
  unsafe { slice::from_raw_parts_mut(words.as_mut_ptr().cast(), mem::size_of_val(words)) }
}

/// A bounded in-process arena.
///
/// Simulates a program break over a region capped at `limit` bytes. Growing
/// past the cap fails, which makes exhaustion reproducible in tests.
#[derive(Debug)]
pub struct MemArena {
  words: Vec<u64>,
  brk: usize,
  limit: usize,
}

impl MemArena {
  /// 20 MiB.
  pub const DEFAULT_LIMIT: usize = 20 * (1 << 20);

  pub fn new() -> Self {
    Self::with_limit(Self::DEFAULT_LIMIT)
  }

  pub fn with_limit(limit: usize) -> Self {
    Self {
      words: Vec::new(),
      brk: 0,
      limit,
    }
  }

  pub fn limit(&self) -> usize {
    self.limit
  }
}

impl Default for MemArena {
  fn default() -> Self {
    Self::new()
  }
}

impl Arena for MemArena {
  fn grow(
    &mut self,
    incr: usize,
  ) -> Result<usize> {
    let new_brk = self
      .brk
      .checked_add(incr)
      .filter(|&brk| brk <= self.limit)
      .ok_or(HeapError::OutOfMemory { requested: incr })?;

    self.words.resize(new_brk.div_ceil(mem::size_of::<u64>()), 0);

    let old_brk = self.brk;
    self.brk = new_brk;

    Ok(old_brk)
  }

  fn size(&self) -> usize {
    self.brk
  }

  fn words(&self) -> &[u64] {
    &self.words[..self.brk / mem::size_of::<u64>()]
  }

  fn words_mut(&mut self) -> &mut [u64] {
    &mut self.words[..self.brk / mem::size_of::<u64>()]
  }
}

/// An arena living on the real program break.
///
/// The first growth aligns the break to [`ALIGNMENT`]. Every later growth
/// must land directly after the previous one; if something else moved the
/// break in between, the new bytes are handed back and growth fails.
#[derive(Debug)]
pub struct SbrkArena {
  base: *mut u8,
  size: usize,
}

impl SbrkArena {
  pub fn new() -> Self {
    Self {
      base: ptr::null_mut(),
      size: 0,
    }
  }

  /// Finds and aligns the current program break.
  unsafe fn claim_base(&mut self) -> Result<()> {
    unsafe {
      let brk = sbrk(0);

      if brk == usize::MAX as *mut c_void {
        return Err(HeapError::OutOfMemory { requested: 0 });
      }

      let pad = (brk as usize).wrapping_neg() & (ALIGNMENT - 1);

      if pad != 0 && sbrk(pad as intptr_t) == usize::MAX as *mut c_void {
        return Err(HeapError::OutOfMemory { requested: pad });
      }

      self.base = (brk as *mut u8).add(pad);
    }

    Ok(())
  }
}

impl Default for SbrkArena {
  fn default() -> Self {
    Self::new()
  }
}

impl Arena for SbrkArena {
  fn grow(
    &mut self,
    incr: usize,
  ) -> Result<usize> {
    let delta = intptr_t::try_from(incr).map_err(|_| HeapError::OutOfMemory { requested: incr })?;

    unsafe {
      if self.base.is_null() {
        self.claim_base()?;
      }

      let expected = self.base.add(self.size);
      let address = sbrk(delta);

      if address == usize::MAX as *mut c_void {
        log::warn!("[segalloc] sbrk({}) failed", incr);
        return Err(HeapError::OutOfMemory { requested: incr });
      }

      if address as *mut u8 != expected {
        sbrk(-delta);
        log::warn!(
          "[segalloc] program break moved from {:?} to {:?}, giving {} bytes back",
          expected,
          address,
          incr
        );
        return Err(HeapError::Discontiguous {
          expected: expected as usize,
          found: address as usize,
        });
      }
    }

    let old_size = self.size;
    self.size += incr;

    Ok(old_size)
  }

  fn size(&self) -> usize {
    self.size
  }

  fn words(&self) -> &[u64] {
    if self.base.is_null() {
      return &[];
    }

    // SAFETY: `size` bytes starting at the aligned `base` were granted by sbrk
    // and are never returned while this arena lives.
    unsafe { slice::from_raw_parts(self.base.cast(), self.size / mem::size_of::<u64>()) }
  }

  fn words_mut(&mut self) -> &mut [u64] {
    if self.base.is_null() {
      return &mut [];
    }

    unsafe { slice::from_raw_parts_mut(self.base.cast(), self.size / mem::size_of::<u64>()) }
  }

  fn base(&self) -> *const u8 {
    self.base
  }
}
