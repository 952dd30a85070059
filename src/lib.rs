//! # segalloc - A Segregated-Fit Memory Allocator
//!
//! This crate provides a user-space **segregated free-list allocator** with
//! boundary-tag coalescing, built on nothing more than an arena that can grow
//! by N bytes or fail.
//!
//! ## Overview
//!
//! The heap is one contiguous arena, bounded by two sentinels:
//!
//! ```text
//!   Heap Layout:
//!
//!   offset 0                                                        brk
//!   ┌──────────┬─────────────┬──────────┬───────────────────┬──────────┐
//!   │ prologue │   block     │  block   │      block        │ epilogue │
//!   │  [8:a]   │  [216:a]    │  [64:f]  │    [65240:f]  ... │  [0:a]   │
//!   └──────────┴─────────────┴──────────┴───────────────────┴──────────┘
//!
//!   The prologue and epilogue are always allocated, so coalescing never
//!   has to special-case the ends of the heap.
//! ```
//!
//! Every block carries its size and state twice:
//!
//! ```text
//!   Allocated Block:                     Free Block:
//!   ┌────────────────────────┐           ┌────────────────────────┐
//!   │ header  size | a       │           │ header  size | f       │
//!   ├────────────────────────┤ ◄─ ptr    ├────────────────────────┤
//!   │                        │           │ next  ──► same class   │
//!   │        payload         │           │ prev  ──► same class   │
//!   │                        │           │        (unused)        │
//!   ├────────────────────────┤           ├────────────────────────┤
//!   │ footer  size | a       │           │ footer  size | f       │
//!   └────────────────────────┘           └────────────────────────┘
//! ```
//!
//! The footer lets a block read its left neighbor's size and state from the
//! word just before its own header, which is what makes constant-time
//! coalescing possible.
//!
//! Free blocks are kept in eleven size classes:
//!
//! ```text
//!   class:   0      1      2       3       ...   9              10
//!   sizes: 32-63  64-127 128-255 256-511   ... 16K-32K-1     32K and up
//!            │      │      │       │             │              │
//!            ▼      ▼      ▼       ▼             ▼              ▼
//!           [ ]    [ ]─►[ ] [ ]   [ ]           [ ]            [ ]─►[ ]
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Double-word alignment macros (align!, checked_align!)
//!   ├── arena      - Arena trait, MemArena and SbrkArena
//!   ├── block      - Boundary tags, block references and layout accessors
//!   ├── class      - Size-class index
//!   ├── list       - Segregated free lists
//!   ├── allocator  - Allocator facade: init, alloc, free, realloc
//!   ├── place      - find_fit and place (internal)
//!   ├── coalesce   - Boundary-tag coalescing (internal)
//!   ├── extend     - Heap extension (internal)
//!   ├── check      - Heap walk and consistency checker
//!   ├── config     - HeapConfig tunables
//!   ├── error      - HeapError
//!   └── fail       - OOM handler used by realloc
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::{Allocator, MemArena};
//!
//! let mut heap = Allocator::init(MemArena::new()).unwrap();
//!
//! let ptr = heap.alloc(200).unwrap().expect("non-zero request");
//! heap.payload_mut(ptr)[..5].copy_from_slice(b"hello");
//!
//! let ptr = heap.realloc(ptr, 400).unwrap();
//! assert_eq!(&heap.payload(ptr)[..5], b"hello");
//!
//! heap.free(ptr);
//! assert!(heap.check_heap(false).is_none());
//! ```
//!
//! ## How It Works
//!
//! - `alloc` adds 16 bytes of overhead, rounds up to 8 and to a 32 byte
//!   minimum. Adjusted sizes of 64 bytes or less grow the heap directly.
//!   Anything larger searches the lists from its own class upwards and takes
//!   the first block that fits, growing the heap by at least one chunk when
//!   nothing does.
//! - Placing splits off the remainder as a new free block when it is at
//!   least 32 bytes; a smaller remainder stays inside the allocation.
//! - `free` lists the block and merges it with whichever neighbors are free,
//!   so no two free blocks are ever adjacent.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization; wrap the allocator in one
//!   lock to share it.
//! - **No misuse detection**: freeing an invalid or already freed payload
//!   silently corrupts the heap.
//! - **The heap never shrinks**.

pub mod align;
pub mod arena;
pub mod block;
pub mod check;
pub mod class;
pub mod config;
pub mod error;
pub mod fail;
pub mod list;

mod allocator;
mod coalesce;
mod extend;
mod place;

pub use allocator::Allocator;
pub use arena::{Arena, MemArena, SbrkArena};
pub use block::{Block, BlockRef, Payload, Tag};
pub use check::Violation;
pub use config::HeapConfig;
pub use error::{HeapError, Result};
