use std::io::Read;

use libc::sbrk;
use segalloc::{Allocator, Block, Payload, SbrkArena};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb` while the heap changes shape.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

/// Prints every block between the prologue and the epilogue.
fn print_heap(heap: &Allocator<SbrkArena>) {
  for block in heap.blocks() {
    let marker = if block.is_free() { "  free " } else { "  used " };
    println!("{}{}", marker, block);
  }

  match heap.check_heap(false) {
    None => println!("  heap is consistent"),
    Some(violation) => println!("  HEAP IS CORRUPT: {}", violation),
  }
}

fn print_alloc(
  heap: &Allocator<SbrkArena>,
  size: usize,
  ptr: Payload,
) {
  println!(
    "Allocated {} bytes, payload = {} (address {:#x}), capacity = {}",
    size,
    ptr,
    heap.addr(ptr),
    heap.capacity(ptr),
  );
}

fn main() {
  print_program_break("start");

  let mut heap = match Allocator::init(SbrkArena::new()) {
    Ok(heap) => heap,
    Err(err) => {
      eprintln!("could not set up the heap: {}", err);
      std::process::exit(1);
    }
  };

  print_program_break("after init");
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) A small request. Its adjusted size is at most 64 bytes, so the heap
  //    grows by exactly one block instead of searching the free lists.
  // --------------------------------------------------------------------
  let small = heap.alloc(24).unwrap().unwrap();
  println!("\n[1] Allocate 24 bytes (direct growth)");
  print_alloc(&heap, 24, small);
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Three medium blocks, carved from the initial free block.
  // --------------------------------------------------------------------
  let a = heap.alloc(200).unwrap().unwrap();
  let b = heap.alloc(200).unwrap().unwrap();
  let c = heap.alloc(200).unwrap().unwrap();
  println!("\n[2] Allocate three 200 byte blocks");
  for ptr in [a, b, c] {
    print_alloc(&heap, 200, ptr);
  }

  heap.payload_mut(b)[..12].copy_from_slice(b"hello, heap!");
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Free them out of order. The last free merges all three.
  // --------------------------------------------------------------------
  heap.free(a);
  heap.free(c);
  println!("\n[3a] Freed a and c");
  print_heap(&heap);

  let b = heap.realloc(b, 500).unwrap();
  println!(
    "\n[3b] Moved b to {}: {:?}",
    b,
    String::from_utf8_lossy(&heap.payload(b)[..12])
  );
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) A request larger than any free block grows the heap.
  // --------------------------------------------------------------------
  print_program_break("before large alloc");
  println!("\n[4] Allocate 128 KiB");
  let big = match heap.alloc(128 * 1024) {
    Ok(Some(big)) => {
      print_alloc(&heap, 128 * 1024, big);
      Some(big)
    }
    // The process's own malloc may have moved the break since init.
    Ok(None) | Err(_) => {
      println!("[4] Could not grow the heap, the program break is no longer ours");
      None
    }
  };
  print_program_break("after large alloc");
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Free everything. The heap collapses into one free block, but the
  //    program break stays where it is: the heap never shrinks.
  // --------------------------------------------------------------------
  for ptr in [Some(small), Some(b), big].into_iter().flatten() {
    heap.free(ptr);
  }

  let free: Vec<Block> = heap.blocks().filter(Block::is_free).collect();
  println!("\n[5] Freed everything, {} free block(s) remain", free.len());
  print_heap(&heap);
  print_program_break("end");
}
