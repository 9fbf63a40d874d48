use std::io::Read;

use arenalloc::{alloc_del, alloc_new, alloc_resize, last_error, thread_stats};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect the process with tools like `pmap` or
/// `gdb` between steps and watch arenas get mapped and unmapped.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the calling thread's arena count, bytes bumped and free blocks.
fn print_stats(label: &str) {
  if let Some(stats) = thread_stats() {
    println!(
      "[{}] PID = {}, arenas = {}, arena bytes used = {}, free blocks = {}",
      label,
      std::process::id(),
      stats.arenas,
      stats.arena_bytes_used,
      stats.free_blocks,
    );
  }
}

fn main() {
  print_stats("start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Allocate 1 KiB. It is bump-allocated from the head arena.
  // --------------------------------------------------------------------
  let mut ptr = alloc_new(1024);
  if ptr.is_null() {
    eprintln!("alloc_new failed: {:?}", last_error());
    std::process::exit(1);
  }
  println!("\n[1] alloc_new(1024) = {:?}", ptr);

  unsafe {
    ptr.write_bytes(0xAB, 1024);
  }
  print_stats("1");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Grow it to 2 KiB. The contents move to a new block and the old
  //    one lands on the 1 KiB free list.
  // --------------------------------------------------------------------
  if unsafe { alloc_resize(Some(&mut ptr), 2048) } != 0 {
    eprintln!("alloc_resize failed: {:?}", last_error());
    std::process::exit(1);
  }
  println!("\n[2] alloc_resize(.., 2048) = {:?}, first byte = 0x{:X}", ptr, unsafe {
    *ptr
  });
  print_stats("2");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Shrink it to 512 bytes.
  // --------------------------------------------------------------------
  if unsafe { alloc_resize(Some(&mut ptr), 512) } != 0 {
    eprintln!("alloc_resize failed: {:?}", last_error());
    std::process::exit(1);
  }
  println!("\n[3] alloc_resize(.., 512) = {:?}", ptr);
  print_stats("3");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Allocate 64 KiB. Too big for an arena, so it gets its own mapping.
  // --------------------------------------------------------------------
  let big = alloc_new(64 * 1024);
  println!("\n[4] alloc_new(64 KiB) = {:?}", big);
  print_stats("4");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Free both. The large mapping is unmapped right away.
  // --------------------------------------------------------------------
  unsafe {
    alloc_del(big);
    alloc_del(ptr);
  }
  println!("\n[5] Freed both blocks");
  print_stats("5");

  println!("\n[6] End of example. The thread's arenas are released when it exits.");
}
