//! Out-of-memory handling for `realloc`.
//!
//! `alloc` reports exhaustion to its caller. `realloc` does not: when its
//! internal allocation fails it calls the allocator's OOM handler, which never
//! returns.

/// Signature of an OOM handler.
pub type OomHandler = fn() -> !;

/// Logs and aborts the process.
#[cold]
pub fn default_oom_handler() -> ! {
  log::error!("[segalloc] the application ran out of memory, aborting");

  // SAFETY: abort has no preconditions and never returns.
  unsafe { libc::abort() }
}
