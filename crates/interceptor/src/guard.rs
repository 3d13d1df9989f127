//! Per-thread re-entrancy flag for in-process hooks.
//!
//! The gate's own I/O (transport sockets, log output, config reads) goes
//! through the same hooked entry points. While a thread holds a
//! [`HookGuard`], every further hook on that thread delegates straight to libc.

use std::cell::Cell;

thread_local! {
    static INSIDE_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// How the current thread stands relative to the gate.
pub enum Entry {
    /// First hook on this thread; the flag stays set until the guard drops.
    Fresh(HookGuard),
    /// Already inside a hook: the gate's own I/O, delegate directly.
    Nested,
    /// Thread-local storage is gone (thread teardown).
    Unavailable,
}

pub struct HookGuard(());

impl Drop for HookGuard {
    fn drop(&mut self) {
        let _ = INSIDE_HOOK.try_with(|inside| inside.set(false));
    }
}

pub fn enter() -> Entry {
    match INSIDE_HOOK.try_with(|inside| inside.replace(true)) {
        Ok(false) => Entry::Fresh(HookGuard(())),
        Ok(true) => Entry::Nested,
        Err(_) => Entry::Unavailable,
    }
}
