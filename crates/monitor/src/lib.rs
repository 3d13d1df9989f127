//! Kernel-level interception: a seccomp user-notification filter installed
//! in the supervised process, answered from the launching process through
//! the same gate the preload library uses.

pub mod memory;
pub mod seccomp_handler;
pub mod supervisor;
pub mod syscalls;

pub use supervisor::SeccompProvider;
