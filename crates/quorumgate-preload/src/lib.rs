//! `LD_PRELOAD` library that routes monitored libc entry points through the
//! consensus gate.
//!
//! Loading the library resolves every original symbol, loads configuration
//! and installs logging before `main` runs. At exit the statistics summary
//! is logged once.

mod context;
mod hooks;
mod originals;
