pub mod filesystem;
pub mod memory;
pub mod network;
pub mod process;
