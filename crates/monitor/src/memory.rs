use std::io::IoSliceMut;

use anyhow::{bail, Context, Result};
use nix::sys::uio::{process_vm_readv, RemoteIoVec};
use nix::unistd::Pid;

/// Longest path argument read out of a supervised process.
pub const PATH_LIMIT: usize = libc::PATH_MAX as usize;

const PAGE: u64 = 4096;

/// Reads exactly `len` bytes from another process.
pub fn read_remote_memory(pid: i32, remote_addr: u64, len: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; len];
    let bytes_read = read_into(pid, remote_addr, &mut buffer)?;
    if bytes_read != len {
        bail!("partial read from pid {pid}: expected {len} bytes, got {bytes_read}");
    }
    Ok(buffer)
}

/// Reads a NUL-terminated string of at most `limit` bytes from another
/// process. Reads never cross a page boundary, so a string that ends just
/// before an unmapped page is still read in full.
pub fn read_remote_cstring(pid: i32, remote_addr: u64, limit: usize) -> Result<Vec<u8>> {
    if remote_addr == 0 {
        bail!("null string pointer");
    }
    let mut out = Vec::new();
    let mut addr = remote_addr;
    while out.len() < limit {
        let to_page_end = (PAGE - addr % PAGE) as usize;
        let chunk_len = to_page_end.min(limit - out.len());
        let mut chunk = vec![0u8; chunk_len];
        let bytes_read = read_into(pid, addr, &mut chunk)?;
        if bytes_read == 0 {
            bail!("string at {remote_addr:#x} in pid {pid} is unreadable");
        }
        if let Some(end) = chunk[..bytes_read].iter().position(|byte| *byte == 0) {
            out.extend_from_slice(&chunk[..end]);
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..bytes_read]);
        addr += bytes_read as u64;
    }
    bail!("string at {remote_addr:#x} in pid {pid} exceeds {limit} bytes")
}

fn read_into(pid: i32, remote_addr: u64, buffer: &mut [u8]) -> Result<usize> {
    let len = buffer.len();
    let mut local_iov = [IoSliceMut::new(buffer)];
    let remote_iov = [RemoteIoVec {
        base: remote_addr as usize,
        len,
    }];
    process_vm_readv(Pid::from_raw(pid), &mut local_iov, &remote_iov)
        .with_context(|| format!("read memory of pid {pid} at {remote_addr:#x}"))
}
