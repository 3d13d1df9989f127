use std::os::unix::io::RawFd;
use std::path::PathBuf;

use anyhow::{Context, Result};
use byteorder::{ByteOrder, NativeEndian};

use interceptor::fd::{is_standard_stream, resolve_descriptor};
use interceptor::sockaddr::describe_sockaddr;
use interceptor::{Gate, GateDecision};
use quorumgate_core::{InterceptedCall, OperationKind, Resource};

use crate::memory;

// -- Linux Seccomp Userspace Notification ABI --

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SeccompData {
    pub nr: i32,
    pub arch: u32,
    pub instruction_pointer: u64,
    pub args: [u64; 6],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SeccompNotif {
    pub id: u64,
    pub pid: u32,
    pub flags: u32,
    pub data: SeccompData,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SeccompNotifResp {
    pub id: u64,
    pub val: i64,
    pub error: i32,
    pub flags: u32,
}

nix::ioctl_readwrite!(seccomp_notif_recv, b'!', 0, SeccompNotif);
nix::ioctl_readwrite!(seccomp_notif_send, b'!', 1, SeccompNotifResp);
nix::ioctl_write_ptr!(seccomp_notif_id_valid, b'!', 2, u64);

const SECCOMP_USER_NOTIF_FLAG_CONTINUE: u32 = 1;

/// Longest socket address copied out of the child.
const SOCKADDR_LIMIT: usize = 128;

/// What the supervisor makes of one notification.
enum Capture {
    Gate(InterceptedCall),
    /// A monitored call with an argument that could not be read.
    Unreadable(InterceptedCall, String),
    /// Counted as observed, never gated.
    Exempt,
    /// Not a monitored operation (thread creation).
    Ignore,
}

/// Takes the next pending notification off the filter.
pub fn receive_notification(seccomp_fd: RawFd) -> Result<SeccompNotif> {
    let mut req = SeccompNotif::default();
    // SAFETY: `req` is a correctly sized, writable seccomp_notif.
    unsafe {
        seccomp_notif_recv(seccomp_fd, &mut req)
            .context("ioctl SECCOMP_IOCTL_NOTIF_RECV failed")?;
    }
    Ok(req)
}

/// Runs one received notification through the gate and answers the
/// kernel. Returns the gate decision when one was made.
pub fn answer_notification(
    seccomp_fd: RawFd,
    req: &SeccompNotif,
    gate: &Gate,
) -> Result<Option<GateDecision>> {
    let capture = capture(req);

    // The task may have died, and its pid been reused, while arguments were
    // being read.
    if !id_still_valid(seccomp_fd, req.id) {
        tracing::debug!(pid = req.pid, nr = req.data.nr, "notification expired");
        return Ok(None);
    }

    let decision = match capture {
        Capture::Gate(call) => Some(gate.check(&call)),
        Capture::Unreadable(call, reason) => Some(gate.reject(&call, reason)),
        Capture::Exempt => {
            gate.stats().record_observed();
            None
        }
        Capture::Ignore => None,
    };

    let mut resp = response_for(req.id, decision.as_ref().and_then(GateDecision::errno));
    // SAFETY: `resp` is a correctly sized seccomp_notif_resp.
    if let Err(err) = unsafe { seccomp_notif_send(seccomp_fd, &mut resp) } {
        // ENOENT: the task went away while the gate was deciding.
        if err != nix::errno::Errno::ENOENT {
            return Err(err).context("ioctl SECCOMP_IOCTL_NOTIF_SEND failed");
        }
    }

    Ok(decision)
}

/// Continue the syscall untouched, or fail it with `errno`.
fn response_for(id: u64, errno: Option<i32>) -> SeccompNotifResp {
    match errno {
        None => SeccompNotifResp {
            id,
            val: 0,
            error: 0,
            flags: SECCOMP_USER_NOTIF_FLAG_CONTINUE,
        },
        Some(errno) => SeccompNotifResp {
            id,
            val: 0,
            error: -errno,
            flags: 0,
        },
    }
}

fn id_still_valid(seccomp_fd: RawFd, id: u64) -> bool {
    // SAFETY: the ioctl only reads the id.
    unsafe { seccomp_notif_id_valid(seccomp_fd, &id).is_ok() }
}

fn capture(req: &SeccompNotif) -> Capture {
    let pid = req.pid as i32;
    let args = req.data.args;

    match req.data.nr as libc::c_long {
        libc::SYS_execve => exec_call(pid, args[0], args[1]),
        libc::SYS_execveat => exec_call(pid, args[1], args[2]),
        libc::SYS_clone => fork_call(pid, args[0]),
        libc::SYS_clone3 => match memory::read_remote_memory(pid, args[0], 8) {
            Ok(bytes) => fork_call(pid, NativeEndian::read_u64(&bytes)),
            Err(err) => Capture::Unreadable(
                InterceptedCall::new(OperationKind::ProcessFork, Resource::None).with_pid(pid),
                format!("clone3 arguments unreadable: {err}"),
            ),
        },
        libc::SYS_openat => open_call(pid, args[1], args[2] as i32, args[3] as u32),
        libc::SYS_unlinkat => path_call(OperationKind::FileDelete, pid, args[1]),
        libc::SYS_fchmodat => match path_call(OperationKind::PermissionChange, pid, args[1]) {
            Capture::Gate(call) => Capture::Gate(call.with_mode(args[2] as u32)),
            other => other,
        },
        libc::SYS_read => descriptor_call(OperationKind::FileRead, pid, args[0], args[2]),
        libc::SYS_write => descriptor_call(OperationKind::FileWrite, pid, args[0], args[2]),
        libc::SYS_socket => Capture::Gate(
            InterceptedCall::new(OperationKind::SocketCreate, Resource::None)
                .with_pid(pid)
                .with_flags(args[1] as i64)
                .with_note(format!("domain={};protocol={}", args[0], args[2])),
        ),
        libc::SYS_connect => connect_call(pid, args[0], args[1], args[2]),
        libc::SYS_mmap => mmap_call(pid, args),
        #[cfg(target_arch = "x86_64")]
        libc::SYS_open => open_call(pid, args[0], args[1] as i32, args[2] as u32),
        #[cfg(target_arch = "x86_64")]
        libc::SYS_creat => open_call(
            pid,
            args[0],
            libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC,
            args[1] as u32,
        ),
        #[cfg(target_arch = "x86_64")]
        libc::SYS_fork | libc::SYS_vfork => fork_call(pid, 0),
        #[cfg(target_arch = "x86_64")]
        libc::SYS_unlink => path_call(OperationKind::FileDelete, pid, args[0]),
        #[cfg(target_arch = "x86_64")]
        libc::SYS_chmod => match path_call(OperationKind::PermissionChange, pid, args[0]) {
            Capture::Gate(call) => Capture::Gate(call.with_mode(args[1] as u32)),
            other => other,
        },
        nr => {
            tracing::debug!(nr, "unexpected syscall notification");
            Capture::Ignore
        }
    }
}

fn read_path(pid: i32, addr: u64) -> Result<PathBuf> {
    use std::os::unix::ffi::OsStringExt;
    let bytes = memory::read_remote_cstring(pid, addr, memory::PATH_LIMIT)?;
    Ok(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

fn path_call(kind: OperationKind, pid: i32, addr: u64) -> Capture {
    match read_path(pid, addr) {
        Ok(path) => Capture::Gate(InterceptedCall::on_path(kind, path).with_pid(pid)),
        Err(err) => Capture::Unreadable(
            InterceptedCall::new(kind, Resource::None).with_pid(pid),
            format!("path argument unreadable: {err}"),
        ),
    }
}

fn open_call(pid: i32, path_addr: u64, flags: i32, mode: u32) -> Capture {
    match path_call(OperationKind::FileOpen, pid, path_addr) {
        Capture::Gate(call) => {
            let call = call.with_flags(flags as i64);
            if flags & (libc::O_CREAT | libc::O_TMPFILE) != 0 {
                Capture::Gate(call.with_mode(mode))
            } else {
                Capture::Gate(call)
            }
        }
        other => other,
    }
}

fn exec_call(pid: i32, path_addr: u64, argv_addr: u64) -> Capture {
    match path_call(OperationKind::ProcessExec, pid, path_addr) {
        Capture::Gate(call) => Capture::Gate(call.with_args(read_argv(pid, argv_addr))),
        other => other,
    }
}

/// Up to the first five argv entries; unreadable entries end the list.
fn read_argv(pid: i32, argv_addr: u64) -> Vec<String> {
    let mut args = Vec::new();
    if argv_addr == 0 {
        return args;
    }
    for idx in 0..5u64 {
        let Ok(slot) = memory::read_remote_memory(pid, argv_addr + idx * 8, 8) else {
            break;
        };
        let ptr = NativeEndian::read_u64(&slot);
        if ptr == 0 {
            break;
        }
        match memory::read_remote_cstring(pid, ptr, memory::PATH_LIMIT) {
            Ok(bytes) => args.push(String::from_utf8_lossy(&bytes).into_owned()),
            Err(_) => break,
        }
    }
    args
}

fn fork_call(pid: i32, clone_flags: u64) -> Capture {
    if clone_flags & libc::CLONE_THREAD as u64 != 0 {
        return Capture::Ignore;
    }
    Capture::Gate(InterceptedCall::new(OperationKind::ProcessFork, Resource::None).with_pid(pid))
}

fn descriptor_call(kind: OperationKind, pid: i32, fd: u64, count: u64) -> Capture {
    let fd = fd as i32;
    if is_standard_stream(fd) {
        return Capture::Exempt;
    }
    Capture::Gate(
        InterceptedCall::new(kind, resolve_descriptor(Some(pid), fd))
            .with_pid(pid)
            .with_size(count),
    )
}

fn connect_call(pid: i32, fd: u64, addr: u64, len: u64) -> Capture {
    let len = (len as usize).min(SOCKADDR_LIMIT);
    let target = memory::read_remote_memory(pid, addr, len)
        .ok()
        .and_then(|bytes| describe_sockaddr(&bytes));
    let note = match target {
        Some(target) => format!("fd={fd};addr={target}"),
        None => format!("fd={fd};addrlen={len}"),
    };
    Capture::Gate(
        InterceptedCall::new(OperationKind::NetworkConnect, Resource::None)
            .with_pid(pid)
            .with_note(note),
    )
}

fn mmap_call(pid: i32, args: [u64; 6]) -> Capture {
    let flags = args[3] as i32;
    let fd = args[4] as i32;
    let resource = if flags & libc::MAP_ANONYMOUS != 0 || fd < 0 {
        Resource::None
    } else {
        resolve_descriptor(Some(pid), fd)
    };
    Capture::Gate(
        InterceptedCall::new(OperationKind::MemoryMap, resource)
            .with_pid(pid)
            .with_size(args[1])
            .with_flags(flags as i64)
            .with_note(format!("prot={}", args[2])),
    )
}
