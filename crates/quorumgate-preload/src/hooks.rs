//! Exported replacements for the monitored libc entry points.
//!
//! Each hook builds an [`InterceptedCall`], asks the gate, and either
//! delegates to the original or fails with the errno the gate reports. The re-entrancy flag is
//! released before delegating, so a forked child never inherits it set.

use std::ffi::{c_void, CStr, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use libc::{c_char, c_int, mode_t, off_t, pid_t, size_t, sockaddr, socklen_t, ssize_t};

use interceptor::fd::{is_standard_stream, resolve_descriptor};
use interceptor::guard::{self, Entry};
use interceptor::sockaddr::describe_sockaddr;
use quorumgate_core::{GateError, InterceptedCall, OperationKind, Resource};

use crate::context;

const EXEC_ARGS_KEPT: usize = 5;

/// What a hook wants to do with a call.
enum Capture {
    Gate(InterceptedCall),
    /// Counted as observed, never gated.
    Exempt,
}

fn run<T>(capture: impl FnOnce() -> Capture, failure: T, proceed: impl FnOnce() -> T) -> T {
    let denial = match guard::enter() {
        Entry::Nested => None,
        Entry::Fresh(_guard) => {
            let gate = context::gate();
            match capture() {
                Capture::Exempt => {
                    gate.stats().record_observed();
                    None
                }
                Capture::Gate(call) => gate.check(&call).errno(),
            }
        }
        // No way to reach a backend from here: sensitive calls fail.
        Entry::Unavailable => match capture() {
            Capture::Exempt => None,
            Capture::Gate(call) => {
                let passthrough = context::gate_if_ready()
                    .is_some_and(|gate| !gate.classifier().requires_consensus(&call));
                (!passthrough).then(|| {
                    GateError::TransportUnavailable("thread is shutting down".to_string()).errno()
                })
            }
        },
    };
    match denial {
        None => proceed(),
        Some(errno) => {
            set_errno(errno);
            failure
        }
    }
}

fn set_errno(value: c_int) {
    // SAFETY: __errno_location always returns the calling thread's errno slot.
    unsafe {
        *libc::__errno_location() = value;
    }
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn path_resource(ptr: *const c_char) -> Resource {
    if ptr.is_null() {
        return Resource::None;
    }
    let bytes = CStr::from_ptr(ptr).to_bytes();
    Resource::Path(PathBuf::from(OsStr::from_bytes(bytes)))
}

/// # Safety
/// `argv` must be null or a NULL-terminated array of C strings.
unsafe fn leading_args(argv: *const *const c_char) -> Vec<String> {
    let mut args = Vec::new();
    if argv.is_null() {
        return args;
    }
    for idx in 0..EXEC_ARGS_KEPT {
        let arg = *argv.add(idx);
        if arg.is_null() {
            break;
        }
        args.push(CStr::from_ptr(arg).to_string_lossy().into_owned());
    }
    args
}

fn open_call(path: *const c_char, flags: c_int, mode: mode_t) -> InterceptedCall {
    // SAFETY: the caller of open passes a C string or null.
    let resource = unsafe { path_resource(path) };
    let mut call = InterceptedCall::new(OperationKind::FileOpen, resource).with_flags(flags as i64);
    if takes_mode(flags) {
        call = call.with_mode(mode);
    }
    call
}

fn takes_mode(flags: c_int) -> bool {
    flags & (libc::O_CREAT | libc::O_TMPFILE) != 0
}

fn forwarded_mode(flags: c_int, mode: mode_t) -> libc::c_uint {
    if takes_mode(flags) {
        mode as libc::c_uint
    } else {
        0
    }
}

fn descriptor_call(kind: OperationKind, fd: c_int, count: size_t) -> Capture {
    if is_standard_stream(fd) {
        return Capture::Exempt;
    }
    Capture::Gate(InterceptedCall::new(kind, resolve_descriptor(None, fd)).with_size(count as u64))
}

// The open family is variadic in C. Stable Rust cannot define a variadic
// function, so these take the mode as a fixed third argument. On the
// x86_64 and aarch64 SysV ABIs a variadic int travels in the same register
// as a fixed one, so the value read is the caller's mode whenever the
// caller supplied one. When it did not, `mode` holds whatever the register
// contained, so it is only recorded and forwarded when O_CREAT or
// O_TMPFILE is set, which is exactly when C requires the caller to pass it.
#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    let original = context::originals().open;
    run(
        || Capture::Gate(open_call(path, flags, mode)),
        -1,
        || original(path, flags, forwarded_mode(flags, mode)),
    )
}

#[no_mangle]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    let original = context::originals().open64;
    run(
        || Capture::Gate(open_call(path, flags, mode)),
        -1,
        || original(path, flags, forwarded_mode(flags, mode)),
    )
}

#[no_mangle]
pub unsafe extern "C" fn openat(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    let original = context::originals().openat;
    run(
        || Capture::Gate(open_call(path, flags, mode).with_note(format!("dirfd={dirfd}"))),
        -1,
        || original(dirfd, path, flags, forwarded_mode(flags, mode)),
    )
}

#[no_mangle]
pub unsafe extern "C" fn creat(path: *const c_char, mode: mode_t) -> c_int {
    let original = context::originals().creat;
    let flags = libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC;
    run(
        || Capture::Gate(open_call(path, flags, mode)),
        -1,
        || original(path, mode),
    )
}

#[no_mangle]
pub unsafe extern "C" fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
    let original = context::originals().read;
    run(
        || descriptor_call(OperationKind::FileRead, fd, count),
        -1,
        || original(fd, buf, count),
    )
}

#[no_mangle]
pub unsafe extern "C" fn write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
    let original = context::originals().write;
    run(
        || descriptor_call(OperationKind::FileWrite, fd, count),
        -1,
        || original(fd, buf, count),
    )
}

#[no_mangle]
pub unsafe extern "C" fn execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let original = context::originals().execve;
    run(
        || {
            let resource = path_resource(path);
            let args = leading_args(argv);
            Capture::Gate(
                InterceptedCall::new(OperationKind::ProcessExec, resource).with_args(args),
            )
        },
        -1,
        || original(path, argv, envp),
    )
}

#[no_mangle]
pub unsafe extern "C" fn fork() -> pid_t {
    let original = context::originals().fork;
    run(
        || {
            Capture::Gate(
                InterceptedCall::new(OperationKind::ProcessFork, Resource::None)
                    .with_pid(std::process::id() as i32),
            )
        },
        -1,
        || original(),
    )
}

#[no_mangle]
pub unsafe extern "C" fn socket(domain: c_int, kind: c_int, protocol: c_int) -> c_int {
    let original = context::originals().socket;
    run(
        || {
            Capture::Gate(
                InterceptedCall::new(OperationKind::SocketCreate, Resource::None)
                    .with_flags(kind as i64)
                    .with_note(format!("domain={domain};protocol={protocol}")),
            )
        },
        -1,
        || original(domain, kind, protocol),
    )
}

#[no_mangle]
pub unsafe extern "C" fn connect(fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
    let original = context::originals().connect;
    run(
        || {
            let target = if addr.is_null() {
                None
            } else {
                let bytes = std::slice::from_raw_parts(addr.cast::<u8>(), len as usize);
                describe_sockaddr(bytes)
            };
            let note = match target {
                Some(target) => format!("fd={fd};addr={target}"),
                None => format!("fd={fd};addrlen={len}"),
            };
            Capture::Gate(
                InterceptedCall::new(OperationKind::NetworkConnect, Resource::None).with_note(note),
            )
        },
        -1,
        || original(fd, addr, len),
    )
}

#[no_mangle]
pub unsafe extern "C" fn mmap(
    addr: *mut c_void,
    length: size_t,
    prot: c_int,
    flags: c_int,
    fd: c_int,
    offset: off_t,
) -> *mut c_void {
    let original = context::originals().mmap;
    run(
        || {
            let resource = if flags & libc::MAP_ANONYMOUS != 0 || fd < 0 {
                Resource::None
            } else {
                resolve_descriptor(None, fd)
            };
            Capture::Gate(
                InterceptedCall::new(OperationKind::MemoryMap, resource)
                    .with_size(length as u64)
                    .with_flags(flags as i64)
                    .with_note(format!("prot={prot}")),
            )
        },
        libc::MAP_FAILED,
        || original(addr, length, prot, flags, fd, offset),
    )
}

#[no_mangle]
pub unsafe extern "C" fn chmod(path: *const c_char, mode: mode_t) -> c_int {
    let original = context::originals().chmod;
    run(
        || {
            let resource = path_resource(path);
            Capture::Gate(
                InterceptedCall::new(OperationKind::PermissionChange, resource).with_mode(mode),
            )
        },
        -1,
        || original(path, mode),
    )
}

#[no_mangle]
pub unsafe extern "C" fn unlink(path: *const c_char) -> c_int {
    let original = context::originals().unlink;
    run(
        || Capture::Gate(InterceptedCall::new(OperationKind::FileDelete, path_resource(path))),
        -1,
        || original(path),
    )
}
