use std::ffi::{c_void, CStr};

use libc::{c_char, c_int, mode_t, off_t, pid_t, size_t, sockaddr, socklen_t, ssize_t};

use quorumgate_core::GateError;

pub type OpenFn = unsafe extern "C" fn(*const c_char, c_int, ...) -> c_int;
pub type OpenatFn = unsafe extern "C" fn(c_int, *const c_char, c_int, ...) -> c_int;
pub type CreatFn = unsafe extern "C" fn(*const c_char, mode_t) -> c_int;
pub type ReadFn = unsafe extern "C" fn(c_int, *mut c_void, size_t) -> ssize_t;
pub type WriteFn = unsafe extern "C" fn(c_int, *const c_void, size_t) -> ssize_t;
pub type ExecveFn =
    unsafe extern "C" fn(*const c_char, *const *const c_char, *const *const c_char) -> c_int;
pub type ForkFn = unsafe extern "C" fn() -> pid_t;
pub type SocketFn = unsafe extern "C" fn(c_int, c_int, c_int) -> c_int;
pub type ConnectFn = unsafe extern "C" fn(c_int, *const sockaddr, socklen_t) -> c_int;
pub type MmapFn = unsafe extern "C" fn(*mut c_void, size_t, c_int, c_int, c_int, off_t) -> *mut c_void;
pub type ChmodFn = unsafe extern "C" fn(*const c_char, mode_t) -> c_int;
pub type UnlinkFn = unsafe extern "C" fn(*const c_char) -> c_int;

/// The next definition of every interposed symbol, resolved once.
pub struct Originals {
    pub open: OpenFn,
    pub open64: OpenFn,
    pub openat: OpenatFn,
    pub creat: CreatFn,
    pub read: ReadFn,
    pub write: WriteFn,
    pub execve: ExecveFn,
    pub fork: ForkFn,
    pub socket: SocketFn,
    pub connect: ConnectFn,
    pub mmap: MmapFn,
    pub chmod: ChmodFn,
    pub unlink: UnlinkFn,
}

impl Originals {
    pub fn resolve() -> Result<Self, GateError> {
        // SAFETY: each name is paired with the C prototype of the libc
        // function it designates.
        unsafe {
            Ok(Self {
                open: next(c"open")?,
                open64: next(c"open64")?,
                openat: next(c"openat")?,
                creat: next(c"creat")?,
                read: next(c"read")?,
                write: next(c"write")?,
                execve: next(c"execve")?,
                fork: next(c"fork")?,
                socket: next(c"socket")?,
                connect: next(c"connect")?,
                mmap: next(c"mmap")?,
                chmod: next(c"chmod")?,
                unlink: next(c"unlink")?,
            })
        }
    }
}

/// Looks up the definition that follows this library in search order.
///
/// # Safety
/// `F` must be a function pointer type matching the symbol's prototype.
unsafe fn next<F: Copy>(name: &CStr) -> Result<F, GateError> {
    let symbol = libc::dlsym(libc::RTLD_NEXT, name.as_ptr());
    if symbol.is_null() {
        return Err(GateError::OriginalUnresolved(
            name.to_string_lossy().into_owned(),
        ));
    }
    Ok(std::mem::transmute_copy::<*mut c_void, F>(&symbol))
}
