use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::os::unix::net::UnixStream;

use anyhow::{anyhow, Context, Result};
use libseccomp::{ScmpAction, ScmpFilterContext, ScmpSyscall};
use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};

/// Syscalls routed to the supervisor. Names missing on the running
/// architecture (`open`, `fork`, ... on aarch64) are skipped.
pub const MONITORED_SYSCALLS: &[&str] = &[
    "execve", "execveat", "fork", "vfork", "clone", "clone3", "open", "openat", "creat", "read",
    "write", "unlink", "unlinkat", "chmod", "fchmodat", "socket", "connect", "mmap",
];

/// Installs a filter that leaves everything allowed except the monitored
/// set, which waits on the supervisor. Returns the notification descriptor.
pub fn install_seccomp_filter() -> Result<RawFd> {
    let mut ctx =
        ScmpFilterContext::new(ScmpAction::Allow).context("Failed to create Seccomp context")?;

    for syscall_name in MONITORED_SYSCALLS {
        let Ok(syscall) = ScmpSyscall::from_name(syscall_name) else {
            continue;
        };
        ctx.add_rule(ScmpAction::Notify, syscall)
            .with_context(|| format!("Failed to add rule for {}", syscall_name))?;
    }

    ctx.load().context("Failed to load Seccomp filter")?;

    let fd = ctx
        .get_notify_fd()
        .context("Failed to get Seccomp notification FD. Is your kernel new enough?")?;

    Ok(fd)
}

/// Byte carried alongside the descriptor so a stray write on the channel is
/// not mistaken for the handoff.
const HANDOFF_TAG: u8 = b'N';

/// Child side of the handoff: passes the filter's notification descriptor
/// to the supervisor. Runs between fork and exec, so it only issues
/// `sendmsg` and reports failures as plain `io::Error`.
pub fn pass_notify_fd(channel: RawFd, notify: RawFd) -> std::io::Result<()> {
    let fds = [notify];
    sendmsg::<()>(
        channel,
        &[IoSlice::new(&[HANDOFF_TAG])],
        &[ControlMessage::ScmRights(&fds)],
        MsgFlags::empty(),
        None,
    )?;
    Ok(())
}

/// Supervisor side of the handoff. Fails if the child exits before the
/// filter is loaded or sends anything but a single tagged descriptor.
pub fn accept_notify_fd(channel: &UnixStream) -> Result<OwnedFd> {
    let mut tag = [0u8; 1];
    let mut iov = [IoSliceMut::new(&mut tag)];
    let mut space = nix::cmsg_space!(RawFd);

    let msg = recvmsg::<()>(channel.as_raw_fd(), &mut iov, Some(&mut space), MsgFlags::empty())
        .context("receive seccomp notification descriptor")?;
    let received = msg
        .cmsgs()?
        .find_map(|cmsg| match cmsg {
            ControlMessageOwned::ScmRights(fds) => fds.first().copied(),
            _ => None,
        })
        // SAFETY: SCM_RIGHTS installed a new descriptor in this process.
        .map(|fd| unsafe { OwnedFd::from_raw_fd(fd) });
    let bytes = msg.bytes;

    match received {
        Some(fd) if bytes == 1 && tag[0] == HANDOFF_TAG => Ok(fd),
        Some(_) => Err(anyhow!("unexpected payload alongside notification descriptor")),
        None => Err(anyhow!("child exited before handing over its seccomp filter")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, Write};

    #[test]
    fn descriptor_survives_transfer() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"quorum").unwrap();

        pass_notify_fd(left.as_raw_fd(), file.as_raw_fd()).unwrap();
        let received = accept_notify_fd(&right).unwrap();

        let mut copy = std::fs::File::from(received);
        copy.rewind().unwrap();
        let mut contents = String::new();
        copy.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "quorum");
    }

    #[test]
    fn closed_peer_yields_no_descriptor() {
        let (left, right) = UnixStream::pair().unwrap();
        drop(left);
        assert!(accept_notify_fd(&right).is_err());
    }

    #[test]
    fn plain_bytes_are_not_a_handoff() {
        let (mut left, right) = UnixStream::pair().unwrap();
        left.write_all(b"N").unwrap();
        assert!(accept_notify_fd(&right).is_err());
    }
}
