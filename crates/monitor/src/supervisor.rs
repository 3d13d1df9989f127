use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use interceptor::{Gate, InterceptionProvider, LaunchRequest, Mechanism, ProviderRun};
use quorumgate_core::config::{Config, CONFIG_ENV};

use crate::seccomp_handler::{self, SeccompNotif};
use crate::syscalls;

const POLL_INTERVAL_MS: u16 = 100;

/// Runs the command under a seccomp user-notification filter and answers
/// every monitored syscall from this process.
pub struct SeccompProvider {
    config: Config,
}

impl SeccompProvider {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl InterceptionProvider for SeccompProvider {
    fn name(&self) -> &'static str {
        "seccomp"
    }

    fn mechanism(&self) -> Mechanism {
        Mechanism::KernelFilter
    }

    fn launch(&self, request: &LaunchRequest) -> Result<ProviderRun> {
        let gate = Arc::new(Gate::from_config(&self.config));
        let stop = Arc::new(AtomicBool::new(false));
        let (parent_sock, child_sock) = UnixStream::pair().context("create fd transfer socket")?;

        // Started before spawn: spawn only returns once the child has exec'd,
        // and the exec itself waits on the supervisor.
        let supervisor = {
            let gate = Arc::clone(&gate);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("quorumgate-supervisor".to_string())
                .spawn(move || -> Result<()> {
                    let notify = syscalls::accept_notify_fd(&parent_sock)?;
                    drop(parent_sock);
                    supervise(&notify, &gate, &stop)
                })
                .context("start supervisor thread")?
        };

        let mut command = Command::new(&request.program);
        command.args(&request.args);
        if let Some(config_path) = &request.config_path {
            command.env(CONFIG_ENV, config_path);
        }
        let child_fd = child_sock.as_raw_fd();
        // SAFETY: pre_exec runs between fork() and exec(). The closure loads
        // the filter and passes its notification descriptor back over a
        // socket inherited from the parent. Errors abort the exec.
        unsafe {
            command.pre_exec(move || {
                let notify = syscalls::install_seccomp_filter()
                    .map_err(|err| std::io::Error::other(err.to_string()))?;
                let passed = syscalls::pass_notify_fd(child_fd, notify);
                libc::close(notify);
                passed?;
                Ok(())
            });
        }

        let spawned = command.spawn();
        drop(child_sock);
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                stop.store(true, Ordering::Release);
                let _ = supervisor.join();
                return Err(err).with_context(|| format!("launch {}", request.program.display()));
            }
        };
        tracing::info!(
            pid = child.id(),
            program = %request.program.display(),
            backend = gate.transport_name(),
            "supervising under seccomp"
        );

        let status = child.wait().context("wait for supervised process")?;
        stop.store(true, Ordering::Release);
        supervisor
            .join()
            .map_err(|_| anyhow!("supervisor thread panicked"))??;

        Ok(ProviderRun {
            exit_code: status.code(),
            summary: gate.stats().finalize(),
        })
    }
}

/// Serves notifications until every filtered task is gone or `stop` is set.
/// Each notification is answered on its own worker, so one slow consensus
/// round trip never holds up the child's other threads.
fn supervise(notify: &OwnedFd, gate: &Gate, stop: &AtomicBool) -> Result<()> {
    let fd = notify.as_raw_fd();
    let next = || -> Result<Option<SeccompNotif>> {
        loop {
            if stop.load(Ordering::Acquire) {
                return Ok(None);
            }
            let mut fds = [PollFd::new(notify.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS)) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(err) => return Err(err).context("poll seccomp notification fd"),
            }
            let revents = fds[0].revents().unwrap_or(PollFlags::empty());
            if revents.contains(PollFlags::POLLIN) {
                match seccomp_handler::receive_notification(fd) {
                    Ok(req) => return Ok(Some(req)),
                    // The task died between poll and receive.
                    Err(err) => tracing::debug!(error = %format!("{err:#}"), "notification lost"),
                }
            } else if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR) {
                return Ok(None);
            }
        }
    };
    dispatch(next, |req| {
        if let Err(err) = seccomp_handler::answer_notification(fd, &req, gate) {
            tracing::debug!(error = %format!("{err:#}"), "notification not handled");
        }
    })
}

/// Runs `handle` for every item `next` yields, each on its own scoped
/// thread, until `next` returns `Ok(None)`. Returns once every worker has
/// finished. An item whose worker cannot be started is handled inline.
fn dispatch<T, N, H>(mut next: N, handle: H) -> Result<()>
where
    T: Copy + Send,
    N: FnMut() -> Result<Option<T>>,
    H: Fn(T) + Sync,
{
    let handle = &handle;
    thread::scope(|scope| {
        while let Some(item) = next()? {
            let spawned = thread::Builder::new()
                .name("quorumgate-notify".to_string())
                .spawn_scoped(scope, move || handle(item));
            if let Err(err) = spawned {
                tracing::warn!(error = %err, "no worker for notification, answering inline");
                handle(item);
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn slow_item_does_not_hold_up_the_next() {
        // Item 0 only completes once item 1 has been handled.
        let (tx, rx) = mpsc::channel::<()>();
        let rx = Mutex::new(rx);
        let tx = Mutex::new(tx);
        let finished = Mutex::new(Vec::new());

        let mut items = vec![1u32, 0u32];
        dispatch(
            || Ok(items.pop()),
            |item| {
                if item == 0 {
                    let waited = rx
                        .lock()
                        .unwrap()
                        .recv_timeout(Duration::from_secs(5))
                        .is_ok();
                    finished.lock().unwrap().push((item, waited));
                } else {
                    tx.lock().unwrap().send(()).unwrap();
                    finished.lock().unwrap().push((item, true));
                }
            },
        )
        .unwrap();

        let mut finished = finished.into_inner().unwrap();
        finished.sort();
        assert_eq!(finished, vec![(0, true), (1, true)]);
    }

    #[test]
    fn source_error_ends_dispatch_after_workers_finish() {
        let handled = Mutex::new(0);
        let mut yielded = false;
        let result = dispatch(
            || {
                if yielded {
                    return Err(anyhow!("poll failed"));
                }
                yielded = true;
                Ok(Some(()))
            },
            |()| *handled.lock().unwrap() += 1,
        );
        assert!(result.is_err());
        assert_eq!(*handled.lock().unwrap(), 1);
    }
}
