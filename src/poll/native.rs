// src/poll/native.rs

//! `poll(2)` backend.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use tracing::warn;

use super::{timeout_to_ms, EventMask, PollBackend, PollEvent};

/// Readiness polling over a flat `pollfd` array.
///
/// Registration order is preserved in the array, but callers must not rely
/// on any particular ordering of the returned events.
#[derive(Debug, Default)]
pub struct NativePoll {
    fds: Vec<libc::pollfd>,
}

impl NativePoll {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PollBackend for NativePoll {
    fn register(&mut self, fd: RawFd, mask: EventMask) {
        // The reactor enforces one watch per descriptor; a stale entry here
        // would double-report, so replace rather than append.
        self.unregister(fd);
        self.fds.push(libc::pollfd {
            fd,
            events: mask.bits(),
            revents: 0,
        });
    }

    fn unregister(&mut self, fd: RawFd) {
        self.fds.retain(|p| p.fd != fd);
    }

    fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<PollEvent>> {
        let timeout_ms = timeout_to_ms(timeout);

        loop {
            let rc = unsafe {
                libc::poll(
                    self.fds.as_mut_ptr(),
                    self.fds.len() as libc::nfds_t,
                    timeout_ms,
                )
            };

            if rc < 0 {
                let err = io::Error::last_os_error();
                // Interrupted syscalls (observed after SIGSTOP/SIGCONT) are
                // not errors: retry when waiting unbounded, otherwise report
                // an empty batch.
                if err.kind() == io::ErrorKind::Interrupted {
                    warn!("poll() interrupted by signal");
                    if timeout.is_some() {
                        return Ok(Vec::new());
                    }
                    continue;
                }
                return Err(err);
            }

            let mut ready = Vec::with_capacity(rc as usize);
            for p in &mut self.fds {
                if p.revents != 0 {
                    ready.push((p.fd, EventMask::from_bits(p.revents)));
                    p.revents = 0;
                }
            }
            return Ok(ready);
        }
    }
}
