// src/poll/select.rs

//! `select(2)` fallback backend.
//!
//! Used where `poll(2)` reports `POLLNVAL` for character devices (known on
//! Darwin for ptys). Only read/write readiness can be expressed; `PRI`
//! interest is folded into the read set, and error conditions surface as
//! read readiness followed by an EOF-style read, which is all the reactor's
//! pipe handlers need.

use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

use tracing::warn;

use super::{EventMask, PollBackend, PollEvent};

#[derive(Debug, Default)]
pub struct SelectAdapter {
    registered: Vec<(RawFd, EventMask)>,
}

impl SelectAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PollBackend for SelectAdapter {
    fn register(&mut self, fd: RawFd, mask: EventMask) {
        self.unregister(fd);
        self.registered.push((fd, mask));
    }

    fn unregister(&mut self, fd: RawFd) {
        self.registered.retain(|(f, _)| *f != fd);
    }

    fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<PollEvent>> {
        loop {
            let mut read_set: libc::fd_set = unsafe { mem::zeroed() };
            let mut write_set: libc::fd_set = unsafe { mem::zeroed() };
            unsafe {
                libc::FD_ZERO(&mut read_set);
                libc::FD_ZERO(&mut write_set);
            }

            let mut nfds = 0;
            for (fd, mask) in &self.registered {
                if mask.intersects(EventMask::IN | EventMask::PRI) {
                    unsafe { libc::FD_SET(*fd, &mut read_set) };
                }
                if mask.intersects(EventMask::OUT) {
                    unsafe { libc::FD_SET(*fd, &mut write_set) };
                }
                nfds = nfds.max(*fd + 1);
            }

            let mut tv = timeout.map(|d| libc::timeval {
                tv_sec: d.as_secs() as libc::time_t,
                tv_usec: d.subsec_micros() as libc::suseconds_t,
            });
            let tv_ptr = tv
                .as_mut()
                .map_or(ptr::null_mut(), |t| t as *mut libc::timeval);

            let rc = unsafe {
                libc::select(
                    nfds,
                    &mut read_set,
                    &mut write_set,
                    ptr::null_mut(),
                    tv_ptr,
                )
            };

            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    warn!("select() interrupted by signal");
                    if timeout.is_some() {
                        return Ok(Vec::new());
                    }
                    continue;
                }
                return Err(err);
            }

            let mut ready = Vec::new();
            for (fd, _) in &self.registered {
                let mut mask = EventMask::NONE;
                if unsafe { libc::FD_ISSET(*fd, &read_set) } {
                    mask |= EventMask::IN;
                }
                if unsafe { libc::FD_ISSET(*fd, &write_set) } {
                    mask |= EventMask::OUT;
                }
                if !mask.is_empty() {
                    ready.push((*fd, mask));
                }
            }
            return Ok(ready);
        }
    }
}
