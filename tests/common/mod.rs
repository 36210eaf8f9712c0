#![allow(dead_code)]

use std::os::unix::io::RawFd;
use std::rc::Rc;

use forgeloop::engine::{AdmissionControl, Concurrency, LoadProbe, SchedCore};
use forgeloop::reactor::EventLoop;

/// Reactor + façade with an explicit admission policy, backgrounded so
/// tests don't echo job output to the harness stdout.
pub fn make_core(
    jobs: Concurrency,
    load: Option<f64>,
    probe: Box<dyn LoadProbe>,
) -> (Rc<EventLoop>, Rc<SchedCore>) {
    let event_loop = Rc::new(EventLoop::new());
    let admission = AdmissionControl::with_probe(jobs, load, probe);
    let core = Rc::new(SchedCore::new(Rc::clone(&event_loop), admission, true));
    (event_loop, core)
}

/// An OS pipe for readiness tests. Closes whatever ends remain open on drop.
pub struct TestPipe {
    read: RawFd,
    write: RawFd,
}

impl TestPipe {
    pub fn new() -> Self {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0, "pipe() failed");
        Self {
            read: fds[0],
            write: fds[1],
        }
    }

    pub fn read_fd(&self) -> RawFd {
        self.read
    }

    pub fn write_bytes(&self, bytes: &[u8]) {
        let n = unsafe {
            libc::write(self.write, bytes.as_ptr() as *const libc::c_void, bytes.len())
        };
        assert_eq!(n, bytes.len() as isize, "short write into test pipe");
    }

    pub fn close_write(&mut self) {
        if self.write >= 0 {
            unsafe { libc::close(self.write) };
            self.write = -1;
        }
    }
}

impl Drop for TestPipe {
    fn drop(&mut self) {
        if self.read >= 0 {
            unsafe { libc::close(self.read) };
        }
        if self.write >= 0 {
            unsafe { libc::close(self.write) };
        }
    }
}

/// Max number of jobs that were ever running at once, reconstructed from a
/// start/exit event log.
pub fn max_overlap(events: &[String]) -> usize {
    let mut current = 0usize;
    let mut max = 0usize;
    for event in events {
        if event.starts_with("start:") {
            current += 1;
            max = max.max(current);
        } else if event.starts_with("exit:") {
            current = current.saturating_sub(1);
        }
    }
    max
}
