// src/exec/process.rs

//! Process-backed task.

use std::cell::{Cell, RefCell};
use std::io::{self, Read};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::engine::{OutputLevel, SchedHandle, TaskOutcome};
use crate::poll::EventMask;
use crate::reactor::{Disposition, SourceId};

use super::{ExitListener, Task, TaskState};

const READ_CHUNK: usize = 4096;

/// One external command, run through the shell, with both pipes wired into
/// the reactor.
///
/// The task reads its child's stdout and stderr as they become ready and
/// routes every chunk through the capability handle's output function, so
/// a backgrounded job still fills its log. Both pipes reaching EOF is the
/// completion signal: the child is reaped, the outcome derived from its
/// exit status, and the exit listeners run.
pub struct SpawnedProcess {
    name: String,
    cmd: String,
    log_path: Option<PathBuf>,
    /// Job-local override of the global background flag.
    background: Option<bool>,
    sched: SchedHandle,
    child: RefCell<Option<Child>>,
    watches: RefCell<Vec<SourceId>>,
    open_pipes: Cell<usize>,
    state: TaskState,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("name", &self.name)
            .field("cmd", &self.cmd)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SpawnedProcess {
    pub fn new(
        name: impl Into<String>,
        cmd: impl Into<String>,
        log_path: Option<PathBuf>,
        background: Option<bool>,
        sched: SchedHandle,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            cmd: cmd.into(),
            log_path,
            background,
            sched,
            child: RefCell::new(None),
            watches: RefCell::new(Vec::new()),
            open_pipes: Cell::new(0),
            state: TaskState::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a watch on one pipe. The closure owns the pipe; dropping
    /// the watch drops the pipe and the task's self-reference with it.
    fn watch_pipe<P>(self_rc: &Rc<Self>, mut pipe: P)
    where
        P: Read + AsRawFd + 'static,
    {
        let fd = pipe.as_raw_fd();
        if let Err(err) = set_nonblocking(fd) {
            warn!(task = %self_rc.name, error = %err, "cannot make pipe nonblocking");
        }

        let this = Rc::clone(self_rc);
        let mut buf = [0u8; READ_CHUNK];
        let id = self_rc
            .sched
            .add_io_watch(fd, EventMask::IN | EventMask::HUP, move |_fd, _mask| {
                loop {
                    match pipe.read(&mut buf) {
                        Ok(0) => {
                            this.pipe_closed();
                            return Disposition::Remove;
                        }
                        Ok(n) => this.emit(&buf[..n]),
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                            return Disposition::Retain;
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                        Err(err) => {
                            warn!(task = %this.name, error = %err, "pipe read failed");
                            this.pipe_closed();
                            return Disposition::Remove;
                        }
                    }
                }
            });

        self_rc.watches.borrow_mut().push(id);
        self_rc.open_pipes.set(self_rc.open_pipes.get() + 1);
    }

    fn emit(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        if let Err(err) = self.sched.output(
            &text,
            self.log_path.as_deref(),
            self.background,
            OutputLevel::Info,
        ) {
            warn!(task = %self.name, error = %err, "output routing failed");
        }
    }

    fn pipe_closed(&self) {
        let left = self.open_pipes.get() - 1;
        self.open_pipes.set(left);
        if left == 0 {
            self.reap();
        }
    }

    /// Both pipes have drained; collect the exit status and complete.
    fn reap(&self) {
        let child = self.child.borrow_mut().take();
        let outcome = match child {
            None => TaskOutcome::Failed(-1),
            Some(mut child) => match child.wait() {
                Err(err) => {
                    warn!(task = %self.name, error = %err, "wait on child failed");
                    TaskOutcome::Failed(-1)
                }
                Ok(status) => {
                    if status.success() {
                        TaskOutcome::Success
                    } else if let Some(code) = status.code() {
                        TaskOutcome::Failed(code)
                    } else if self.state.cancel_requested() {
                        TaskOutcome::Cancelled
                    } else {
                        TaskOutcome::Failed(128 + status.signal().unwrap_or(0))
                    }
                }
            },
        };
        debug!(task = %self.name, ?outcome, "process task finished");
        self.state.finish(outcome);
    }
}

impl Task for SpawnedProcess {
    fn start(self: Rc<Self>) {
        if self.state.cancel_requested() {
            self.state.finish(TaskOutcome::Cancelled);
            return;
        }

        debug!(task = %self.name, cmd = %self.cmd, "spawning process");
        let spawned = Command::new("sh")
            .arg("-c")
            .arg(&self.cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                warn!(task = %self.name, error = %err, "spawn failed");
                self.state.finish(TaskOutcome::Failed(127));
                return;
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *self.child.borrow_mut() = Some(child);

        if let Some(stdout) = stdout {
            Self::watch_pipe(&self, stdout);
        }
        // stderr is watched too, not merely drained: error output belongs
        // in the job's log as much as stdout does.
        if let Some(stderr) = stderr {
            Self::watch_pipe(&self, stderr);
        }

        if self.open_pipes.get() == 0 {
            self.reap();
        }
    }

    fn cancel(&self) {
        if self.state.outcome().is_some() {
            return;
        }
        self.state.request_cancel();
        if let Some(child) = self.child.borrow().as_ref() {
            debug!(task = %self.name, pid = child.id(), "cancelling process");
            // SIGTERM; completion still flows through the EOF path so
            // buffered output reaches the log first.
            unsafe {
                libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
            }
        }
    }

    fn outcome(&self) -> Option<TaskOutcome> {
        self.state.outcome()
    }

    fn add_exit_listener(&self, listener: ExitListener) {
        self.state.add_exit_listener(listener);
    }

    fn wait(&self) -> TaskOutcome {
        loop {
            if let Some(outcome) = self.state.outcome() {
                return outcome;
            }
            let ids: Vec<SourceId> = self.watches.borrow().clone();
            assert!(!ids.is_empty(), "wait() on a task that was never started");
            if !self.sched.wait_ids(&ids, None) {
                panic!("task wait stalled: reactor cannot make progress");
            }
        }
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
