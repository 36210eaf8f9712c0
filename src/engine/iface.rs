// src/engine/iface.rs

//! The capability handle exposed to tasks.
//!
//! Tasks never see the scheduler or the reactor directly; they are handed a
//! [`SchedHandle`] carrying exactly the four capabilities the task contract
//! needs: route output, watch a descriptor, drop a watch, and wait. Keeping
//! this surface narrow is what keeps tasks composable: a build phase, an
//! extraction, and an uninstall step all drive their pipes the same way.

use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use crate::poll::EventMask;
use crate::reactor::{Disposition, EventLoop, SourceId};

use super::output::{OutputLevel, OutputRouter};

/// Capability object cloned into each task.
#[derive(Clone)]
pub struct SchedHandle {
    event_loop: Rc<EventLoop>,
    output: Rc<OutputRouter>,
}

impl std::fmt::Debug for SchedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedHandle").finish_non_exhaustive()
    }
}

impl SchedHandle {
    pub(crate) fn new(event_loop: Rc<EventLoop>, output: Rc<OutputRouter>) -> Self {
        Self { event_loop, output }
    }

    /// Route a message to the interactive surface and/or a log file.
    ///
    /// See [`OutputRouter::output`] for the fallback semantics.
    pub fn output(
        &self,
        msg: &str,
        log_path: Option<&Path>,
        background: Option<bool>,
        level: OutputLevel,
    ) -> io::Result<()> {
        self.output.output(msg, log_path, background, level)
    }

    /// Watch `fd`; see [`EventLoop::add_io_watch`].
    ///
    /// # Panics
    ///
    /// Panics if `fd` already has a watch.
    pub fn add_io_watch<F>(&self, fd: RawFd, mask: EventMask, callback: F) -> SourceId
    where
        F: FnMut(RawFd, EventMask) -> Disposition + 'static,
    {
        self.event_loop.add_io_watch(fd, mask, callback)
    }

    /// Drop a previously registered source; see [`EventLoop::source_remove`].
    pub fn source_remove(&self, id: SourceId) -> bool {
        self.event_loop.source_remove(id)
    }

    /// Block (cooperatively) until `condition` holds or the given sources
    /// drain, dispatching events the whole time. `ids: None` waits on the
    /// condition alone.
    ///
    /// Returns `true` on completion. Returns `false`, explicitly distinct
    /// from completion, when `timeout` elapses first, when the clock jumps
    /// backwards, or when nothing registered could complete the wait.
    pub fn wait<C>(
        &self,
        ids: Option<&[SourceId]>,
        timeout: Option<Duration>,
        condition: C,
    ) -> bool
    where
        C: FnMut() -> bool,
    {
        self.event_loop.wait_for(ids, timeout, condition)
    }

    /// Wait until the given sources are all unregistered.
    pub fn wait_ids(&self, ids: &[SourceId], timeout: Option<Duration>) -> bool {
        self.wait(Some(ids), timeout, || false)
    }
}
