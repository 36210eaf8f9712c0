// src/engine/core.rs

//! The scheduling façade.
//!
//! [`SchedCore`] wraps the reactor with the three things every concrete
//! scheduler needs and none should reimplement:
//!
//! - a re-entrancy guard: the scheduling decision runs at most once at a
//!   time, and a pass triggered from inside an exit listener of an
//!   in-progress pass is a silent no-op
//! - the termination state machine: [`SchedCore::terminate`] only sets a
//!   flag (safe from other threads and signal handlers); the cancellation
//!   sweep runs on the next scheduling pass, exactly once
//! - admission control, delegated to [`AdmissionControl`]
//!
//! The scheduling decision itself belongs to the caller, expressed through
//! [`ScheduleOps`].

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::reactor::EventLoop;

use super::admission::AdmissionControl;
use super::iface::SchedHandle;
use super::output::OutputRouter;

/// What a concrete scheduler does inside the guarded pass.
pub trait ScheduleOps {
    /// One scheduling pass: admit and start work while policy allows.
    /// Returns whether anything was started.
    ///
    /// Guaranteed by [`SchedCore::schedule`]: never called recursively,
    /// never called while `terminate_tasks` is running, and the termination
    /// state does not change underneath it.
    fn schedule_tasks(&self) -> bool;

    /// Broadcast cancellation to running work. Called exactly once, from
    /// the first scheduling pass after termination was requested.
    fn terminate_tasks(&self);
}

/// The scheduling façade. Used through `Rc`, like the reactor it wraps.
pub struct SchedCore {
    event_loop: Rc<EventLoop>,
    admission: AdmissionControl,
    output: Rc<OutputRouter>,
    /// Set from anywhere; only read on the reactor thread.
    terminated: Arc<AtomicBool>,
    /// True once the cancellation sweep has run.
    terminated_tasks: Cell<bool>,
    scheduling: Cell<bool>,
}

impl std::fmt::Debug for SchedCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedCore")
            .field("admission", &self.admission)
            .field("terminated", &self.terminated.load(Ordering::Relaxed))
            .field("terminated_tasks", &self.terminated_tasks.get())
            .finish_non_exhaustive()
    }
}

impl SchedCore {
    pub fn new(
        event_loop: Rc<EventLoop>,
        admission: AdmissionControl,
        background: bool,
    ) -> Self {
        Self {
            event_loop,
            admission,
            output: Rc::new(OutputRouter::new(background)),
            terminated: Arc::new(AtomicBool::new(false)),
            terminated_tasks: Cell::new(false),
            scheduling: Cell::new(false),
        }
    }

    pub fn event_loop(&self) -> &Rc<EventLoop> {
        &self.event_loop
    }

    /// The narrow capability object handed to tasks.
    pub fn handle(&self) -> SchedHandle {
        SchedHandle::new(Rc::clone(&self.event_loop), Rc::clone(&self.output))
    }

    /// Request graceful termination at the earliest opportunity.
    ///
    /// Only sets a flag, so it is safe to call from another thread or from
    /// a signal handler; the cancellation sweep happens on the next
    /// scheduling pass, on the reactor thread.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    /// The raw flag, for wiring into signal handlers.
    pub fn termination_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.terminated)
    }

    /// True once termination has been requested (sweep may not have run yet).
    pub fn termination_requested(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// True once the cancellation sweep has run.
    pub fn termination_begun(&self) -> bool {
        self.terminated_tasks.get()
    }

    /// Run one guarded scheduling pass.
    ///
    /// Returns false without doing anything when a pass is already in
    /// flight, which makes it safe to call from exit listeners and reactor
    /// callbacks that an in-progress pass may trigger.
    pub fn schedule(&self, ops: &dyn ScheduleOps) -> bool {
        if self.scheduling.get() {
            return false;
        }
        self.scheduling.set(true);

        if self.terminated.load(Ordering::Acquire) && !self.terminated_tasks.get() {
            self.terminated_tasks.set(true);
            debug!("termination requested; cancelling running tasks");
            ops.terminate_tasks();
        }

        let ran = ops.schedule_tasks();
        self.scheduling.set(false);
        ran
    }

    /// Whether one more job may start, given `running` already in flight.
    pub fn can_add_job(&self, running: usize) -> bool {
        let terminating =
            self.termination_requested() || self.terminated_tasks.get();
        self.admission.can_add_job(running, terminating)
    }

    /// Whether a load ceiling is configured (drives the periodic re-check).
    pub fn load_limited(&self) -> bool {
        self.admission.load_limited()
    }
}
