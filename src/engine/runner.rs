// src/engine/runner.rs

//! The concurrent job runner.
//!
//! [`JobRunner`] drives a [`TaskProducer`] under the façade's admission
//! policy: while admission allows and work remains, it pulls the next task,
//! starts it, and listens for its exit; each exit re-triggers the scheduling
//! pass. Failures are counted, never fatal: the remaining work still runs.
//! Termination cancels every running task and then drains them, so even a
//! cancelled run flushes its buffered output.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::exec::Task;
use crate::reactor::{Disposition, SourceId};

use super::core::{SchedCore, ScheduleOps};
use super::iface::SchedHandle;
use super::TaskOutcome;

/// Where the runner's work comes from.
///
/// `next_task` returning `None` means no work remains. It is the normal
/// end of the producer, not an error. The handle is the capability object
/// the produced task should hold.
pub trait TaskProducer {
    fn next_task(&mut self, sched: &SchedHandle) -> Option<Rc<dyn Task>>;
}

impl<F> TaskProducer for F
where
    F: FnMut(&SchedHandle) -> Option<Rc<dyn Task>>,
{
    fn next_task(&mut self, sched: &SchedHandle) -> Option<Rc<dyn Task>> {
        self(sched)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct JobId(u64);

/// Drives tasks from a producer, bounded by admission control.
pub struct JobRunner {
    inner: Rc<RunnerInner>,
}

struct RunnerInner {
    self_weak: Weak<RunnerInner>,
    core: Rc<SchedCore>,
    handle: SchedHandle,
    producer: RefCell<Box<dyn TaskProducer>>,
    running: RefCell<BTreeMap<JobId, Rc<dyn Task>>>,
    /// False once the producer has reported the end of its work.
    remaining: Cell<bool>,
    error_count: Cell<usize>,
    next_job_id: Cell<u64>,
    term_check_id: Cell<Option<SourceId>>,
    load_check_id: Cell<Option<SourceId>>,
    load_check_interval: Duration,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("running", &self.inner.running.borrow().len())
            .field("remaining", &self.inner.remaining.get())
            .field("error_count", &self.inner.error_count.get())
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(
        core: Rc<SchedCore>,
        producer: Box<dyn TaskProducer>,
        load_check_interval: Duration,
    ) -> Self {
        let handle = core.handle();
        let inner = Rc::new_cyclic(|self_weak| RunnerInner {
            self_weak: self_weak.clone(),
            core,
            handle,
            producer: RefCell::new(producer),
            running: RefCell::new(BTreeMap::new()),
            remaining: Cell::new(true),
            error_count: Cell::new(0),
            next_job_id: Cell::new(0),
            term_check_id: Cell::new(None),
            load_check_id: Cell::new(None),
            load_check_interval,
        });
        Self { inner }
    }

    /// Arm the termination check and (when a load ceiling is configured)
    /// the periodic admission re-check, then run the first scheduling pass.
    ///
    /// The periodic re-check exists because the load average changes without
    /// any task finishing; without it, a throttled runner with long-lived
    /// jobs would never notice the load dropping.
    pub fn start(&self) {
        let weak = self.inner.self_weak.clone();
        let term_id = self.inner.core.event_loop().add_idle(move || {
            match weak.upgrade() {
                Some(inner) => {
                    inner.termination_check();
                    Disposition::Retain
                }
                None => Disposition::Remove,
            }
        });
        self.inner.term_check_id.set(Some(term_id));

        if self.inner.core.load_limited() {
            let weak = self.inner.self_weak.clone();
            let load_id = self
                .inner
                .core
                .event_loop()
                .add_timeout(self.inner.load_check_interval, move || {
                    match weak.upgrade() {
                        Some(inner) => {
                            inner.schedule();
                            Disposition::Retain
                        }
                        None => Disposition::Remove,
                    }
                });
            self.inner.load_check_id.set(Some(load_id));
        }

        self.inner.schedule();
    }

    /// Request graceful termination; see [`SchedCore::terminate`].
    pub fn terminate(&self) {
        self.inner.core.terminate();
    }

    /// Run the reactor until all work is finished, then report the
    /// aggregate outcome.
    ///
    /// Two loops on purpose: "no more work to start" and "no more work
    /// running" are different predicates. The second loop is what lets
    /// tasks, including ones cancelled by termination, flush buffered
    /// output to their logs before the runner reports.
    pub fn wait(&self) -> TaskOutcome {
        while self.inner.keep_scheduling() {
            self.inner.core.event_loop().iteration(true);
        }

        while !self.inner.running.borrow().is_empty() {
            self.inner.core.event_loop().iteration(true);
        }

        if let Some(id) = self.inner.term_check_id.take() {
            self.inner.core.event_loop().source_remove(id);
        }
        if let Some(id) = self.inner.load_check_id.take() {
            self.inner.core.event_loop().source_remove(id);
        }

        let errors = self.inner.error_count.get();
        if errors > 0 {
            info!(errors, "job runner finished with failures");
            TaskOutcome::Failed(1)
        } else {
            info!("job runner finished");
            TaskOutcome::Success
        }
    }

    /// Convenience: `start()` followed by `wait()`.
    pub fn run(&self) -> TaskOutcome {
        self.start();
        self.wait()
    }

    /// Number of jobs currently running.
    pub fn running_count(&self) -> usize {
        self.inner.running.borrow().len()
    }

    /// Number of failed (or cancelled) jobs so far.
    pub fn error_count(&self) -> usize {
        self.inner.error_count.get()
    }

    /// The capability handle tasks of this runner hold.
    pub fn handle(&self) -> SchedHandle {
        self.inner.handle.clone()
    }
}

impl RunnerInner {
    fn keep_scheduling(&self) -> bool {
        self.remaining.get() && !self.core.termination_begun()
    }

    fn schedule(&self) -> bool {
        self.core.schedule(self)
    }

    fn termination_check(&self) {
        if self.core.termination_requested() && !self.core.termination_begun() {
            self.schedule();
        }
    }

    fn task_exit(&self, job: JobId, outcome: TaskOutcome) {
        self.running.borrow_mut().remove(&job);
        if !outcome.is_success() {
            warn!(?job, ?outcome, "job failed");
            self.error_count.set(self.error_count.get() + 1);
        } else {
            debug!(?job, "job finished");
        }
        self.schedule();
    }
}

impl ScheduleOps for RunnerInner {
    fn schedule_tasks(&self) -> bool {
        let mut started = false;

        while self.keep_scheduling()
            && self.core.can_add_job(self.running.borrow().len())
        {
            let task = self.producer.borrow_mut().next_task(&self.handle);
            match task {
                None => {
                    self.remaining.set(false);
                }
                Some(task) => {
                    let job = JobId(self.next_job_id.get() + 1);
                    self.next_job_id.set(job.0);
                    self.running.borrow_mut().insert(job, Rc::clone(&task));

                    let weak = self.self_weak.clone();
                    task.add_exit_listener(Box::new(move |outcome| {
                        if let Some(inner) = weak.upgrade() {
                            inner.task_exit(job, outcome);
                        }
                    }));

                    debug!(?job, "starting job");
                    task.start();
                    started = true;
                }
            }
        }

        started
    }

    fn terminate_tasks(&self) {
        let tasks: Vec<Rc<dyn Task>> =
            self.running.borrow().values().cloned().collect();
        for task in tasks {
            task.cancel();
        }
    }
}
