// src/exec/sequence.rs

//! Composite task: ordered sub-tasks.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::engine::{SchedHandle, TaskOutcome};

use super::{ExitListener, Task, TaskState};

/// Runs sub-tasks one after another.
///
/// Each sub-task starts when its predecessor reports `Success`; the first
/// non-success outcome short-circuits the rest and becomes the sequence's
/// own outcome. An empty sequence completes successfully on start.
///
/// Composition is an explicit state machine (the queue of not-yet-started
/// sub-tasks plus the currently running one) rather than anything
/// inherited; a sequence is itself a [`Task`] and nests freely.
pub struct TaskSequence {
    self_weak: Weak<TaskSequence>,
    sched: SchedHandle,
    queue: RefCell<VecDeque<Rc<dyn Task>>>,
    current: RefCell<Option<Rc<dyn Task>>>,
    state: TaskState,
}

impl std::fmt::Debug for TaskSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSequence")
            .field("queued", &self.queue.borrow().len())
            .field("running", &self.current.borrow().is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TaskSequence {
    pub fn new(sched: SchedHandle) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            self_weak: self_weak.clone(),
            sched,
            queue: RefCell::new(VecDeque::new()),
            current: RefCell::new(None),
            state: TaskState::new(),
        })
    }

    /// Append a sub-task. Only meaningful before the predecessor finishes.
    pub fn push(&self, task: Rc<dyn Task>) {
        self.queue.borrow_mut().push_back(task);
    }

    fn start_next(&self) {
        if self.state.cancel_requested() {
            self.state.finish(TaskOutcome::Cancelled);
            return;
        }

        let next = self.queue.borrow_mut().pop_front();
        match next {
            None => {
                debug!("task sequence finished");
                self.state.finish(TaskOutcome::Success);
            }
            Some(task) => {
                *self.current.borrow_mut() = Some(Rc::clone(&task));

                let weak = self.self_weak.clone();
                task.add_exit_listener(Box::new(move |outcome| {
                    if let Some(seq) = weak.upgrade() {
                        seq.sub_task_exit(outcome);
                    }
                }));
                task.start();
            }
        }
    }

    fn sub_task_exit(&self, outcome: TaskOutcome) {
        *self.current.borrow_mut() = None;
        if outcome.is_success() {
            self.start_next();
        } else {
            debug!(?outcome, "task sequence short-circuited");
            self.state.finish(outcome);
        }
    }
}

impl Task for TaskSequence {
    fn start(self: Rc<Self>) {
        self.start_next();
    }

    fn cancel(&self) {
        if self.state.outcome().is_some() {
            return;
        }
        self.state.request_cancel();
        let current = self.current.borrow().clone();
        match current {
            // The running sub-task completes through its own exit path,
            // which lands in sub_task_exit and finishes the sequence.
            Some(task) => task.cancel(),
            None => self.state.finish(TaskOutcome::Cancelled),
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
            if !self.sched.wait(None, None, || self.state.outcome().is_some()) {
                panic!("task wait stalled: reactor cannot make progress");
            }
        }
    }
}
