use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use forgeloop::engine::TaskOutcome;
use forgeloop::exec::{ExitListener, Task, TaskState};
use forgeloop::reactor::{Disposition, EventLoop, SourceId};

/// What happened to the stub tasks, in order. Shared between the tasks and
/// the test body (everything runs on the one reactor thread).
pub type EventLog = Rc<RefCell<Vec<String>>>;

pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// A scripted task: "runs" for a fixed delay on a reactor timer, then
/// completes with a preconfigured outcome. Records start/cancel/exit into a
/// shared [`EventLog`] so tests can assert on ordering and overlap.
///
/// Drives the reactor directly (it is a test double, not a consumer of the
/// capability surface).
pub struct StubTask {
    name: String,
    delay: Duration,
    scripted_outcome: TaskOutcome,
    event_loop: Rc<EventLoop>,
    log: EventLog,
    timer_id: Cell<Option<SourceId>>,
    state: TaskState,
}

impl StubTask {
    pub fn new(
        name: impl Into<String>,
        delay: Duration,
        scripted_outcome: TaskOutcome,
        event_loop: Rc<EventLoop>,
        log: EventLog,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            delay,
            scripted_outcome,
            event_loop,
            log,
            timer_id: Cell::new(None),
            state: TaskState::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn was_cancelled(&self) -> bool {
        self.state.cancel_requested()
    }

    fn record(&self, what: &str) {
        self.log.borrow_mut().push(format!("{}:{}", what, self.name));
    }

    fn complete(&self, outcome: TaskOutcome) {
        if let Some(id) = self.timer_id.take() {
            self.event_loop.source_remove(id);
        }
        self.record("exit");
        self.state.finish(outcome);
    }
}

impl Task for StubTask {
    fn start(self: Rc<Self>) {
        self.record("start");
        let this = Rc::clone(&self);
        let scripted = self.scripted_outcome;
        let id = self.event_loop.add_timeout(self.delay, move || {
            this.timer_id.set(None);
            this.complete(scripted);
            Disposition::Remove
        });
        self.timer_id.set(Some(id));
    }

    fn cancel(&self) {
        if self.state.outcome().is_some() {
            return;
        }
        self.state.request_cancel();
        self.record("cancel");
        self.complete(TaskOutcome::Cancelled);
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
            self.event_loop.iteration(true);
        }
    }
}
