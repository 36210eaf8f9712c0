// src/reactor/event_loop.rs

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use tracing::trace;

use crate::poll::{create_poll_backend, EventMask, PollBackend};

/// Unique handle for a registered event source.
///
/// Ids are allocated from a monotonically increasing counter shared by all
/// source kinds and are never reused, so a stale id held after removal can
/// never name a newer source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(u64);

/// What a callback wants done with its source after returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep the source registered (timers re-arm from now).
    Retain,
    /// Unregister the source; it will not be called again.
    Remove,
}

/// Outcome of one raw poll step.
///
/// `NothingToWaitFor` replaces the "no events to wait for" sentinel of
/// classic reactors: an unbounded wait was requested but no descriptor is
/// registered, so blocking would never return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// At least one event was added to the pending queue.
    Filled,
    /// The poll call returned without events (timeout or interruption).
    Empty,
    /// An unbounded wait would block forever.
    NothingToWaitFor,
}

/// Why a blocking stretch of poll slices ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockOutcome {
    /// Events are on the pending queue.
    Filled,
    /// The caller's stop predicate held after a slice.
    Stopped,
    /// The bounded wait elapsed (or the clock jumped backwards).
    TimedOut,
    /// No source that could produce an event remains.
    NothingToWaitFor,
    /// An outer frame already owns the raw poll.
    Reentered,
}

type IoCallback = dyn FnMut(RawFd, EventMask) -> Disposition;
type SourceCallback = dyn FnMut() -> Disposition;

struct IoWatch {
    source_id: SourceId,
    callback: Rc<RefCell<IoCallback>>,
}

struct TimeoutSource {
    interval: Duration,
    last_fired: SystemTime,
    callback: Rc<RefCell<SourceCallback>>,
}

struct IdleSource {
    callback: Rc<RefCell<SourceCallback>>,
}

/// The reactor.
///
/// Owns the poll backend, the source tables, and the central pending-event
/// queue. The queue is shared across re-entrant dispatch calls so that the
/// results of a single raw poll call are never polled for twice; it is fully
/// drained (or purged entry by entry on watch removal) before the next raw
/// poll is issued.
pub struct EventLoop {
    backend: RefCell<Box<dyn PollBackend>>,
    pending: RefCell<Vec<(RawFd, EventMask)>>,
    io_watches: RefCell<HashMap<RawFd, IoWatch>>,
    watch_fds: RefCell<HashMap<SourceId, RawFd>>,
    timeouts: RefCell<BTreeMap<SourceId, TimeoutSource>>,
    idles: RefCell<BTreeMap<SourceId, IdleSource>>,
    /// Smallest configured timer interval; bounds blocking poll calls.
    min_interval: Cell<Option<Duration>>,
    next_source_id: Cell<u64>,
    /// Guards against a recursive raw poll from inside a callback.
    polling: Cell<bool>,
    /// Total callbacks dispatched; lets nested frames see what ran.
    dispatched: Cell<u64>,
    /// Timer callbacks dispatched. A blocking pass ends when a timer
    /// fires, not only on I/O; idle callbacks deliberately don't count,
    /// or a permanent idle source would turn blocking into spinning.
    timers_fired: Cell<u64>,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("io_watches", &self.io_watches.borrow().len())
            .field("timeouts", &self.timeouts.borrow().len())
            .field("idles", &self.idles.borrow().len())
            .field("pending", &self.pending.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Create a loop over the platform's default poll backend.
    pub fn new() -> Self {
        Self::with_backend(create_poll_backend())
    }

    /// Create a loop over an explicit backend (tests, select fallback).
    pub fn with_backend(backend: Box<dyn PollBackend>) -> Self {
        Self {
            backend: RefCell::new(backend),
            pending: RefCell::new(Vec::new()),
            io_watches: RefCell::new(HashMap::new()),
            watch_fds: RefCell::new(HashMap::new()),
            timeouts: RefCell::new(BTreeMap::new()),
            idles: RefCell::new(BTreeMap::new()),
            min_interval: Cell::new(None),
            next_source_id: Cell::new(0),
            polling: Cell::new(false),
            dispatched: Cell::new(0),
            timers_fired: Cell::new(0),
        }
    }

    fn next_id(&self) -> SourceId {
        let id = self.next_source_id.get() + 1;
        self.next_source_id.set(id);
        SourceId(id)
    }

    /// Watch `fd` for the conditions in `mask`.
    ///
    /// The callback runs once per delivered event; returning
    /// [`Disposition::Remove`] unregisters the watch.
    ///
    /// # Panics
    ///
    /// Panics if `fd` already has a watch. One watch per descriptor is an
    /// invariant; a second registration is a bug in the caller.
    pub fn add_io_watch<F>(&self, fd: RawFd, mask: EventMask, callback: F) -> SourceId
    where
        F: FnMut(RawFd, EventMask) -> Disposition + 'static,
    {
        let mut watches = self.io_watches.borrow_mut();
        assert!(
            !watches.contains_key(&fd),
            "fd {fd} is already registered"
        );
        let source_id = self.next_id();
        watches.insert(
            fd,
            IoWatch {
                source_id,
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        self.watch_fds.borrow_mut().insert(source_id, fd);
        self.backend.borrow_mut().register(fd, mask);
        trace!(fd, ?source_id, "io watch added");
        source_id
    }

    /// Run `callback` every `interval`, measured from the previous firing.
    ///
    /// Returning [`Disposition::Retain`] re-arms the timer from now.
    pub fn add_timeout<F>(&self, interval: Duration, callback: F) -> SourceId
    where
        F: FnMut() -> Disposition + 'static,
    {
        let source_id = self.next_id();
        self.timeouts.borrow_mut().insert(
            source_id,
            TimeoutSource {
                interval,
                last_fired: SystemTime::now(),
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        let min = match self.min_interval.get() {
            Some(cur) => cur.min(interval),
            None => interval,
        };
        self.min_interval.set(Some(min));
        source_id
    }

    /// Run `callback` once per reactor pass, before I/O is serviced.
    pub fn add_idle<F>(&self, callback: F) -> SourceId
    where
        F: FnMut() -> Disposition + 'static,
    {
        let source_id = self.next_id();
        self.idles.borrow_mut().insert(
            source_id,
            IdleSource {
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        source_id
    }

    /// Remove a source of any kind.
    ///
    /// Returns true if the id named a live source. Removing an I/O watch
    /// also discards any pending events for its descriptor, so they can
    /// never be delivered to a future watch that happens to reuse the same
    /// descriptor number.
    pub fn source_remove(&self, id: SourceId) -> bool {
        if self.idles.borrow_mut().remove(&id).is_some() {
            return true;
        }

        {
            let mut timeouts = self.timeouts.borrow_mut();
            if timeouts.remove(&id).is_some() {
                self.min_interval
                    .set(timeouts.values().map(|t| t.interval).min());
                return true;
            }
        }

        let fd = match self.watch_fds.borrow_mut().remove(&id) {
            Some(fd) => fd,
            None => return false,
        };
        self.backend.borrow_mut().unregister(fd);
        self.pending.borrow_mut().retain(|(f, _)| *f != fd);
        self.io_watches.borrow_mut().remove(&fd);
        trace!(fd, ?id, "io watch removed");
        true
    }

    /// Whether `id` names a live source of any kind.
    pub fn is_registered(&self, id: SourceId) -> bool {
        self.watch_fds.borrow().contains_key(&id)
            || self.timeouts.borrow().contains_key(&id)
            || self.idles.borrow().contains_key(&id)
    }

    /// Number of live I/O watches.
    pub fn io_watch_count(&self) -> usize {
        self.io_watches.borrow().len()
    }

    fn sources_empty(&self) -> bool {
        self.io_watches.borrow().is_empty()
            && self.timeouts.borrow().is_empty()
            && self.idles.borrow().is_empty()
    }

    /// Run a single reactor pass.
    ///
    /// Runs idle callbacks, fires due timers, pulls at most one batch of
    /// ready I/O events, and dispatches the shared pending queue. Returns
    /// whether any callback ran.
    ///
    /// With `may_block`, the pass sleeps in the raw poll until an I/O
    /// event arrives or a timer fires, whichever is first. With zero event
    /// sources the call returns immediately instead of hanging, and with
    /// only idle sources it runs them once and returns.
    pub fn iteration(&self, may_block: bool) -> bool {
        if self.sources_empty() {
            return false;
        }

        let before = self.dispatched.get();
        let timers_before = self.timers_fired.get();
        self.run_timeouts();

        // A timer firing already counts as this pass's event; only poll
        // when nothing has been dispatched yet beyond idle callbacks.
        if self.pending.borrow().is_empty()
            && self.timers_fired.get() == timers_before
        {
            if !may_block {
                self.poll_step(Some(Duration::ZERO));
            } else if self.io_watches.borrow().is_empty()
                && self.timeouts.borrow().is_empty()
            {
                // Only idle sources remain; there is nothing to block on.
                return self.dispatched.get() != before;
            } else {
                self.block_for_events(None, &mut || {
                    self.timers_fired.get() != timers_before
                });
            }
        }

        while let Some((fd, mask)) = self.pop_pending() {
            self.dispatch_io(fd, mask);
        }

        self.dispatched.get() != before
    }

    /// Dispatch events until the wait completes or the timeout expires.
    ///
    /// The wait completes (returning `true`) when `condition` returns true
    /// or when every id in `ids` has been unregistered. It fails (returning
    /// `false`) when the wall-clock timeout elapses first, when the clock
    /// jumps backwards, when nothing registered could complete it, or when
    /// it was entered recursively from a frame that already owns the poll.
    ///
    /// Completion checks run between poll slices too, so a wait whose
    /// condition is flipped by a timer callback returns promptly even with
    /// no descriptor activity.
    pub fn wait_for<C>(
        &self,
        ids: Option<&[SourceId]>,
        timeout: Option<Duration>,
        mut condition: C,
    ) -> bool
    where
        C: FnMut() -> bool,
    {
        let start = SystemTime::now();
        let mut remaining = timeout;
        let mut timed_out = false;

        loop {
            if condition() {
                return true;
            }
            if let Some(ids) = ids {
                if !ids.iter().any(|id| self.is_registered(*id)) {
                    return true;
                }
            }
            if timed_out {
                return false;
            }

            if self.pending.borrow().is_empty() {
                let outcome = {
                    let mut stop = || {
                        condition()
                            || ids.is_some_and(|ids| {
                                !ids.iter().any(|id| self.is_registered(*id))
                            })
                    };
                    self.block_for_events(remaining, &mut stop)
                };
                match outcome {
                    BlockOutcome::Filled => {}
                    // The loop head re-checks condition and ids.
                    BlockOutcome::Stopped => continue,
                    BlockOutcome::TimedOut
                    | BlockOutcome::NothingToWaitFor
                    | BlockOutcome::Reentered => return false,
                }
            }
            if let Some((fd, mask)) = self.pop_pending() {
                self.dispatch_io(fd, mask);
            }

            if let Some(total) = timeout {
                match SystemTime::now().duration_since(start) {
                    // Clock went backwards; assume the timeout has elapsed.
                    Err(_) => timed_out = true,
                    Ok(elapsed) if elapsed >= total => timed_out = true,
                    Ok(elapsed) => remaining = Some(total - elapsed),
                }
            }
        }
    }

    fn pop_pending(&self) -> Option<(RawFd, EventMask)> {
        // Popped from the back: order within one batch is unspecified, only
        // "the whole batch before the next raw poll" is guaranteed.
        self.pending.borrow_mut().pop()
    }

    /// Block until the pending queue is non-empty, the stop predicate
    /// holds, a bounded wait elapses, or there is nothing left to wait
    /// for. Timers keep firing between bounded poll slices. Re-entrant
    /// calls return immediately: the outer frame already owns the raw
    /// poll.
    fn block_for_events(
        &self,
        timeout: Option<Duration>,
        stop: &mut dyn FnMut() -> bool,
    ) -> BlockOutcome {
        if self.polling.get() {
            return BlockOutcome::Reentered;
        }
        self.polling.set(true);
        let outcome = self.block_for_events_inner(timeout, stop);
        self.polling.set(false);
        outcome
    }

    fn block_for_events_inner(
        &self,
        timeout: Option<Duration>,
        stop: &mut dyn FnMut() -> bool,
    ) -> BlockOutcome {
        let start = SystemTime::now();
        let mut remaining = timeout;

        loop {
            // Interval can change while callbacks run, so recompute the
            // slice every pass.
            let slice = match (remaining, self.min_interval.get()) {
                (None, None) => None,
                (None, Some(i)) => Some(i),
                (Some(r), None) => Some(r),
                (Some(r), Some(i)) => Some(r.min(i)),
            };

            match self.poll_step(slice) {
                PollOutcome::Filled => return BlockOutcome::Filled,
                PollOutcome::NothingToWaitFor => return BlockOutcome::NothingToWaitFor,
                PollOutcome::Empty => {}
            }

            self.run_timeouts();

            if stop() {
                return BlockOutcome::Stopped;
            }

            if let Some(total) = timeout {
                match SystemTime::now().duration_since(start) {
                    // Clock went backwards; assume the timeout has elapsed.
                    Err(_) => return BlockOutcome::TimedOut,
                    Ok(elapsed) if elapsed >= total => return BlockOutcome::TimedOut,
                    Ok(elapsed) => remaining = Some(total - elapsed),
                }
            } else if self.io_watches.borrow().is_empty()
                && self.timeouts.borrow().is_empty()
            {
                // Every source that could produce an event has drained.
                return BlockOutcome::NothingToWaitFor;
            }
        }
    }

    /// One raw poll call; results go straight onto the shared queue.
    fn poll_step(&self, timeout: Option<Duration>) -> PollOutcome {
        if self.io_watches.borrow().is_empty() && timeout.is_none() {
            return PollOutcome::NothingToWaitFor;
        }

        let events = self
            .backend
            .borrow_mut()
            .poll(timeout)
            .unwrap_or_else(|err| panic!("poll backend failure: {err}"));

        if events.is_empty() {
            PollOutcome::Empty
        } else {
            self.pending.borrow_mut().extend(events);
            PollOutcome::Filled
        }
    }

    /// Run idle callbacks, then fire due timers. Returns whether anything ran.
    fn run_timeouts(&self) -> bool {
        let mut ran = self.run_idle_callbacks();

        if self.timeouts.borrow().is_empty() {
            return ran;
        }

        let now = SystemTime::now();
        let due: Vec<(SourceId, Rc<RefCell<SourceCallback>>)> = self
            .timeouts
            .borrow()
            .iter()
            .filter(|(_, t)| match now.duration_since(t.last_fired) {
                Ok(elapsed) => elapsed >= t.interval,
                // Clock went backwards; treat the interval as elapsed.
                Err(_) => true,
            })
            .map(|(id, t)| (*id, Rc::clone(&t.callback)))
            .collect();

        for (id, callback) in due {
            {
                let mut timeouts = self.timeouts.borrow_mut();
                match timeouts.get_mut(&id) {
                    // Re-arm before the callback runs, so the next firing is
                    // measured from this one.
                    Some(t) => t.last_fired = SystemTime::now(),
                    // Cancelled while an earlier timer callback ran.
                    None => continue,
                }
            }
            let disposition = match callback.try_borrow_mut() {
                Ok(mut f) => f(),
                // Already executing in an outer frame.
                Err(_) => continue,
            };
            ran = true;
            self.dispatched.set(self.dispatched.get() + 1);
            self.timers_fired.set(self.timers_fired.get() + 1);
            if disposition == Disposition::Remove {
                self.source_remove(id);
            }
        }

        ran
    }

    fn run_idle_callbacks(&self) -> bool {
        if self.idles.borrow().is_empty() {
            return false;
        }

        // Snapshot, since callbacks can add or remove idle sources.
        let snapshot: Vec<(SourceId, Rc<RefCell<SourceCallback>>)> = self
            .idles
            .borrow()
            .iter()
            .map(|(id, s)| (*id, Rc::clone(&s.callback)))
            .collect();

        let mut ran = false;
        for (id, callback) in snapshot {
            if !self.idles.borrow().contains_key(&id) {
                // Cancelled while an earlier callback ran.
                continue;
            }
            let disposition = match callback.try_borrow_mut() {
                Ok(mut f) => f(),
                Err(_) => continue,
            };
            ran = true;
            self.dispatched.set(self.dispatched.get() + 1);
            if disposition == Disposition::Remove {
                self.source_remove(id);
            }
        }
        ran
    }

    fn dispatch_io(&self, fd: RawFd, mask: EventMask) -> bool {
        let (source_id, callback) = {
            let watches = self.io_watches.borrow();
            match watches.get(&fd) {
                Some(w) => (w.source_id, Rc::clone(&w.callback)),
                // Watch removed after the event was queued; the purge in
                // source_remove makes this unreachable in practice, but a
                // stale entry must not be delivered.
                None => return false,
            }
        };

        let disposition = match callback.try_borrow_mut() {
            Ok(mut f) => f(fd, mask),
            Err(_) => {
                // The handler re-entered the loop and its own fd became
                // ready again. Drop the event; level-triggered polling will
                // report it on the next raw poll.
                trace!(fd, "handler already on the stack; event dropped");
                return false;
            }
        };

        self.dispatched.set(self.dispatched.get() + 1);
        if disposition == Disposition::Remove {
            self.source_remove(source_id);
        }
        true
    }
}
