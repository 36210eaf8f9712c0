mod common;

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use forgeloop::poll::EventMask;
use forgeloop::reactor::{Disposition, EventLoop};
use forgeloop_test_utils::init_tracing;

use common::TestPipe;

#[test]
fn wait_returns_true_when_ids_drain() {
    init_tracing();
    let event_loop = EventLoop::new();
    let pipe = TestPipe::new();
    pipe.write_bytes(b"done");

    // The watch removes itself on first delivery, draining the waited id.
    let id = event_loop.add_io_watch(pipe.read_fd(), EventMask::IN, |_, _| Disposition::Remove);

    assert!(event_loop.wait_for(Some(&[id]), Some(Duration::from_secs(5)), || false));
    assert!(!event_loop.is_registered(id));
}

#[test]
fn wait_timeout_expiry_is_distinct_from_completion() {
    init_tracing();
    let event_loop = EventLoop::new();
    let pipe = TestPipe::new();
    // Never written: the watch stays registered.
    let id = event_loop.add_io_watch(pipe.read_fd(), EventMask::IN, |_, _| Disposition::Retain);

    let started = Instant::now();
    let completed = event_loop.wait_for(Some(&[id]), Some(Duration::from_millis(150)), || false);
    let elapsed = started.elapsed();

    assert!(!completed, "an expired wait must not report completion");
    assert!(elapsed >= Duration::from_millis(140));
    assert!(elapsed < Duration::from_secs(5));
    // The watch is still there; only the wait gave up.
    assert!(event_loop.is_registered(id));
}

#[test]
fn wait_completes_on_condition() {
    init_tracing();
    let event_loop = EventLoop::new();
    let pipe = TestPipe::new();
    pipe.write_bytes(b"x");

    let seen = Rc::new(Cell::new(false));
    let seen_cb = Rc::clone(&seen);
    event_loop.add_io_watch(pipe.read_fd(), EventMask::IN, move |_, _| {
        seen_cb.set(true);
        Disposition::Remove
    });

    let seen_cond = Rc::clone(&seen);
    assert!(event_loop.wait_for(None, Some(Duration::from_secs(5)), move || seen_cond.get()));
    assert!(seen.get());
}

#[test]
fn wait_with_already_drained_ids_returns_immediately() {
    init_tracing();
    let event_loop = EventLoop::new();
    let pipe = TestPipe::new();

    let id = event_loop.add_io_watch(pipe.read_fd(), EventMask::IN, |_, _| Disposition::Retain);
    event_loop.source_remove(id);

    let started = Instant::now();
    assert!(event_loop.wait_for(Some(&[id]), None, || false));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn wait_reports_failure_when_nothing_could_complete_it() {
    init_tracing();
    let event_loop = EventLoop::new();

    // No sources at all: an unbounded wait on a condition that can never
    // flip must return "did not complete" instead of hanging.
    let started = Instant::now();
    assert!(!event_loop.wait_for(None, None, || false));
    assert!(started.elapsed() < Duration::from_secs(1));
}
