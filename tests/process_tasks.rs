mod common;

use std::fs;
use std::io::Read;
use std::rc::Rc;
use std::time::{Duration, Instant};

use flate2::read::MultiGzDecoder;
use forgeloop::engine::{Concurrency, TaskOutcome};
use forgeloop::exec::{SpawnedProcess, Task, TaskSequence};
use forgeloop_test_utils::fake_load::FakeLoad;
use forgeloop_test_utils::init_tracing;
use tempfile::tempdir;

use common::make_core;

fn process_harness() -> (Rc<forgeloop::reactor::EventLoop>, forgeloop::engine::SchedHandle) {
    let (event_loop, core) = make_core(
        Concurrency::Limited(2),
        None,
        Box::new(FakeLoad::new(0.0)),
    );
    (event_loop, core.handle())
}

#[test]
fn process_output_lands_in_the_log() {
    init_tracing();
    let (_event_loop, sched) = process_harness();
    let dir = tempdir().unwrap();
    let log = dir.path().join("build.log");

    let task = SpawnedProcess::new(
        "hello",
        "echo forged",
        Some(log.clone()),
        None,
        sched,
    );
    Rc::clone(&task).start();
    assert_eq!(task.wait(), TaskOutcome::Success);

    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("forged"), "log was: {contents:?}");
}

#[test]
fn process_stderr_is_captured_too() {
    init_tracing();
    let (_event_loop, sched) = process_harness();
    let dir = tempdir().unwrap();
    let log = dir.path().join("err.log");

    let task = SpawnedProcess::new(
        "noisy",
        "echo warning >&2",
        Some(log.clone()),
        None,
        sched,
    );
    Rc::clone(&task).start();
    assert_eq!(task.wait(), TaskOutcome::Success);

    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("warning"), "log was: {contents:?}");
}

#[test]
fn gz_log_path_selects_compressed_appends() {
    init_tracing();
    let (_event_loop, sched) = process_harness();
    let dir = tempdir().unwrap();
    let log = dir.path().join("build.log.gz");

    let task = SpawnedProcess::new(
        "packed",
        "echo compressed output",
        Some(log.clone()),
        None,
        sched,
    );
    Rc::clone(&task).start();
    assert_eq!(task.wait(), TaskOutcome::Success);

    // Each append is a gzip member; a multi-member decoder sees them all.
    let mut decoder = MultiGzDecoder::new(fs::File::open(&log).unwrap());
    let mut contents = String::new();
    decoder.read_to_string(&mut contents).unwrap();
    assert!(contents.contains("compressed output"), "log was: {contents:?}");
}

#[test]
fn nonzero_exit_code_becomes_failed_outcome() {
    init_tracing();
    let (_event_loop, sched) = process_harness();

    let task = SpawnedProcess::new("fails", "exit 3", None, Some(true), sched);
    Rc::clone(&task).start();
    assert_eq!(task.wait(), TaskOutcome::Failed(3));
}

#[test]
fn missing_command_fails_without_stopping_anything() {
    init_tracing();
    let (_event_loop, sched) = process_harness();

    let task = SpawnedProcess::new(
        "absent",
        "definitely-not-a-command-anyone-has",
        None,
        Some(true),
        sched,
    );
    Rc::clone(&task).start();
    // The shell reports 127 for an unknown command.
    assert_eq!(task.wait(), TaskOutcome::Failed(127));
}

#[test]
fn cancel_interrupts_a_long_running_process() {
    init_tracing();
    let (event_loop, sched) = process_harness();

    let task = SpawnedProcess::new("slow", "sleep 30", None, Some(true), sched);
    Rc::clone(&task).start();

    // Ask for cancellation from inside the reactor, as the scheduler would.
    let cancel_me = Rc::clone(&task);
    event_loop.add_timeout(Duration::from_millis(50), move || {
        cancel_me.cancel();
        forgeloop::reactor::Disposition::Remove
    });

    let started = Instant::now();
    assert_eq!(task.wait(), TaskOutcome::Cancelled);
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "cancellation must not wait for the full sleep"
    );
}

#[test]
fn exit_listener_added_after_completion_fires_immediately() {
    init_tracing();
    let (_event_loop, sched) = process_harness();

    let task = SpawnedProcess::new("quick", "true", None, Some(true), sched);
    Rc::clone(&task).start();
    assert_eq!(task.wait(), TaskOutcome::Success);

    let heard = Rc::new(std::cell::Cell::new(None));
    let heard_cb = Rc::clone(&heard);
    task.add_exit_listener(Box::new(move |outcome| heard_cb.set(Some(outcome))));
    assert_eq!(heard.get(), Some(TaskOutcome::Success));
}

#[test]
fn sequence_runs_steps_in_order() {
    init_tracing();
    let (_event_loop, sched) = process_harness();
    let dir = tempdir().unwrap();
    let log = dir.path().join("steps.log");

    let seq = TaskSequence::new(sched.clone());
    seq.push(SpawnedProcess::new(
        "steps:1",
        "echo first",
        Some(log.clone()),
        Some(true),
        sched.clone(),
    ));
    seq.push(SpawnedProcess::new(
        "steps:2",
        "echo second",
        Some(log.clone()),
        Some(true),
        sched.clone(),
    ));
    Rc::clone(&seq).start();
    assert_eq!(seq.wait(), TaskOutcome::Success);

    let contents = fs::read_to_string(&log).unwrap();
    let first = contents.find("first").expect("first step logged");
    let second = contents.find("second").expect("second step logged");
    assert!(first < second);
}

#[test]
fn sequence_short_circuits_on_failure() {
    init_tracing();
    let (_event_loop, sched) = process_harness();
    let dir = tempdir().unwrap();
    let log = dir.path().join("abort.log");

    let seq = TaskSequence::new(sched.clone());
    seq.push(SpawnedProcess::new(
        "abort:1",
        "echo one",
        Some(log.clone()),
        Some(true),
        sched.clone(),
    ));
    seq.push(SpawnedProcess::new(
        "abort:2",
        "exit 2",
        Some(log.clone()),
        Some(true),
        sched.clone(),
    ));
    seq.push(SpawnedProcess::new(
        "abort:3",
        "echo never",
        Some(log.clone()),
        Some(true),
        sched.clone(),
    ));
    Rc::clone(&seq).start();
    assert_eq!(seq.wait(), TaskOutcome::Failed(2));

    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("one"));
    assert!(!contents.contains("never"));
}

#[test]
fn empty_sequence_succeeds_immediately() {
    init_tracing();
    let (_event_loop, sched) = process_harness();

    let seq = TaskSequence::new(sched);
    Rc::clone(&seq).start();
    assert_eq!(seq.outcome(), Some(TaskOutcome::Success));
}

#[test]
fn log_directory_vanishing_falls_back_instead_of_failing() {
    init_tracing();
    let (_event_loop, sched) = process_harness();
    let dir = tempdir().unwrap();
    let log = dir.path().join("gone").join("build.log");
    // Parent directory never exists: every append hits ENOENT and falls
    // back to the interactive surface; the job itself must still succeed.
    let task = SpawnedProcess::new("orphan", "echo anyway", Some(log), Some(true), sched);
    Rc::clone(&task).start();
    assert_eq!(task.wait(), TaskOutcome::Success);
}
