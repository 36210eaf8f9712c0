// src/lib.rs

//! Cooperative, single-threaded scheduling substrate for running external
//! build/install processes: a poll-based event reactor, admission control
//! by job count and system load, and a concurrent job runner on top.

#[cfg(not(unix))]
compile_error!("forgeloop drives poll(2)/select(2) and only builds on unix platforms.");

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod poll;
pub mod reactor;

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::{ConfigFile, JobConfig};
use crate::engine::{
    AdmissionControl, Concurrency, JobRunner, SchedCore, SchedHandle, TaskOutcome,
};
use crate::errors::{ForgeloopError, Result};
use crate::exec::{SpawnedProcess, Task, TaskSequence};
use crate::reactor::{Disposition, EventLoop};

/// How often the reactor checks whether a signal asked us to stop.
const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - jobfile loading (+ CLI overrides)
/// - reactor / scheduling façade / job runner
/// - process tasks built from the job list
/// - SIGINT/SIGTERM → graceful termination
pub fn run(args: CliArgs) -> Result<TaskOutcome> {
    let mut cfg = load_and_validate(&args.config)?;
    apply_overrides(&mut cfg, &args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(TaskOutcome::Success);
    }

    let event_loop = Rc::new(EventLoop::new());
    let admission = AdmissionControl::new(cfg.limits.jobs, cfg.limits.load_average);
    let core = Rc::new(SchedCore::new(
        Rc::clone(&event_loop),
        admission,
        cfg.output.background,
    ));

    install_signal_watcher(&core);

    info!(
        jobs = cfg.jobs.len(),
        ceiling = ?cfg.limits.jobs,
        load_ceiling = ?cfg.limits.load_average,
        "starting job runner"
    );

    let mut queue: VecDeque<JobConfig> = cfg.jobs.clone().into();
    let producer = move |sched: &SchedHandle| -> Option<Rc<dyn Task>> {
        let job = queue.pop_front()?;
        Some(build_task(&job, sched))
    };

    let runner = JobRunner::new(
        Rc::clone(&core),
        Box::new(producer),
        cfg.limits.load_check_interval,
    );
    let outcome = runner.run();

    debug!(?outcome, errors = runner.error_count(), "job runner done");
    Ok(outcome)
}

/// Turn one jobfile entry into a task: a single command becomes a
/// [`SpawnedProcess`], a `steps` list becomes a [`TaskSequence`] of them.
fn build_task(job: &JobConfig, sched: &SchedHandle) -> Rc<dyn Task> {
    if let [cmd] = job.steps.as_slice() {
        let task: Rc<dyn Task> = SpawnedProcess::new(
            job.name.clone(),
            cmd.clone(),
            job.log.clone(),
            job.background,
            sched.clone(),
        );
        return task;
    }

    let seq = TaskSequence::new(sched.clone());
    for (i, step) in job.steps.iter().enumerate() {
        seq.push(SpawnedProcess::new(
            format!("{}:{}", job.name, i + 1),
            step.clone(),
            job.log.clone(),
            job.background,
            sched.clone(),
        ));
    }
    seq
}

fn apply_overrides(cfg: &mut ConfigFile, args: &CliArgs) -> Result<()> {
    if let Some(jobs) = &args.jobs {
        cfg.limits.jobs = parse_jobs_override(jobs)?;
    }
    if let Some(load) = args.load_average {
        if !load.is_finite() || load <= 0.0 {
            return Err(ForgeloopError::ConfigError(format!(
                "--load-average must be a positive number (got {load})"
            )));
        }
        cfg.limits.load_average = Some(load);
    }
    if args.background {
        cfg.output.background = true;
    }
    Ok(())
}

fn parse_jobs_override(value: &str) -> Result<Concurrency> {
    if value == "unlimited" {
        return Ok(Concurrency::Unlimited);
    }
    match value.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(Concurrency::Limited(n)),
        _ => Err(ForgeloopError::ConfigError(format!(
            "--jobs must be >= 1 or \"unlimited\" (got \"{value}\")"
        ))),
    }
}

static SIGNAL_CAUGHT: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: libc::c_int) {
    // Async-signal-safe: one atomic store, nothing else.
    SIGNAL_CAUGHT.store(true, Ordering::Relaxed);
}

/// Install SIGINT/SIGTERM handlers and a reactor timer that bridges the
/// signal flag to [`SchedCore::terminate`].
///
/// The handler itself only sets the static flag; the timer both bounds the
/// blocking poll (so the flag is noticed promptly) and performs the
/// `terminate()` call on the reactor thread.
fn install_signal_watcher(core: &Rc<SchedCore>) {
    let handler = on_signal as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }

    let weak = Rc::downgrade(core);
    core.event_loop().add_timeout(SIGNAL_POLL_INTERVAL, move || {
        match weak.upgrade() {
            Some(core) => {
                if SIGNAL_CAUGHT.load(Ordering::Relaxed) && !core.termination_requested() {
                    info!("interrupt received; terminating gracefully");
                    core.terminate();
                }
                Disposition::Retain
            }
            None => Disposition::Remove,
        }
    });
}

/// Simple dry-run output: print limits and the job list.
fn print_dry_run(cfg: &ConfigFile) {
    println!("forgeloop dry-run");
    println!("  limits.jobs = {:?}", cfg.limits.jobs);
    println!("  limits.load_average = {:?}", cfg.limits.load_average);
    println!("  output.background = {}", cfg.output.background);
    println!();

    println!("jobs ({}):", cfg.jobs.len());
    for job in &cfg.jobs {
        println!("  - {}", job.name);
        for step in &job.steps {
            println!("      cmd: {step}");
        }
        if let Some(ref log) = job.log {
            println!("      log: {}", log.display());
        }
        if let Some(background) = job.background {
            println!("      background: {background}");
        }
    }
}
