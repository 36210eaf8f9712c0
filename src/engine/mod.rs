// src/engine/mod.rs

//! Scheduling engine for forgeloop.
//!
//! This module ties together:
//! - the scheduling façade ([`SchedCore`]): re-entrancy guard, termination
//!   state machine, admission control
//! - the narrow capability handle given to tasks ([`SchedHandle`])
//! - output routing to the interactive surface and per-job logs
//! - the concurrent job runner ([`JobRunner`]) that drives a task producer
//!   under the admission policy
//!
//! The reactor itself lives in [`crate::reactor`]; everything here builds on
//! it and never blocks outside of it.

/// Outcome of one unit of work, as seen by the scheduler.
///
/// Anything but `Success` counts toward the aggregate error count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(i32),
    Cancelled,
}

impl TaskOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

pub mod admission;
pub mod core;
pub mod iface;
pub mod loadavg;
pub mod output;
pub mod runner;

pub use admission::{AdmissionControl, Concurrency};
pub use self::core::{SchedCore, ScheduleOps};
pub use iface::SchedHandle;
pub use loadavg::{LoadAverage, LoadProbe, SystemLoad};
pub use output::{OutputLevel, OutputRouter};
pub use runner::{JobRunner, TaskProducer};
