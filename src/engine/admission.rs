// src/engine/admission.rs

//! Job-admission policy.
//!
//! Whether a new concurrent job may start is decided from three inputs: the
//! configured concurrency ceiling, the optional load-average ceiling, and
//! whether termination has begun. The policy is deliberately conservative:
//! when the load average cannot be measured at all, admission is denied
//! rather than assumed unlimited.

use tracing::debug;

use super::loadavg::{LoadProbe, SystemLoad};

/// The concurrency ceiling: a fixed number of jobs, or no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Limited(usize),
    Unlimited,
}

impl Concurrency {
    /// True when the ceiling permits more than one job at a time.
    pub fn allows_parallelism(self) -> bool {
        match self {
            Concurrency::Limited(n) => n > 1,
            Concurrency::Unlimited => true,
        }
    }

    fn at_capacity(self, running: usize) -> bool {
        match self {
            Concurrency::Limited(n) => running >= n,
            Concurrency::Unlimited => false,
        }
    }
}

/// Admission state: ceilings plus the load probe used to enforce them.
pub struct AdmissionControl {
    max_jobs: Concurrency,
    max_load: Option<f64>,
    probe: Box<dyn LoadProbe>,
}

impl std::fmt::Debug for AdmissionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionControl")
            .field("max_jobs", &self.max_jobs)
            .field("max_load", &self.max_load)
            .finish_non_exhaustive()
    }
}

impl AdmissionControl {
    pub fn new(max_jobs: Concurrency, max_load: Option<f64>) -> Self {
        Self::with_probe(max_jobs, max_load, Box::new(SystemLoad))
    }

    /// Build with an explicit load probe (tests use a scripted one).
    pub fn with_probe(
        max_jobs: Concurrency,
        max_load: Option<f64>,
        probe: Box<dyn LoadProbe>,
    ) -> Self {
        Self {
            max_jobs,
            max_load,
            probe,
        }
    }

    /// Whether a load ceiling is configured at all.
    pub fn load_limited(&self) -> bool {
        self.max_load.is_some()
    }

    /// Decide whether one more job may start given `running` jobs already
    /// in flight.
    ///
    /// Load throttling only applies when the ceiling permits parallelism and
    /// at least one job is running: the first job must always be admittable,
    /// or a loaded machine could never make progress.
    pub fn can_add_job(&self, running: usize, terminating: bool) -> bool {
        if terminating {
            return false;
        }

        if self.max_jobs.at_capacity(running) {
            return false;
        }

        if let Some(max_load) = self.max_load {
            if self.max_jobs.allows_parallelism() && running >= 1 {
                match self.probe.sample() {
                    Ok(load) => {
                        if load.one >= max_load {
                            debug!(
                                load = load.one,
                                ceiling = max_load,
                                "admission denied by load average"
                            );
                            return false;
                        }
                    }
                    Err(err) => {
                        debug!(error = %err, "load average unreadable; denying admission");
                        return false;
                    }
                }
            }
        }

        true
    }
}
