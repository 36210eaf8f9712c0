// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::Concurrency;

/// Top-level jobfile as read from TOML, before semantic validation.
///
/// ```toml
/// [limits]
/// jobs = 4                  # or "unlimited"
/// load_average = 3.5
///
/// [output]
/// background = false
///
/// [[job]]
/// name = "compile"
/// cmd = "scripts/compile.sh"
/// log = "logs/compile.log"
/// ```
///
/// All sections are optional and have reasonable defaults, except that at
/// least one `[[job]]` must be present.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Admission ceilings from `[limits]`.
    #[serde(default)]
    pub limits: RawLimitsSection,

    /// Output routing from `[output]`.
    #[serde(default)]
    pub output: OutputSection,

    /// The work list from `[[job]]` entries, run in declaration order.
    #[serde(default)]
    pub job: Vec<RawJobConfig>,
}

/// `[limits]` section, raw.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLimitsSection {
    /// Concurrency ceiling: a positive integer or the string `"unlimited"`.
    #[serde(default = "default_jobs")]
    pub jobs: JobsValue,

    /// Optional 1-minute load-average ceiling.
    #[serde(default)]
    pub load_average: Option<f64>,

    /// How often admission is re-evaluated while load-throttled.
    #[serde(default = "default_load_check_interval_ms")]
    pub load_check_interval_ms: u64,
}

/// `jobs = 4` or `jobs = "unlimited"`: both accepted by the parser,
/// disambiguated during validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JobsValue {
    Count(i64),
    Keyword(String),
}

fn default_jobs() -> JobsValue {
    JobsValue::Count(1)
}

fn default_load_check_interval_ms() -> u64 {
    5000
}

impl Default for RawLimitsSection {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            load_average: None,
            load_check_interval_ms: default_load_check_interval_ms(),
        }
    }
}

/// `[output]` section. Used as-is; nothing to validate.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OutputSection {
    /// Suppress the interactive echo of job output (logs still written).
    #[serde(default)]
    pub background: bool,
}

/// One `[[job]]` entry, raw.
///
/// A job is either a single command (`cmd`) or an ordered list of commands
/// run as one unit (`steps`); exactly one of the two must be given.
#[derive(Debug, Clone, Deserialize)]
pub struct RawJobConfig {
    pub name: String,

    #[serde(default)]
    pub cmd: Option<String>,

    #[serde(default)]
    pub steps: Vec<String>,

    /// Append job output here; a `.gz` suffix selects compressed appends.
    #[serde(default)]
    pub log: Option<PathBuf>,

    /// Job-local override of `[output].background`.
    #[serde(default)]
    pub background: Option<bool>,
}

/// Validated configuration, produced by `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub limits: LimitsSection,
    pub output: OutputSection,
    pub jobs: Vec<JobConfig>,
}

/// Checked `[limits]`.
#[derive(Debug, Clone)]
pub struct LimitsSection {
    pub jobs: Concurrency,
    pub load_average: Option<f64>,
    pub load_check_interval: Duration,
}

/// Checked `[[job]]`.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub name: String,
    /// Commands to run in order; a single-`cmd` job has one entry.
    pub steps: Vec<String>,
    pub log: Option<PathBuf>,
    pub background: Option<bool>,
}

impl ConfigFile {
    /// Construct without re-validating; `validate.rs` is the only caller.
    pub(crate) fn new_unchecked(
        limits: LimitsSection,
        output: OutputSection,
        jobs: Vec<JobConfig>,
    ) -> Self {
        Self {
            limits,
            output,
            jobs,
        }
    }
}
