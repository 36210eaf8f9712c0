use std::fmt::Write as _;

/// Builds jobfile TOML text for loader/validation tests.
///
/// Only the pieces tests actually vary are modelled; anything else can be
/// appended as raw TOML with [`JobfileBuilder::raw`].
#[derive(Debug, Default)]
pub struct JobfileBuilder {
    jobs_limit: Option<String>,
    load_average: Option<f64>,
    background: Option<bool>,
    entries: Vec<String>,
    raw: String,
}

impl JobfileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[limits].jobs`: pass `"4"` or `"\"unlimited\""` style values.
    pub fn jobs_limit(mut self, value: impl Into<String>) -> Self {
        self.jobs_limit = Some(value.into());
        self
    }

    pub fn load_average(mut self, value: f64) -> Self {
        self.load_average = Some(value);
        self
    }

    pub fn background(mut self, value: bool) -> Self {
        self.background = Some(value);
        self
    }

    /// Add a `[[job]]` entry with a single `cmd`.
    pub fn job(mut self, name: &str, cmd: &str) -> Self {
        self.entries
            .push(format!("[[job]]\nname = \"{name}\"\ncmd = \"{cmd}\"\n"));
        self
    }

    /// Add a `[[job]]` entry with `steps`.
    pub fn job_with_steps(mut self, name: &str, steps: &[&str]) -> Self {
        let steps = steps
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join(", ");
        self.entries
            .push(format!("[[job]]\nname = \"{name}\"\nsteps = [{steps}]\n"));
        self
    }

    /// Append arbitrary TOML verbatim.
    pub fn raw(mut self, toml: &str) -> Self {
        self.raw.push_str(toml);
        self.raw.push('\n');
        self
    }

    pub fn build(self) -> String {
        let mut out = String::new();

        let has_limits = self.jobs_limit.is_some() || self.load_average.is_some();
        if has_limits {
            out.push_str("[limits]\n");
            if let Some(jobs) = &self.jobs_limit {
                let _ = writeln!(out, "jobs = {jobs}");
            }
            if let Some(load) = self.load_average {
                let _ = writeln!(out, "load_average = {load}");
            }
            out.push('\n');
        }

        if let Some(background) = self.background {
            let _ = writeln!(out, "[output]\nbackground = {background}\n");
        }

        out.push_str(&self.raw);

        for entry in &self.entries {
            out.push_str(entry);
            out.push('\n');
        }

        out
    }
}
