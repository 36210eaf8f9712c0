// src/engine/output.rs

//! Task output routing.
//!
//! Jobs produce output while the scheduler runs; this module decides where
//! it goes. A message is echoed to the interactive surface unless the job
//! (or the whole scheduler) is backgrounded, and appended to the job's log
//! file when one is configured. A `.gz` log path selects a compressing
//! writer; each append forms a complete gzip member, which decompressors
//! concatenate transparently.

use std::cell::Cell;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

/// Severity of a routed message; decides which interactive stream it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLevel {
    Info,
    Warn,
    Error,
}

/// Routes job output to the interactive surface and/or log files.
#[derive(Debug)]
pub struct OutputRouter {
    background: Cell<bool>,
}

impl OutputRouter {
    pub fn new(background: bool) -> Self {
        Self {
            background: Cell::new(background),
        }
    }

    /// The global background flag, used when a job has no local one.
    pub fn background(&self) -> bool {
        self.background.get()
    }

    pub fn set_background(&self, background: bool) {
        self.background.set(background);
    }

    /// Route `msg`.
    ///
    /// `background`: a job-local override of the global flag. When the log
    /// no longer exists (its directory was removed; `ENOENT`/`ESTALE`), the
    /// message falls back to the interactive surface instead of failing the
    /// job, unless it was already echoed there. Other log I/O errors
    /// propagate.
    pub fn output(
        &self,
        msg: &str,
        log_path: Option<&Path>,
        background: Option<bool>,
        level: OutputLevel,
    ) -> io::Result<()> {
        let background = background.unwrap_or_else(|| self.background.get());

        let mut shown = false;
        if !background {
            write_interactive(msg, level);
            shown = true;
        }

        if let Some(path) = log_path {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => append_log(file, path, msg)?,
                Err(err) if log_is_gone(&err) => {
                    if !shown {
                        write_interactive(msg, level);
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}

fn append_log(file: std::fs::File, path: &Path, msg: &str) -> io::Result<()> {
    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(msg.as_bytes())?;
        encoder.finish()?;
    } else {
        let mut file = file;
        file.write_all(msg.as_bytes())?;
    }
    Ok(())
}

fn write_interactive(msg: &str, level: OutputLevel) {
    match level {
        OutputLevel::Info => {
            let mut out = io::stdout();
            let _ = out.write_all(msg.as_bytes());
            let _ = out.flush();
        }
        OutputLevel::Warn | OutputLevel::Error => {
            let mut err = io::stderr();
            let _ = err.write_all(msg.as_bytes());
            let _ = err.flush();
        }
    }
}

fn log_is_gone(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ESTALE)
}
