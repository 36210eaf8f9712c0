// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a jobfile from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform
/// semantic validation (ceilings, job names, etc.). Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a jobfile from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - a usable concurrency ceiling (`>= 1` or `"unlimited"`),
///   - a positive load ceiling when one is given,
///   - well-formed, uniquely named jobs.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Helper to resolve a default jobfile path.
///
/// Currently this just returns `Forgeloop.toml` in the current working
/// directory, but this function exists so you can later respect an env var
/// or support project-local discovery.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Forgeloop.toml")
}
