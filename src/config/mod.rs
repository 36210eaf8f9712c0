// src/config/mod.rs

//! Jobfile configuration.
//!
//! - Define the TOML-backed data model (`model.rs`).
//! - Load and deserialize (`loader.rs`).
//! - Semantic validation, raw → checked (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, JobConfig, LimitsSection, OutputSection, RawConfigFile};
