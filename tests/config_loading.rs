use std::fs;
use std::time::Duration;

use forgeloop::config::{load_and_validate, ConfigFile, RawConfigFile};
use forgeloop::engine::Concurrency;
use forgeloop_test_utils::builders::JobfileBuilder;
use tempfile::tempdir;

fn parse(toml_text: &str) -> Result<ConfigFile, forgeloop::errors::ForgeloopError> {
    let raw: RawConfigFile = toml::from_str(toml_text).expect("well-formed TOML");
    ConfigFile::try_from(raw)
}

#[test]
fn loads_a_minimal_jobfile_with_defaults() {
    let text = JobfileBuilder::new().job("compile", "make -j1").build();
    let cfg = parse(&text).unwrap();

    assert_eq!(cfg.limits.jobs, Concurrency::Limited(1));
    assert_eq!(cfg.limits.load_average, None);
    assert_eq!(cfg.limits.load_check_interval, Duration::from_millis(5000));
    assert!(!cfg.output.background);
    assert_eq!(cfg.jobs.len(), 1);
    assert_eq!(cfg.jobs[0].name, "compile");
    assert_eq!(cfg.jobs[0].steps, vec!["make -j1".to_string()]);
}

#[test]
fn parses_limits_and_unlimited_keyword() {
    let text = JobfileBuilder::new()
        .jobs_limit("\"unlimited\"")
        .load_average(3.5)
        .job("a", "true")
        .build();
    let cfg = parse(&text).unwrap();

    assert_eq!(cfg.limits.jobs, Concurrency::Unlimited);
    assert_eq!(cfg.limits.load_average, Some(3.5));
}

#[test]
fn parses_numeric_jobs_ceiling() {
    let text = JobfileBuilder::new().jobs_limit("4").job("a", "true").build();
    let cfg = parse(&text).unwrap();
    assert_eq!(cfg.limits.jobs, Concurrency::Limited(4));
}

#[test]
fn steps_become_an_ordered_list() {
    let text = JobfileBuilder::new()
        .job_with_steps("install", &["make build", "make install"])
        .build();
    let cfg = parse(&text).unwrap();
    assert_eq!(
        cfg.jobs[0].steps,
        vec!["make build".to_string(), "make install".to_string()]
    );
}

#[test]
fn rejects_zero_jobs_ceiling() {
    let text = JobfileBuilder::new().jobs_limit("0").job("a", "true").build();
    let err = parse(&text).unwrap_err();
    assert!(err.to_string().contains("jobs"), "error was: {err}");
}

#[test]
fn rejects_unknown_jobs_keyword() {
    let text = JobfileBuilder::new()
        .jobs_limit("\"plenty\"")
        .job("a", "true")
        .build();
    assert!(parse(&text).is_err());
}

#[test]
fn rejects_nonpositive_load_ceiling() {
    let text = JobfileBuilder::new()
        .load_average(-1.0)
        .job("a", "true")
        .build();
    let err = parse(&text).unwrap_err();
    assert!(err.to_string().contains("load_average"), "error was: {err}");
}

#[test]
fn rejects_duplicate_job_names() {
    let text = JobfileBuilder::new()
        .job("same", "true")
        .job("same", "false")
        .build();
    let err = parse(&text).unwrap_err();
    assert!(err.to_string().contains("duplicate"), "error was: {err}");
}

#[test]
fn rejects_empty_job_list() {
    let err = parse("").unwrap_err();
    assert!(err.to_string().contains("[[job]]"), "error was: {err}");
}

#[test]
fn rejects_job_with_both_cmd_and_steps() {
    let text = "\
[[job]]
name = \"both\"
cmd = \"true\"
steps = [\"false\"]
";
    let err = parse(text).unwrap_err();
    assert!(err.to_string().contains("both"), "error was: {err}");
}

#[test]
fn rejects_job_with_neither_cmd_nor_steps() {
    let text = "\
[[job]]
name = \"nothing\"
";
    assert!(parse(text).is_err());
}

#[test]
fn load_and_validate_reads_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Forgeloop.toml");
    let text = JobfileBuilder::new()
        .jobs_limit("2")
        .background(true)
        .job("fetch", "echo fetch")
        .job("build", "echo build")
        .build();
    fs::write(&path, text).unwrap();

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.limits.jobs, Concurrency::Limited(2));
    assert!(cfg.output.background);
    assert_eq!(cfg.jobs.len(), 2);
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(load_and_validate("/definitely/not/here.toml").is_err());
}
