// tests/config_errors.rs

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use jobpipe::config::load_and_validate;
use jobpipe::errors::JobpipeError;
use jobpipe::types::StoreBackend;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(contents: &str, needle: &str) {
    let file = config_file(contents);
    match load_and_validate(file.path()) {
        Err(JobpipeError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "'{msg}' does not mention '{needle}'")
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error for:\n{contents}"),
    }
}

#[test]
fn empty_file_gives_defaults() {
    let file = config_file("");
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.dispatcher.max_concurrent_jobs, 2);
    assert_eq!(cfg.dispatcher.queue_capacity, 64);
    assert_eq!(cfg.store.backend, StoreBackend::Memory);
    assert_eq!(cfg.store.retention, Duration::from_secs(3600));
    assert_eq!(cfg.progress.min_step, 1);
    assert_eq!(cfg.tools.downloader.program, "yt-dlp");
    assert!(cfg.tools.downloader.progress_regex.is_some());
    assert_eq!(cfg.tools.separator.model, "htdemucs_6s");
    assert_eq!(cfg.tools.separator.tool.timeout, Duration::from_secs(600));
    assert!(cfg.tools.ffmpeg.args.contains(&"-y".to_string()));
}

#[test]
fn explicit_values_override_defaults() {
    let file = config_file(
        r#"
[dispatcher]
max_concurrent_jobs = 4
queue_capacity = 8

[store]
backend = "file"
dir = "/var/lib/jobpipe/status"
retention = "30m"

[tools.separator]
program = "demucs"
args = []
timeout = "20m"
model = "htdemucs"
device = "cuda"

[tools.ffmpeg]
progress_regex = 'time=(\d+)'
"#,
    );
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.dispatcher.max_concurrent_jobs, 4);
    assert_eq!(cfg.store.backend, StoreBackend::File);
    assert_eq!(cfg.store.retention, Duration::from_secs(1800));
    assert_eq!(cfg.tools.separator.tool.program, "demucs");
    assert!(cfg.tools.separator.tool.args.is_empty());
    assert_eq!(cfg.tools.separator.tool.timeout, Duration::from_secs(1200));
    assert_eq!(cfg.tools.separator.device.as_deref(), Some("cuda"));
    assert!(cfg.tools.ffmpeg.progress_regex.is_some());
}

#[test]
fn zero_concurrency_is_rejected() {
    expect_config_error("[dispatcher]\nmax_concurrent_jobs = 0\n", "max_concurrent_jobs");
}

#[test]
fn zero_queue_capacity_is_rejected() {
    expect_config_error("[dispatcher]\nqueue_capacity = 0\n", "queue_capacity");
}

#[test]
fn bad_durations_are_rejected() {
    expect_config_error("[store]\nretention = \"10 parsecs\"\n", "[store].retention");
    expect_config_error("[store]\nretention = \"0s\"\n", "greater than zero");
    expect_config_error("[tools.downloader]\ntimeout = \"soon\"\n", "[tools.downloader].timeout");
    expect_config_error("[store]\nretention = \"5124095576030432h\"\n", "too large");
}

#[test]
fn progress_regex_needs_a_capture_group() {
    expect_config_error(
        "[tools.separator]\nprogress_regex = '\\d+%'\n",
        "capture group",
    );
    expect_config_error(
        "[tools.separator]\nprogress_regex = '(unclosed'\n",
        "not a valid regex",
    );
}

#[test]
fn min_step_out_of_range_is_rejected() {
    expect_config_error("[progress]\nmin_step = 0\n", "min_step");
    expect_config_error("[progress]\nmin_step = 101\n", "min_step");
}

#[test]
fn empty_program_and_model_are_rejected() {
    expect_config_error("[tools.ffmpeg]\nprogram = \"  \"\n", "[tools.ffmpeg].program");
    expect_config_error("[tools.separator]\nmodel = \"\"\n", "model");
}

#[test]
fn unknown_store_backend_is_a_toml_error() {
    let file = config_file("[store]\nbackend = \"redis\"\n");
    match load_and_validate(file.path()) {
        Err(JobpipeError::TomlError(_)) => {}
        other => panic!("Expected TomlError, got: {:?}", other.map(|_| ())),
    }
}
