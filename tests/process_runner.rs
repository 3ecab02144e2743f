// tests/process_runner.rs
#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::TestResult;
use jobpipe::errors::JobpipeError;
use jobpipe::exec::{ProcessInvocation, ProcessRunner};
use jobpipe_test_utils::{init_tracing, with_timeout};

fn sh(script: &str, timeout: Duration) -> ProcessInvocation {
    ProcessInvocation {
        stage: "test".to_string(),
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        cwd: std::env::temp_dir(),
        timeout,
        progress: ProcessInvocation::bar_progress(),
    }
}

#[tokio::test]
async fn lines_split_on_carriage_returns_and_newlines() -> TestResult {
    init_tracing();
    let runner = ProcessRunner::new();
    let mut lines = Vec::new();
    let out = runner
        .execute(
            &sh(
                r"printf ' 10%%|#   |\r 55%%|#####|\r100%%|######|\ndone\n'",
                Duration::from_secs(5),
            ),
            &mut |line: &str| lines.push(line.to_string()),
        )
        .await?;

    assert!(out.success());
    assert_eq!(lines, vec!["10%|#   |", "55%|#####|", "100%|######|", "done"]);
    Ok(())
}

#[tokio::test]
async fn stderr_lines_are_delivered_too() -> TestResult {
    init_tracing();
    let runner = ProcessRunner::new();
    let mut lines = Vec::new();
    let out = runner
        .execute(
            &sh("echo to-stdout; echo to-stderr 1>&2", Duration::from_secs(5)),
            &mut |line: &str| lines.push(line.to_string()),
        )
        .await?;

    lines.sort();
    assert_eq!(lines, vec!["to-stderr", "to-stdout"]);
    assert!(out.output.contains("to-stderr"));
    assert!(out.output.contains("to-stdout"));
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_is_returned_not_raised() -> TestResult {
    init_tracing();
    let runner = ProcessRunner::new();
    let out = runner
        .execute(
            &sh("echo 'model not found'; exit 3", Duration::from_secs(5)),
            &mut |_: &str| {},
        )
        .await?;

    assert_eq!(out.exit_code, 3);
    assert!(!out.success());
    assert!(out.diagnostic().contains("model not found"));
    Ok(())
}

#[tokio::test]
async fn timeout_kills_process_and_keeps_output() -> TestResult {
    init_tracing();
    let runner = ProcessRunner::new();
    let started = Instant::now();

    let err = with_timeout(runner.execute(
        &sh("echo halfway; exec sleep 30", Duration::from_millis(300)),
        &mut |_: &str| {},
    ))
    .await
    .expect_err("must time out");

    assert!(started.elapsed() < Duration::from_secs(5));
    match err {
        JobpipeError::ProcessTimeout {
            stage, diagnostic, ..
        } => {
            assert_eq!(stage, "test");
            assert!(diagnostic.contains("halfway"), "diagnostic: {diagnostic}");
        }
        other => panic!("expected ProcessTimeout, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn missing_program_is_a_launch_failure() -> TestResult {
    init_tracing();
    let runner = ProcessRunner::new();
    let mut invocation = sh("true", Duration::from_secs(5));
    invocation.program = "/nonexistent/jobpipe-tool".to_string();

    let err = runner
        .execute(&invocation, &mut |_: &str| {})
        .await
        .expect_err("cannot launch");
    assert_eq!(err.kind(), "process_launch_failed");
    assert!(err.to_string().contains("/nonexistent/jobpipe-tool"));
    Ok(())
}

#[tokio::test]
async fn captured_output_is_bounded() -> TestResult {
    init_tracing();
    let runner = ProcessRunner::new().with_max_chunks(3);
    let out = runner
        .execute(
            &sh(
                "i=0; while [ $i -lt 200 ]; do echo line-$i; i=$((i+1)); done",
                Duration::from_secs(5),
            ),
            &mut |_: &str| {},
        )
        .await?;

    assert!(out.output.len() <= 300, "kept {} bytes", out.output.len());
    assert!(out.output.contains("line-199"));
    assert!(!out.output.contains("line-0\n"));
    Ok(())
}
