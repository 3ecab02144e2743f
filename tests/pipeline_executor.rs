// tests/pipeline_executor.rs

mod common;

use std::time::Duration;

use common::{is_monotonic, Harness, TestResult};
use jobpipe::errors::JobpipeError;
use jobpipe::exec::ProgressBand;
use jobpipe::pipeline::{pipeline_for, Pipeline, ResultSpec};
use jobpipe::status::{JobResult, StatusState, StatusStore, StatusUpdate};
use jobpipe_test_utils::builders::{self, job, process_stage};
use jobpipe_test_utils::fake_backend::Script;
use jobpipe_test_utils::init_tracing;

const TIMEOUT: Duration = Duration::from_millis(200);

fn three_stage_pipeline() -> Pipeline {
    Pipeline::new(
        vec![
            process_stage("first", ProgressBand::new(0, 30), TIMEOUT),
            process_stage("second", ProgressBand::new(30, 60), TIMEOUT),
            process_stage("third", ProgressBand::new(60, 100), TIMEOUT),
        ],
        ResultSpec::Tracks(Vec::new()),
    )
}

#[tokio::test]
async fn timeout_in_middle_stage_fails_job_with_progress_inside_its_band() -> TestResult {
    init_tracing();
    let h = Harness::new();
    h.backend.script("first", Script::ok().line(" 50%|#####     | 5/10"));
    h.backend.script(
        "second",
        Script::ok().line(" 40%|####      | 4/10").hang(),
    );

    let job = job(builders::download("https://youtu.be/abc"));
    h.store.set(&job.id, StatusUpdate::pending("Queued")).await?;

    let err = h
        .executor()
        .run(&job, &three_stage_pipeline())
        .await
        .expect_err("second stage hangs");
    assert!(matches!(err, JobpipeError::ProcessTimeout { ref stage, .. } if stage == "second"));

    let status = h.store.get(&job.id).await?.expect("record exists");
    assert_eq!(status.status, StatusState::Error);
    let error = status.error.as_deref().unwrap_or_default();
    assert!(error.starts_with("process_timeout"), "error was {error}");
    assert!(error.contains("40%"), "diagnostic missing from {error}");
    assert_eq!(status.message, "Failed during second");
    assert!((30..=60).contains(&status.progress), "progress {}", status.progress);
    assert_eq!(status.progress, 42);

    assert!(h.store.history(&job.id).iter().all(|s| s.status != StatusState::Completed));
    assert_eq!(h.store.terminal_writes(&job.id), 1);
    assert!(h.backend.invocations_for("third").is_empty());
    assert!(!h.staging_root().join(job.id.as_str()).exists());
    Ok(())
}

#[tokio::test]
async fn separation_from_url_publishes_stems() -> TestResult {
    init_tracing();
    let h = Harness::new();
    h.backend.script(
        "acquire",
        Script::ok()
            .lines(["[download]  10.0% of 3.20MiB", "[download] 100% of 3.20MiB"])
            .creates("source.wav"),
    );
    h.backend.script(
        "separate",
        Script::ok()
            .lines([" 20%|##        | 2/10", " 50%|#####     | 5/10", "100%|##########| 10/10"])
            .creates("htdemucs_6s/source/vocals.wav")
            .creates("htdemucs_6s/source/drums.wav"),
    );

    let job = job(builders::separate_url("https://youtu.be/abc"));
    let pipeline = pipeline_for(job.kind(), &h.config);
    let result = h.executor().run(&job, &pipeline).await?;

    let JobResult::Tracks { tracks } = &result else {
        panic!("expected tracks, got {result:?}");
    };
    let names: Vec<&str> = tracks.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["drums", "original", "vocals"]);
    assert_eq!(tracks["vocals"], format!("/files/jobs/{}/vocals.wav", job.id));

    let published = h.output_root().join(job.id.as_str());
    assert!(published.join("vocals.wav").is_file());
    assert!(published.join("original.wav").is_file());

    let status = h.store.get(&job.id).await?.expect("record exists");
    assert_eq!(status.status, StatusState::Completed);
    assert_eq!(status.progress, 100);
    assert_eq!(status.result, Some(result.clone()));

    assert_eq!(h.store.stages(&job.id), vec!["acquire", "separate"]);
    let progress = h.store.progress_values(&job.id);
    assert!(is_monotonic(&progress), "progress went backwards: {progress:?}");
    assert!(progress.contains(&63), "50% of [30, 95] maps to 63: {progress:?}");
    assert_eq!(h.store.terminal_writes(&job.id), 1);
    assert!(h.store.rejected().is_empty());

    let separate = &h.backend.invocations_for("separate")[0];
    assert!(separate.args.contains(&"htdemucs_6s".to_string()));
    assert!(separate.cwd.ends_with("separate"));
    Ok(())
}

#[tokio::test]
async fn separated_stems_are_found_outside_declared_layout() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let input = h.input_file("song.flac");
    h.backend.script(
        "separate",
        Script::ok().creates("separated/other_model/song/vocals.wav"),
    );

    let job = job(builders::separate_file(&input));
    let pipeline = pipeline_for(job.kind(), &h.config);
    let result = h.executor().run(&job, &pipeline).await?;

    let JobResult::Tracks { tracks } = result else {
        panic!("expected tracks");
    };
    assert!(tracks.contains_key("vocals"));
    assert_eq!(tracks["original"], format!("/files/jobs/{}/original.flac", job.id));
    assert!(h.backend.invocations_for("acquire").is_empty(), "local files are copied");
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_is_classified_with_output_tail() -> TestResult {
    init_tracing();
    let h = Harness::new();
    h.backend.script(
        "download",
        Script::ok()
            .lines(["[download]  12.0% of 1MiB", "ERROR: Video unavailable"])
            .exit_code(1),
    );

    let job = job(builders::download("https://youtu.be/gone"));
    let pipeline = pipeline_for(job.kind(), &h.config);
    let err = h.executor().run(&job, &pipeline).await.expect_err("exit 1");
    assert!(matches!(err, JobpipeError::ProcessExitNonZero { exit_code: 1, .. }));

    let status = h.store.get(&job.id).await?.expect("record exists");
    assert_eq!(status.status, StatusState::Error);
    let error = status.error.unwrap_or_default();
    assert!(error.starts_with("process_exit_non_zero"));
    assert!(error.contains("Video unavailable"));
    assert_eq!(status.message, "Failed during download");
    Ok(())
}

#[tokio::test]
async fn missing_required_output_fails_the_stage() -> TestResult {
    init_tracing();
    let h = Harness::new();
    // Exits 0 but never writes audio.*
    h.backend.script("download", Script::ok().line("done"));

    let job = job(builders::download("https://youtu.be/abc"));
    let pipeline = pipeline_for(job.kind(), &h.config);
    let err = h.executor().run(&job, &pipeline).await.expect_err("no output");
    assert!(matches!(
        err,
        JobpipeError::OutputNotFound { ref stage, ref output } if stage == "download" && output == "audio"
    ));

    let status = h.store.get(&job.id).await?.expect("record exists");
    assert!(status.error.unwrap_or_default().starts_with("output_not_found"));
    assert_eq!(h.store.terminal_writes(&job.id), 1);
    Ok(())
}

#[tokio::test]
async fn launch_failure_is_reported() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let audio = h.input_file("vocals.wav");
    h.backend.script("transcribe", Script::ok().launch_failure());

    let job = job(builders::transcribe(&audio, "vocals"));
    let pipeline = pipeline_for(job.kind(), &h.config);
    let err = h.executor().run(&job, &pipeline).await.expect_err("launch fails");
    assert_eq!(err.kind(), "process_launch_failed");

    let status = h.store.get(&job.id).await?.expect("record exists");
    assert!(status.error.unwrap_or_default().starts_with("process_launch_failed"));
    Ok(())
}

#[tokio::test]
async fn transcription_is_published_under_the_stem_name() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let audio = h.input_file("bass.wav");
    h.backend.script("transcribe", Script::ok().creates("bass_basic_pitch.mid"));

    let job = job(builders::transcribe(&audio, "bass"));
    let pipeline = pipeline_for(job.kind(), &h.config);
    let result = h.executor().run(&job, &pipeline).await?;

    assert_eq!(
        result,
        JobResult::File {
            file: format!("/files/jobs/{}/bass.mid", job.id)
        }
    );
    assert!(h.output_root().join(job.id.as_str()).join("bass.mid").is_file());
    Ok(())
}

#[tokio::test]
async fn karaoke_runs_every_stage_and_builds_instrumental_from_stems() -> TestResult {
    init_tracing();
    let h = Harness::with_config(|b| b.keep_staging(true));
    h.backend.script("acquire", Script::ok().creates("video.mp4"));
    h.backend.script("extract", Script::ok().creates("audio.wav"));
    h.backend.script(
        "separate",
        Script::ok()
            .creates("htdemucs_6s/audio/vocals.wav")
            .creates("htdemucs_6s/audio/drums.wav")
            .creates("htdemucs_6s/audio/bass.wav"),
    );
    h.backend.script("mix", Script::ok().creates("instrumental.wav"));
    h.backend.script("remux", Script::ok().creates("karaoke.mp4"));

    let job = job(builders::karaoke_url("https://www.youtube.com/watch?v=abc"));
    let pipeline = pipeline_for(job.kind(), &h.config);
    let result = h.executor().run(&job, &pipeline).await?;

    assert_eq!(
        result,
        JobResult::File {
            file: format!("/files/jobs/{}/karaoke.mp4", job.id)
        }
    );
    assert_eq!(
        h.store.stages(&job.id),
        vec!["acquire", "extract", "separate", "mix", "remux"]
    );

    let mix = &h.backend.invocations_for("mix")[0];
    let inputs: Vec<&String> = mix.args.iter().filter(|a| a.ends_with(".wav")).collect();
    assert!(inputs.iter().any(|a| a.ends_with("drums.wav")));
    assert!(inputs.iter().any(|a| a.ends_with("bass.wav")));
    assert!(!inputs.iter().any(|a| a.ends_with("vocals.wav")));

    assert!(h.staging_root().join(job.id.as_str()).exists(), "keep_staging");
    Ok(())
}

#[tokio::test]
async fn mix_passes_gains_to_the_filter() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let vocals = h.input_file("vocals.wav");
    let drums = h.input_file("drums.wav");
    h.backend.script("mix", Script::ok().creates("mix.wav"));

    let job = job(builders::mix(&[("vocals", &vocals, 0.5), ("drums", &drums, 1.25)]));
    let pipeline = pipeline_for(job.kind(), &h.config);
    let result = h.executor().run(&job, &pipeline).await?;
    assert_eq!(
        result,
        JobResult::File {
            file: format!("/files/jobs/{}/mix.wav", job.id)
        }
    );

    let invocation = &h.backend.invocations_for("mix")[0];
    let filter = invocation
        .args
        .iter()
        .find(|a| a.contains("amix"))
        .expect("filter graph argument");
    assert!(filter.contains("volume=1.25"), "{filter}");
    assert!(filter.contains("volume=0.5"), "{filter}");
    assert!(filter.contains("normalize=0"), "{filter}");
    Ok(())
}

#[tokio::test]
async fn throttled_progress_respects_min_step() -> TestResult {
    init_tracing();
    let h = Harness::with_config(|b| b.min_step(10));
    h.backend.script(
        "download",
        Script::ok()
            .lines((1..=100).map(|p| format!("[download] {p:>3}.0% of 9MiB")))
            .creates("audio.wav"),
    );

    let job = job(builders::download("https://youtu.be/abc"));
    let pipeline = pipeline_for(job.kind(), &h.config);
    h.executor().run(&job, &pipeline).await?;

    let progress = h.store.progress_values(&job.id);
    assert!(is_monotonic(&progress), "{progress:?}");
    // Band start, ~10 throttled writes, band end, completion.
    assert!(progress.len() <= 14, "too many writes: {progress:?}");
    assert_eq!(progress.last(), Some(&100));
    Ok(())
}
