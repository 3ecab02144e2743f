// src/pipeline/catalog.rs

//! The static stage list of every job kind.
//!
//! | kind       | stages (band)                                                   |
//! |------------|-----------------------------------------------------------------|
//! | download   | download [0,95]                                                 |
//! | separate   | acquire [0,30], separate [30,95]                                |
//! | mix        | mix [0,95]                                                      |
//! | karaoke    | acquire [0,20], extract [20,30], separate [30,85], mix [85,95], remux [95,100] |
//! | transcribe | transcribe [0,95]                                               |
//!
//! Each stage runs in its own work directory, `<staging>/<stage name>`,
//! which the executor creates before resolving the stage.

use std::path::{Path, PathBuf};

use crate::config::{ConfigFile, SeparatorConfig};
use crate::errors::JobpipeError;
use crate::exec::{ProcessInvocation, ProgressBand};
use crate::job::{JobRequest, MediaSource};
use crate::pipeline::mixing::{self, DEFAULT_GAIN};
use crate::pipeline::stage::{OutputSpec, Pipeline, ResultSpec, Stage, StageAction, StageContext};
use crate::types::JobKind;

/// Stems the separator may produce, as (output name, file name).
/// `vocals` is the only one every model emits.
pub const SEPARATED_STEMS: [(&str, &str); 7] = [
    ("vocals", "vocals.wav"),
    ("drums", "drums.wav"),
    ("bass", "bass.wav"),
    ("guitar", "guitar.wav"),
    ("piano", "piano.wav"),
    ("other", "other.wav"),
    ("accompaniment", "no_vocals.wav"),
];

/// Stems summed into the karaoke instrumental, in mixing order.
const INSTRUMENTAL_STEMS: [&str; 5] = ["drums", "bass", "guitar", "piano", "other"];

/// Build the pipeline a job of `kind` runs through.
pub fn pipeline_for(kind: JobKind, config: &ConfigFile) -> Pipeline {
    match kind {
        JobKind::Download => download_pipeline(),
        JobKind::Separate => separate_pipeline(&config.tools.separator),
        JobKind::Mix => mix_pipeline(),
        JobKind::Karaoke => karaoke_pipeline(&config.tools.separator),
        JobKind::Transcribe => transcribe_pipeline(),
    }
}

fn download_pipeline() -> Pipeline {
    let download = Stage::new(
        "download",
        ProgressBand::new(0, 95),
        "Downloading audio",
        |ctx: &StageContext<'_>| {
            let JobRequest::Download { url } = &ctx.job.request else {
                return Err(mismatch(ctx, "download"));
            };
            Ok(StageAction::Run(download_audio("download", ctx, url, "audio")))
        },
    )
    .tool("downloader")
    .output(OutputSpec::required("audio", "download/audio.*", "audio.*"));

    Pipeline::new(vec![download], ResultSpec::File("audio".to_string()))
}

fn separate_pipeline(separator: &SeparatorConfig) -> Pipeline {
    let acquire = Stage::new(
        "acquire",
        ProgressBand::new(0, 30),
        "Fetching source audio",
        |ctx: &StageContext<'_>| {
            let JobRequest::Separate { source } = &ctx.job.request else {
                return Err(mismatch(ctx, "separate"));
            };
            Ok(acquire_action("acquire", ctx, source, "source", AcquireMode::Audio))
        },
    )
    .tool("downloader")
    .output(OutputSpec::required("source", "acquire/source.*", "source.*"));

    let separate = separate_stage(ProgressBand::new(30, 95), "source", separator);

    let mut tracks = vec![("original".to_string(), "source".to_string())];
    tracks.extend(
        SEPARATED_STEMS
            .iter()
            .map(|(name, _)| (name.to_string(), name.to_string())),
    );

    Pipeline::new(vec![acquire, separate], ResultSpec::Tracks(tracks))
}

fn mix_pipeline() -> Pipeline {
    let mix = Stage::new(
        "mix",
        ProgressBand::new(0, 95),
        "Mixing tracks",
        |ctx: &StageContext<'_>| {
            let JobRequest::Mix { tracks, gains } = &ctx.job.request else {
                return Err(mismatch(ctx, "mix"));
            };
            let inputs: Vec<(PathBuf, f32)> = tracks
                .iter()
                .map(|(stem, path)| {
                    let gain = gains.get(stem).copied().unwrap_or(DEFAULT_GAIN);
                    (absolute(path), gain)
                })
                .collect();
            let borrowed: Vec<(&Path, f32)> =
                inputs.iter().map(|(p, g)| (p.as_path(), *g)).collect();

            let args = mixing::mix_args(&borrowed, Path::new("mix.wav"));
            Ok(StageAction::Run(ProcessInvocation::for_tool(
                "mix",
                &ctx.config.tools.ffmpeg,
                args,
                work_dir(ctx, "mix"),
                ProcessInvocation::no_progress(),
            )))
        },
    )
    .tool("ffmpeg")
    .output(OutputSpec::required("mix", "mix/mix.wav", "mix.wav"));

    Pipeline::new(vec![mix], ResultSpec::File("mix".to_string()))
}

fn karaoke_pipeline(separator: &SeparatorConfig) -> Pipeline {
    let acquire = Stage::new(
        "acquire",
        ProgressBand::new(0, 20),
        "Fetching source video",
        |ctx: &StageContext<'_>| {
            let JobRequest::Karaoke { source } = &ctx.job.request else {
                return Err(mismatch(ctx, "karaoke"));
            };
            Ok(acquire_action("acquire", ctx, source, "video", AcquireMode::Video))
        },
    )
    .tool("downloader")
    .output(OutputSpec::required("video", "acquire/video.*", "video.*"));

    let extract = Stage::new(
        "extract",
        ProgressBand::new(20, 30),
        "Extracting audio track",
        |ctx: &StageContext<'_>| {
            let video = ctx.outputs.require("video")?;
            let args = mixing::extract_audio_args(video, Path::new("audio.wav"));
            Ok(StageAction::Run(ProcessInvocation::for_tool(
                "extract",
                &ctx.config.tools.ffmpeg,
                args,
                work_dir(ctx, "extract"),
                ProcessInvocation::no_progress(),
            )))
        },
    )
    .tool("ffmpeg")
    .output(OutputSpec::required("audio", "extract/audio.wav", "audio.wav"));

    let separate = separate_stage(ProgressBand::new(30, 85), "audio", separator);

    let mix = Stage::new(
        "mix",
        ProgressBand::new(85, 95),
        "Building instrumental",
        |ctx: &StageContext<'_>| {
            let mut inputs: Vec<(&Path, f32)> = INSTRUMENTAL_STEMS
                .iter()
                .filter_map(|stem| ctx.outputs.get(stem))
                .map(|p| (p, DEFAULT_GAIN))
                .collect();
            // Two-stem models only give vocals/accompaniment.
            if inputs.is_empty() {
                inputs.push((ctx.outputs.require("accompaniment")?, DEFAULT_GAIN));
            }

            let args = mixing::mix_args(&inputs, Path::new("instrumental.wav"));
            Ok(StageAction::Run(ProcessInvocation::for_tool(
                "mix",
                &ctx.config.tools.ffmpeg,
                args,
                work_dir(ctx, "mix"),
                ProcessInvocation::no_progress(),
            )))
        },
    )
    .tool("ffmpeg")
    .output(OutputSpec::required(
        "instrumental",
        "mix/instrumental.wav",
        "instrumental.wav",
    ));

    let remux = Stage::new(
        "remux",
        ProgressBand::new(95, 100),
        "Remuxing video",
        |ctx: &StageContext<'_>| {
            let video = ctx.outputs.require("video")?;
            let audio = ctx.outputs.require("instrumental")?;
            let args = mixing::remux_args(video, audio, Path::new("karaoke.mp4"));
            Ok(StageAction::Run(ProcessInvocation::for_tool(
                "remux",
                &ctx.config.tools.ffmpeg,
                args,
                work_dir(ctx, "remux"),
                ProcessInvocation::no_progress(),
            )))
        },
    )
    .tool("ffmpeg")
    .output(OutputSpec::required("karaoke", "remux/karaoke.mp4", "karaoke.mp4"));

    Pipeline::new(
        vec![acquire, extract, separate, mix, remux],
        ResultSpec::File("karaoke".to_string()),
    )
}

fn transcribe_pipeline() -> Pipeline {
    let transcribe = Stage::new(
        "transcribe",
        ProgressBand::new(0, 95),
        "Transcribing notes",
        |ctx: &StageContext<'_>| {
            let JobRequest::Transcribe { audio, .. } = &ctx.job.request else {
                return Err(mismatch(ctx, "transcribe"));
            };
            let args = vec![".".to_string(), absolute(audio).display().to_string()];
            Ok(StageAction::Run(ProcessInvocation::for_tool(
                "transcribe",
                &ctx.config.tools.transcriber,
                args,
                work_dir(ctx, "transcribe"),
                ProcessInvocation::no_progress(),
            )))
        },
    )
    .tool("transcriber")
    .output(OutputSpec::required("midi", "transcribe/*.mid", "*.mid"));

    Pipeline::new(vec![transcribe], ResultSpec::File("midi".to_string()))
}

/// The separation stage, reading the output named `input` of an earlier
/// stage. The separator lays out `<work>/<model>/<input stem>/<stem>.wav`.
fn separate_stage(band: ProgressBand, input: &'static str, separator: &SeparatorConfig) -> Stage {
    let mut stage = Stage::new(
        "separate",
        band,
        "Separating stems",
        move |ctx: &StageContext<'_>| {
            let source = ctx.outputs.require(input)?;
            let sep = &ctx.config.tools.separator;

            let mut args = vec!["-n".to_string(), sep.model.clone()];
            if let Some(device) = &sep.device {
                args.push("-d".to_string());
                args.push(device.clone());
            }
            args.push("-o".to_string());
            args.push(".".to_string());
            args.push(source.display().to_string());

            Ok(StageAction::Run(ProcessInvocation::for_tool(
                "separate",
                &sep.tool,
                args,
                work_dir(ctx, "separate"),
                ProcessInvocation::bar_progress(),
            )))
        },
    )
    .tool("separator");

    for (name, file_name) in SEPARATED_STEMS {
        let pattern = format!("separate/{}/*/{file_name}", separator.model);
        stage = stage.output(if name == "vocals" {
            OutputSpec::required(name, &pattern, file_name)
        } else {
            OutputSpec::optional(name, &pattern, file_name)
        });
    }
    stage
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireMode {
    Audio,
    Video,
}

/// Download a URL or copy a local file into the stage work directory as
/// `<base>.<ext>`.
fn acquire_action(
    stage: &str,
    ctx: &StageContext<'_>,
    source: &MediaSource,
    base: &str,
    mode: AcquireMode,
) -> StageAction {
    match source {
        MediaSource::Url(url) => StageAction::Run(match mode {
            AcquireMode::Audio => download_audio(stage, ctx, url, base),
            AcquireMode::Video => download_video(stage, ctx, url, base),
        }),
        MediaSource::File(path) => {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or(match mode {
                    AcquireMode::Audio => "wav",
                    AcquireMode::Video => "mp4",
                });
            StageAction::CopyFile {
                from: absolute(path),
                to: work_dir(ctx, stage).join(format!("{base}.{ext}")),
            }
        }
    }
}

fn download_audio(stage: &str, ctx: &StageContext<'_>, url: &str, base: &str) -> ProcessInvocation {
    let args = vec![
        "-x".to_string(),
        "--audio-format".to_string(),
        "wav".to_string(),
        "-o".to_string(),
        format!("{base}.%(ext)s"),
        url.to_string(),
    ];
    ProcessInvocation::for_tool(
        stage,
        &ctx.config.tools.downloader,
        args,
        work_dir(ctx, stage),
        ProcessInvocation::no_progress(),
    )
}

fn download_video(stage: &str, ctx: &StageContext<'_>, url: &str, base: &str) -> ProcessInvocation {
    let args = vec![
        "-f".to_string(),
        "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
        "--merge-output-format".to_string(),
        "mp4".to_string(),
        "-o".to_string(),
        format!("{base}.%(ext)s"),
        url.to_string(),
    ];
    ProcessInvocation::for_tool(
        stage,
        &ctx.config.tools.downloader,
        args,
        work_dir(ctx, stage),
        ProcessInvocation::no_progress(),
    )
}

/// Work directory of a stage. Created by the executor before resolving.
pub fn work_dir(ctx: &StageContext<'_>, stage: &str) -> PathBuf {
    ctx.staging_dir.join(stage)
}

/// Tools run inside their work directory, so request paths must not be
/// relative to the caller's.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn mismatch(ctx: &StageContext<'_>, expected: &str) -> JobpipeError {
    JobpipeError::Other(anyhow::anyhow!(
        "job {} has kind '{}' but reached the {expected} pipeline",
        ctx.job.id,
        ctx.job.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_contiguous_bands_within_range() {
        let config = ConfigFile::defaults().unwrap();
        for kind in JobKind::ALL {
            let pipeline = pipeline_for(kind, &config);
            assert!(!pipeline.stages.is_empty(), "{kind} has no stages");

            let mut previous_end = 0;
            for stage in &pipeline.stages {
                assert_eq!(stage.band.start, previous_end, "{kind}/{}", stage.name);
                assert!(stage.band.end >= stage.band.start);
                previous_end = stage.band.end;
            }
            assert!(previous_end <= 100);
        }
    }

    #[test]
    fn karaoke_stage_order() {
        let config = ConfigFile::defaults().unwrap();
        let pipeline = pipeline_for(JobKind::Karaoke, &config);
        assert_eq!(
            pipeline.stage_names(),
            vec!["acquire", "extract", "separate", "mix", "remux"]
        );
    }

    #[test]
    fn separation_requires_only_vocals() {
        let config = ConfigFile::defaults().unwrap();
        let pipeline = pipeline_for(JobKind::Separate, &config);
        let separate = &pipeline.stages[1];
        let required: Vec<&str> = separate
            .outputs
            .iter()
            .filter(|o| o.required)
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(required, vec!["vocals"]);
        assert_eq!(separate.outputs[0].pattern, "separate/htdemucs_6s/*/vocals.wav");
    }
}
