// src/config/validate.rs

use std::time::Duration;

use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, RawConfigFile, RawToolConfig, SeparatorConfig, StoreConfig, ToolConfig, ToolSet,
};
use crate::errors::{JobpipeError, Result};
use crate::exec::progress::DOWNLOADER_PROGRESS_PATTERN;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::JobpipeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_dispatcher(&raw)?;
        validate_progress(&raw)?;
        validate_sources(&raw)?;
        let store = build_store(&raw)?;
        let tools = build_tools(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.dispatcher,
            store,
            raw.paths,
            raw.progress,
            raw.sources,
            tools,
        ))
    }
}

fn validate_dispatcher(cfg: &RawConfigFile) -> Result<()> {
    if cfg.dispatcher.max_concurrent_jobs == 0 {
        return Err(JobpipeError::ConfigError(
            "[dispatcher].max_concurrent_jobs must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.dispatcher.queue_capacity == 0 {
        return Err(JobpipeError::ConfigError(
            "[dispatcher].queue_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_progress(cfg: &RawConfigFile) -> Result<()> {
    let step = cfg.progress.min_step;
    if step == 0 || step > 100 {
        return Err(JobpipeError::ConfigError(format!(
            "[progress].min_step must be within 1..=100 (got {step})"
        )));
    }
    Ok(())
}

fn validate_sources(cfg: &RawConfigFile) -> Result<()> {
    if cfg
        .sources
        .allowed_url_patterns
        .iter()
        .any(|p| p.trim().is_empty())
    {
        return Err(JobpipeError::ConfigError(
            "[sources].allowed_url_patterns must not contain empty patterns".to_string(),
        ));
    }
    Ok(())
}

fn build_store(cfg: &RawConfigFile) -> Result<StoreConfig> {
    let retention = positive_duration("[store].retention", &cfg.store.retention)?;
    let sweep_interval = positive_duration("[store].sweep_interval", &cfg.store.sweep_interval)?;

    Ok(StoreConfig {
        backend: cfg.store.backend,
        dir: cfg.store.dir.clone(),
        retention,
        sweep_interval,
    })
}

/// Per-tool built-in values used where the TOML leaves a field out.
struct ToolDefaults {
    name: &'static str,
    program: &'static str,
    args: &'static [&'static str],
    timeout: &'static str,
    progress_regex: Option<&'static str>,
}

const DOWNLOADER: ToolDefaults = ToolDefaults {
    name: "downloader",
    program: "yt-dlp",
    args: &["--no-playlist", "--newline"],
    timeout: "120s",
    progress_regex: Some(DOWNLOADER_PROGRESS_PATTERN),
};

const SEPARATOR: ToolDefaults = ToolDefaults {
    name: "separator",
    program: "python3",
    args: &["-u", "-m", "demucs"],
    timeout: "600s",
    progress_regex: None,
};

const FFMPEG: ToolDefaults = ToolDefaults {
    name: "ffmpeg",
    program: "ffmpeg",
    args: &["-hide_banner", "-nostdin", "-y"],
    timeout: "120s",
    progress_regex: None,
};

const TRANSCRIBER: ToolDefaults = ToolDefaults {
    name: "transcriber",
    program: "basic-pitch",
    args: &[],
    timeout: "300s",
    progress_regex: None,
};

const DEFAULT_SEPARATOR_MODEL: &str = "htdemucs_6s";
const DEFAULT_SEPARATOR_DEVICE: &str = "cpu";

fn build_tools(cfg: &RawConfigFile) -> Result<ToolSet> {
    let separator_raw = &cfg.tools.separator;
    let model = separator_raw
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_SEPARATOR_MODEL.to_string());
    if model.trim().is_empty() {
        return Err(JobpipeError::ConfigError(
            "[tools.separator].model must not be empty".to_string(),
        ));
    }

    Ok(ToolSet {
        downloader: build_tool(&cfg.tools.downloader, &DOWNLOADER)?,
        separator: SeparatorConfig {
            tool: build_tool(separator_raw, &SEPARATOR)?,
            model,
            device: Some(
                separator_raw
                    .device
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SEPARATOR_DEVICE.to_string()),
            )
            .filter(|d| !d.trim().is_empty()),
        },
        ffmpeg: build_tool(&cfg.tools.ffmpeg, &FFMPEG)?,
        transcriber: build_tool(&cfg.tools.transcriber, &TRANSCRIBER)?,
    })
}

fn build_tool(raw: &RawToolConfig, defaults: &ToolDefaults) -> Result<ToolConfig> {
    let program = raw
        .program
        .clone()
        .unwrap_or_else(|| defaults.program.to_string());
    if program.trim().is_empty() {
        return Err(JobpipeError::ConfigError(format!(
            "[tools.{}].program must not be empty",
            defaults.name
        )));
    }

    let args = raw
        .args
        .clone()
        .unwrap_or_else(|| defaults.args.iter().map(|s| s.to_string()).collect());

    let timeout_str = raw.timeout.as_deref().unwrap_or(defaults.timeout);
    let timeout = positive_duration(&format!("[tools.{}].timeout", defaults.name), timeout_str)?;

    let progress_regex = match raw.progress_regex.as_deref().or(defaults.progress_regex) {
        None => None,
        Some(pattern) => Some(compile_progress_regex(defaults.name, pattern)?),
    };

    Ok(ToolConfig {
        program,
        args,
        timeout,
        progress_regex,
    })
}

fn compile_progress_regex(tool: &str, pattern: &str) -> Result<Regex> {
    let re = Regex::new(pattern).map_err(|e| {
        JobpipeError::ConfigError(format!(
            "[tools.{tool}].progress_regex is not a valid regex: {e}"
        ))
    })?;

    // One explicit group plus the implicit whole-match group.
    if re.captures_len() < 2 {
        return Err(JobpipeError::ConfigError(format!(
            "[tools.{tool}].progress_regex must contain a capture group for the percentage"
        )));
    }
    Ok(re)
}

fn positive_duration(field: &str, value: &str) -> Result<Duration> {
    let dur = parse_duration(value)
        .map_err(|e| JobpipeError::ConfigError(format!("{field}: {e}")))?;
    if dur.is_zero() {
        return Err(JobpipeError::ConfigError(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(dur)
}
