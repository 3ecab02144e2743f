// src/exec/progress.rs

//! Progress extraction from unstructured tool output.
//!
//! A [`ProgressParser`] turns one output line into an optional stage-local
//! percentage. Parsers fail open: a line they do not understand yields
//! `None` and never affects the stage outcome.
//!
//! [`StageProgress`] combines a parser with the stage's [`ProgressBand`] and
//! a [`ProgressThrottle`], producing the overall percentages that are worth
//! writing to the status store.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

/// Strategy that recognises progress markers in a line of tool output.
pub trait ProgressParser: Send + Sync + fmt::Debug {
    /// Stage-local percentage (0..=100) carried by `line`, if any.
    fn parse(&self, line: &str) -> Option<u8>;
}

/// Shared handle to a parser, as carried by a process invocation.
pub type ProgressStrategy = Arc<dyn ProgressParser>;

/// Progress-bar lines such as `" 45%|████      | 10/20 [00:05<00:05]"`.
///
/// A line qualifies when it contains both `%` and `|`; the percentage is the
/// integer right before the first `%`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BarProgressParser;

impl ProgressParser for BarProgressParser {
    fn parse(&self, line: &str) -> Option<u8> {
        if !line.contains('|') {
            return None;
        }
        let (before, _) = line.split_once('%')?;
        let before = before.trim_end();

        let digits_start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)?;
        let digits = &before[digits_start..];

        // At most three digits are meaningful ("100").
        let digits = &digits[digits.len().saturating_sub(3)..];
        let value: u16 = digits.parse().ok()?;
        (value <= 100).then_some(value as u8)
    }
}

/// Percentage taken from the first capture group of a regex.
///
/// Fractional captures (`"42.7"`) are truncated; values above 100 are
/// ignored.
#[derive(Debug, Clone)]
pub struct RegexProgressParser {
    regex: Regex,
}

/// Built-in pattern for the downloader's `[download]  42.7% of ...` lines.
pub const DOWNLOADER_PROGRESS_PATTERN: &str = r"\[download\]\s+(\d{1,3})(?:\.\d+)?%";

impl RegexProgressParser {
    pub fn new(regex: Regex) -> Self {
        Self { regex }
    }
}

impl ProgressParser for RegexProgressParser {
    fn parse(&self, line: &str) -> Option<u8> {
        let caps = self.regex.captures(line)?;
        let raw = caps.get(1)?.as_str();
        let whole = raw.split('.').next().unwrap_or(raw);
        let value: u16 = whole.trim().parse().ok()?;
        (value <= 100).then_some(value as u8)
    }
}

/// For tools that print nothing useful; every line is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressParser for NoProgress {
    fn parse(&self, _line: &str) -> Option<u8> {
        None
    }
}

/// Slice `[start, end]` of overall job progress owned by one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressBand {
    pub start: u8,
    pub end: u8,
}

impl ProgressBand {
    /// Build a band; `start` and `end` are clamped to 100 and ordered.
    pub const fn new(start: u8, end: u8) -> Self {
        let start = if start > 100 { 100 } else { start };
        let end = if end > 100 { 100 } else { end };
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// Map a stage-local percentage into this band.
    pub fn map(&self, stage_percent: u8) -> u8 {
        map_stage_progress(stage_percent, self.start, self.end)
    }
}

impl fmt::Display for ProgressBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// `band_start + round(stage_percent * (band_end - band_start) / 100)`.
///
/// `stage_percent` is clamped to 100. Monotonic in `stage_percent`, with
/// `map(0) == band_start` and `map(100) == band_end`.
pub fn map_stage_progress(stage_percent: u8, band_start: u8, band_end: u8) -> u8 {
    let pct = u32::from(stage_percent.min(100));
    let start = u32::from(band_start);
    let width = u32::from(band_end.saturating_sub(band_start));
    // Integer round-half-up of pct * width / 100.
    let offset = (pct * width + 50) / 100;
    (start + offset).min(100) as u8
}

/// Rate limiter for progress writes of one stage.
///
/// A value is admitted when it is at least `min_step` above the last
/// admitted value, or when it reaches the band end. Values never go down.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    last: u8,
    min_step: u8,
    ceiling: u8,
}

impl ProgressThrottle {
    /// `last` is the value already written (usually the band start).
    pub fn new(last: u8, min_step: u8, ceiling: u8) -> Self {
        Self {
            last,
            min_step: min_step.max(1),
            ceiling,
        }
    }

    pub fn admit(&mut self, value: u8) -> bool {
        if value <= self.last {
            return false;
        }
        if value - self.last >= self.min_step || value >= self.ceiling {
            self.last = value;
            true
        } else {
            false
        }
    }

    pub fn last(&self) -> u8 {
        self.last
    }
}

/// Parser + band + throttle for one running stage.
#[derive(Debug, Clone)]
pub struct StageProgress {
    parser: ProgressStrategy,
    band: ProgressBand,
    throttle: ProgressThrottle,
}

impl StageProgress {
    pub fn new(parser: ProgressStrategy, band: ProgressBand, min_step: u8) -> Self {
        Self {
            parser,
            band,
            throttle: ProgressThrottle::new(band.start, min_step, band.end),
        }
    }

    /// Overall percentage worth writing for `line`, or `None`.
    ///
    /// Returns `(stage_percent, overall_percent)`.
    pub fn observe(&mut self, line: &str) -> Option<(u8, u8)> {
        let stage_pct = self.parser.parse(line)?;
        let overall = self.band.map(stage_pct);
        self.throttle.admit(overall).then_some((stage_pct, overall))
    }
}
