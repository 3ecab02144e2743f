// tests/progress_parsing.rs

use proptest::prelude::*;
use regex::Regex;

use jobpipe::exec::progress::DOWNLOADER_PROGRESS_PATTERN;
use jobpipe::exec::{
    map_stage_progress, BarProgressParser, ProgressBand, ProgressParser, ProgressThrottle,
    RegexProgressParser, StageProgress,
};
use std::sync::Arc;

#[test]
fn bar_parser_reads_known_lines() {
    let p = BarProgressParser;
    assert_eq!(p.parse(" 37%|███▋      | 127.5/345.15 [00:41<01:10]"), Some(37));
    assert_eq!(p.parse("100%|██████████| 2/2"), Some(100));
    assert_eq!(p.parse("Separating track song.wav"), None);
    assert_eq!(p.parse("50% done"), None, "no bar");
    assert_eq!(p.parse("|%"), None, "no digits");
    assert_eq!(p.parse("250%|##|"), None, "out of range");
}

#[test]
fn downloader_regex_reads_known_lines() {
    let p = RegexProgressParser::new(Regex::new(DOWNLOADER_PROGRESS_PATTERN).unwrap());
    assert_eq!(p.parse("[download]  42.7% of 3.20MiB at 1.2MiB/s"), Some(42));
    assert_eq!(p.parse("[download] 100% of 3.20MiB"), Some(100));
    assert_eq!(p.parse("[download] Destination: source.webm"), None);
    assert_eq!(p.parse("[ExtractAudio] Destination: source.wav"), None);
}

#[test]
fn band_endpoints() {
    assert_eq!(map_stage_progress(0, 30, 95), 30);
    assert_eq!(map_stage_progress(100, 30, 95), 95);
    assert_eq!(map_stage_progress(50, 30, 95), 63);
    assert_eq!(map_stage_progress(200, 0, 95), 95, "clamped");
    assert_eq!(ProgressBand::new(90, 10), ProgressBand::new(10, 90));
}

#[test]
fn stage_progress_stays_inside_band_and_never_repeats() {
    let band = ProgressBand::new(30, 95);
    let mut tracker = StageProgress::new(Arc::new(BarProgressParser), band, 1);

    assert_eq!(tracker.observe("  0%|          |"), None, "band start already written");
    assert_eq!(tracker.observe(" 50%|#####     |"), Some((50, 63)));
    assert_eq!(tracker.observe(" 50%|#####     |"), None);
    assert_eq!(tracker.observe(" 20%|##        |"), None, "backwards");
    assert_eq!(tracker.observe("100%|##########|"), Some((100, 95)));
}

proptest! {
    #[test]
    fn mapping_hits_band_endpoints(start in 0u8..=100, end in 0u8..=100) {
        let band = ProgressBand::new(start, end);
        prop_assert_eq!(band.map(0), band.start);
        prop_assert_eq!(band.map(100), band.end);
    }

    #[test]
    fn mapping_is_monotonic_and_bounded(
        start in 0u8..=100,
        end in 0u8..=100,
        a in 0u8..=100,
        b in 0u8..=100,
    ) {
        let band = ProgressBand::new(start, end);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let (x, y) = (band.map(lo), band.map(hi));
        prop_assert!(x <= y);
        prop_assert!(band.start <= x && y <= band.end);
    }

    #[test]
    fn throttle_output_is_strictly_increasing(
        min_step in 1u8..=20,
        values in proptest::collection::vec(0u8..=100, 0..60),
    ) {
        let mut throttle = ProgressThrottle::new(0, min_step, 100);
        let mut admitted = Vec::new();
        for v in values {
            if throttle.admit(v) {
                admitted.push(v);
            }
        }
        for pair in admitted.windows(2) {
            prop_assert!(pair[0] < pair[1]);
            prop_assert!(pair[1] - pair[0] >= min_step || pair[1] == 100);
        }
    }

    #[test]
    fn bar_parser_reads_any_valid_percentage(pct in 0u8..=100, prefix in "[ a-z]{0,8}") {
        let line = format!("{prefix}{pct:>3}%|####      | 1/2");
        prop_assert_eq!(BarProgressParser.parse(&line), Some(pct));
    }
}
