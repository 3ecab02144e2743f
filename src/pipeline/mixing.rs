// src/pipeline/mixing.rs

//! ffmpeg argument builders for the mixing and remux stages.
//!
//! Mixing is a plain weighted sum: every input is scaled by its gain and
//! the results are added without normalisation, so stems produced by the
//! separator add back up to the original track when all gains are 1.0.

use std::path::Path;

/// Gain applied to a track the request does not mention.
pub const DEFAULT_GAIN: f32 = 1.0;

/// `-filter_complex` graph summing `gains.len()` inputs into `[out]`.
pub fn mix_filter(gains: &[f32]) -> String {
    let mut graph = String::new();
    let mut labels = String::new();

    for (i, gain) in gains.iter().enumerate() {
        graph.push_str(&format!("[{i}:a]volume={}[a{i}];", format_gain(*gain)));
        labels.push_str(&format!("[a{i}]"));
    }

    graph.push_str(&format!(
        "{labels}amix=inputs={}:duration=longest:dropout_transition=0:normalize=0[out]",
        gains.len()
    ));
    graph
}

/// Arguments mixing `inputs` (path, gain) into `output`.
pub fn mix_args(inputs: &[(&Path, f32)], output: &Path) -> Vec<String> {
    let mut args = Vec::with_capacity(inputs.len() * 2 + 6);
    for (path, _) in inputs {
        args.push("-i".to_string());
        args.push(path.display().to_string());
    }

    let gains: Vec<f32> = inputs.iter().map(|(_, g)| *g).collect();
    args.push("-filter_complex".to_string());
    args.push(mix_filter(&gains));
    args.push("-map".to_string());
    args.push("[out]".to_string());
    args.push(output.display().to_string());
    args
}

/// Arguments extracting the audio track of `video` as 44.1 kHz stereo WAV.
pub fn extract_audio_args(video: &Path, output: &Path) -> Vec<String> {
    let mut args = vec!["-i".to_string(), video.display().to_string()];
    args.extend(
        ["-vn", "-acodec", "pcm_s16le", "-ar", "44100", "-ac", "2"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(output.display().to_string());
    args
}

/// Arguments replacing the soundtrack of `video` with `audio`, keeping the
/// video stream as-is.
pub fn remux_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        video.display().to_string(),
        "-i".to_string(),
        audio.display().to_string(),
    ];
    args.extend(
        [
            "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac", "-shortest",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(output.display().to_string());
    args
}

fn format_gain(gain: f32) -> String {
    let s = format!("{gain:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_sums_without_normalising() {
        let filter = mix_filter(&[1.0, 0.5]);
        assert_eq!(
            filter,
            "[0:a]volume=1[a0];[1:a]volume=0.5[a1];\
             [a0][a1]amix=inputs=2:duration=longest:dropout_transition=0:normalize=0[out]"
        );
    }

    #[test]
    fn mix_args_list_inputs_in_order() {
        let args = mix_args(
            &[(Path::new("/a/drums.wav"), 1.0), (Path::new("/a/bass.wav"), 0.0)],
            Path::new("out.wav"),
        );
        assert_eq!(&args[..4], &["-i", "/a/drums.wav", "-i", "/a/bass.wav"]);
        assert_eq!(args.last().map(String::as_str), Some("out.wav"));
        assert!(args.iter().any(|a| a.contains("[1:a]volume=0[a1]")));
    }
}
