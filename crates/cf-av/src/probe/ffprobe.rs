//! FFprobe-based [`Prober`] implementation.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON output into a [`MediaDescriptor`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use cf_core::{round_frame_rate, MediaDescriptor};
use serde::Deserialize;

use super::Prober;
use crate::command::ToolCommand;

/// Frame rate assumed when the stream reports none.
const FALLBACK_FRAME_RATE: f64 = 30.0;

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    /// Path to the ffprobe binary.
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path) -> cf_core::Result<MediaDescriptor> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(self.timeout);
        cmd.args([
            "-v", "error",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());

        // Spawn failures and timeouts mean the tool itself is unusable.
        let output = cmd
            .output()
            .await
            .map_err(|e| cf_core::Error::probe_failure(path, e.to_string()))?;

        if !output.status.success() {
            tracing::debug!(path = %path.display(), "ffprobe stderr: {}", output.stderr.trim());
            return Err(cf_core::Error::invalid_media(
                path,
                format!("ffprobe rejected the file ({})", output.status),
            ));
        }

        parse_ffprobe_json(path, &output.stdout)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    pix_fmt: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
    duration: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse ffprobe's JSON document into a [`MediaDescriptor`].
///
/// Only the first video and first audio stream contribute codec parameters;
/// the remaining streams are counted.
pub fn parse_ffprobe_json(path: &Path, json: &str) -> cf_core::Result<MediaDescriptor> {
    let output: FfprobeOutput = serde_json::from_str(json).map_err(|e| {
        cf_core::Error::probe_failure(path, format!("ffprobe JSON parse error: {e}"))
    })?;

    let mut video: Option<&FfprobeStream> = None;
    let mut audio: Option<&FfprobeStream> = None;
    let mut audio_streams = 0u32;
    let mut has_subtitles = false;

    for stream in &output.streams {
        match stream.codec_type.as_deref().unwrap_or("") {
            "video" if video.is_none() => video = Some(stream),
            "audio" => {
                audio_streams += 1;
                audio.get_or_insert(stream);
            }
            "subtitle" => has_subtitles = true,
            _ => {}
        }
    }

    let video = video.ok_or_else(|| cf_core::Error::invalid_media(path, "no video stream"))?;

    let width = video.width.unwrap_or(0);
    let height = video.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(cf_core::Error::invalid_media(
            path,
            "video stream has no dimensions",
        ));
    }

    let frame_rate = [&video.r_frame_rate, &video.avg_frame_rate]
        .into_iter()
        .filter_map(|r| r.as_deref().and_then(parse_frame_rate))
        .find(|fps| *fps > 0.0)
        .unwrap_or(FALLBACK_FRAME_RATE);

    let duration = video
        .duration
        .as_deref()
        .and_then(parse_seconds)
        .or_else(|| output.format.duration.as_deref().and_then(parse_seconds))
        .unwrap_or(0.0);

    let file_size = output
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(MediaDescriptor {
        path: path.to_path_buf(),
        duration,
        width,
        height,
        frame_rate: round_frame_rate(frame_rate),
        video_codec: video.codec_name.clone().unwrap_or_default(),
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        pixel_format: video.pix_fmt.clone().unwrap_or_default(),
        audio_sample_rate: audio
            .and_then(|a| a.sample_rate.as_deref())
            .and_then(|s| s.parse().ok()),
        audio_channels: audio.and_then(|a| a.channels),
        has_audio: audio.is_some(),
        has_subtitles,
        audio_streams,
        container: output.format.format_name.unwrap_or_default(),
        file_size,
    })
}

fn parse_frame_rate(rate_str: &str) -> Option<f64> {
    match rate_str.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate_str.parse().ok(),
    }
}

fn parse_seconds(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "r_frame_rate": "30000/1001", "avg_frame_rate": "30000/1001", "pix_fmt": "yuv420p",
             "duration": "12.512"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2},
            {"index": 2, "codec_type": "audio", "codec_name": "ac3", "sample_rate": "48000", "channels": 6},
            {"index": 3, "codec_type": "subtitle", "codec_name": "subrip"}
        ],
        "format": {"format_name": "matroska,webm", "duration": "12.600000", "size": "1048576"}
    }"#;

    #[test]
    fn frame_rate_fraction() {
        assert!((parse_frame_rate("24000/1001").unwrap() - 23.976).abs() < 0.01);
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("invalid"), None);
    }

    #[test]
    fn parse_full_document() {
        let d = parse_ffprobe_json(Path::new("/in/a.mkv"), SAMPLE).unwrap();
        assert_eq!(d.resolution(), (1920, 1080));
        assert_eq!(d.frame_rate, 29.97);
        assert_eq!(d.video_codec, "h264");
        assert_eq!(d.audio_codec.as_deref(), Some("aac"));
        assert_eq!(d.audio_sample_rate, Some(48000));
        assert_eq!(d.audio_channels, Some(2));
        assert_eq!(d.audio_streams, 2);
        assert!(d.has_audio);
        assert!(d.has_subtitles);
        assert_eq!(d.pixel_format, "yuv420p");
        assert_eq!(d.container, "matroska,webm");
        assert_eq!(d.file_size, 1_048_576);
        // Stream duration wins over the format duration.
        assert_eq!(d.duration, 12.512);
    }

    #[test]
    fn absent_audio_is_tolerated() {
        let json = r#"{
            "streams": [{"codec_type": "video", "codec_name": "vp9", "width": 640, "height": 360,
                         "r_frame_rate": "25/1", "pix_fmt": "yuv420p"}],
            "format": {"format_name": "webm", "duration": "3.0"}
        }"#;
        let d = parse_ffprobe_json(Path::new("b.webm"), json).unwrap();
        assert!(!d.has_audio);
        assert!(d.audio_codec.is_none());
        assert_eq!(d.audio_streams, 0);
        assert_eq!(d.duration, 3.0);
    }

    #[test]
    fn avg_frame_rate_used_when_r_frame_rate_missing() {
        let json = r#"{
            "streams": [{"codec_type": "video", "codec_name": "h264", "width": 2, "height": 2,
                         "r_frame_rate": "0/0", "avg_frame_rate": "25/1"}],
            "format": {}
        }"#;
        let d = parse_ffprobe_json(Path::new("c.mp4"), json).unwrap();
        assert_eq!(d.frame_rate, 25.0);
    }

    #[test]
    fn audio_only_is_invalid_media() {
        let json = r#"{"streams": [{"codec_type": "audio", "codec_name": "mp3"}], "format": {}}"#;
        let err = parse_ffprobe_json(Path::new("song.mp3"), json).unwrap_err();
        assert_eq!(err.kind(), cf_core::ErrorKind::InvalidMedia);
    }

    #[test]
    fn garbage_is_probe_failure() {
        let err = parse_ffprobe_json(Path::new("x.mkv"), "not json").unwrap_err();
        assert_eq!(err.kind(), cf_core::ErrorKind::ProbeFailure);
    }

    #[tokio::test]
    async fn missing_binary_is_probe_failure() {
        let prober = FfprobeProber::new(
            PathBuf::from("/nonexistent/ffprobe_xyz"),
            Duration::from_secs(5),
        );
        let err = prober.probe(Path::new("a.mkv")).await.unwrap_err();
        assert_eq!(err.kind(), cf_core::ErrorKind::ProbeFailure);
    }
}
