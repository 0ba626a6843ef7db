//! Media and merge domain types.
//!
//! Enums serialize in lowercase (or snake_case for multi-word variants) and
//! implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// MediaDescriptor
// ---------------------------------------------------------------------------

/// Immutable per-input metadata produced by the stream inspector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Path of the probed file.
    pub path: PathBuf,
    /// Duration in seconds.
    pub duration: f64,
    /// Width of the first video stream in pixels.
    pub width: u32,
    /// Height of the first video stream in pixels.
    pub height: u32,
    /// Frame rate, rounded to two decimal places.
    pub frame_rate: f64,
    /// Codec name of the first video stream (e.g. "h264").
    pub video_codec: String,
    /// Codec name of the first audio stream, if any.
    pub audio_codec: Option<String>,
    /// Pixel format of the first video stream (e.g. "yuv420p").
    pub pixel_format: String,
    /// Sample rate of the first audio stream in Hz.
    pub audio_sample_rate: Option<u32>,
    /// Channel count of the first audio stream.
    pub audio_channels: Option<u32>,
    pub has_audio: bool,
    pub has_subtitles: bool,
    /// Number of audio streams in the file.
    pub audio_streams: u32,
    /// Container format name as reported by the prober.
    pub container: String,
    /// File size in bytes.
    pub file_size: u64,
}

impl MediaDescriptor {
    /// Resolution as a `(width, height)` pair.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Round a frame rate to two decimal places.
///
/// Every frame rate stored in a [`MediaDescriptor`] goes through this so that
/// equality checks across inputs are stable.
pub fn round_frame_rate(fps: f64) -> f64 {
    (fps * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// CriticalField
// ---------------------------------------------------------------------------

/// Descriptor fields that must match across inputs for a stream-copy merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalField {
    Width,
    Height,
    FrameRate,
    VideoCodec,
    AudioCodec,
    PixelFormat,
    AudioSampleRate,
    AudioChannels,
}

impl CriticalField {
    /// All critical fields, in comparison order.
    pub const ALL: [CriticalField; 8] = [
        Self::Width,
        Self::Height,
        Self::FrameRate,
        Self::VideoCodec,
        Self::AudioCodec,
        Self::PixelFormat,
        Self::AudioSampleRate,
        Self::AudioChannels,
    ];
}

impl fmt::Display for CriticalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Width => "width",
            Self::Height => "height",
            Self::FrameRate => "frame_rate",
            Self::VideoCodec => "video_codec",
            Self::AudioCodec => "audio_codec",
            Self::PixelFormat => "pixel_format",
            Self::AudioSampleRate => "audio_sample_rate",
            Self::AudioChannels => "audio_channels",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// TargetProfile
// ---------------------------------------------------------------------------

/// Canonical parameter set that heterogeneous inputs are normalised to.
///
/// Width and height are always even; [`TargetProfile::new`] rounds odd
/// values down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetProfile {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub pixel_format: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
    /// Whether the merged output carries an audio stream.
    pub with_audio: bool,
}

impl TargetProfile {
    /// Build a profile, forcing both dimensions to even values (minimum 2).
    pub fn new(
        width: u32,
        height: u32,
        frame_rate: f64,
        pixel_format: impl Into<String>,
        audio_sample_rate: u32,
        audio_channels: u32,
        with_audio: bool,
    ) -> Self {
        Self {
            width: even(width),
            height: even(height),
            frame_rate,
            pixel_format: pixel_format.into(),
            audio_sample_rate,
            audio_channels,
            with_audio,
        }
    }
}

fn even(v: u32) -> u32 {
    (v & !1).max(2)
}

// ---------------------------------------------------------------------------
// MergeStrategy / CompatibilityVerdict
// ---------------------------------------------------------------------------

/// How a set of inputs is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Stream-copy concatenation of already identical inputs.
    FastConcat,
    /// Normalise each input to a target profile, then stream-copy.
    Standardize,
    /// Single-pass filter-graph re-encode of the original inputs.
    FullReencode,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FastConcat => write!(f, "fast_concat"),
            Self::Standardize => write!(f, "standardize"),
            Self::FullReencode => write!(f, "full_reencode"),
        }
    }
}

/// Output of the compatibility analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityVerdict {
    pub strategy: MergeStrategy,
    pub mismatched_fields: BTreeSet<CriticalField>,
    /// Present whenever `strategy` is [`MergeStrategy::Standardize`].
    pub target_profile: Option<TargetProfile>,
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// Output container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mkv,
    Mp4,
}

impl Container {
    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mkv => "mkv",
            Self::Mp4 => "mp4",
        }
    }

    /// Muxer name passed to ffmpeg's `-f`.
    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Mkv => "matroska",
            Self::Mp4 => "mp4",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ---------------------------------------------------------------------------
// QualityProfile
// ---------------------------------------------------------------------------

/// Encoding quality presets for re-encoding paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityProfile {
    Ultrafast,
    #[default]
    Fast,
    Medium,
    Slow,
    Preserve,
}

impl QualityProfile {
    /// libx264 constant rate factor.
    pub fn crf(&self) -> u32 {
        match self {
            Self::Ultrafast => 28,
            Self::Fast | Self::Medium => 23,
            Self::Slow => 20,
            Self::Preserve => 18,
        }
    }

    /// libx264 preset name.
    pub fn preset(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Preserve => "slower",
        }
    }
}

impl fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ultrafast => write!(f, "ultrafast"),
            Self::Fast => write!(f, "fast"),
            Self::Medium => write!(f, "medium"),
            Self::Slow => write!(f, "slow"),
            Self::Preserve => write!(f, "preserve"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_rounding() {
        assert_eq!(round_frame_rate(30000.0 / 1001.0), 29.97);
        assert_eq!(round_frame_rate(24000.0 / 1001.0), 23.98);
        assert_eq!(round_frame_rate(25.0), 25.0);
    }

    #[test]
    fn target_dimensions_are_even() {
        let t = TargetProfile::new(1281, 721, 30.0, "yuv420p", 48000, 2, true);
        assert_eq!((t.width, t.height), (1280, 720));
        let t = TargetProfile::new(1, 0, 30.0, "yuv420p", 48000, 2, false);
        assert_eq!((t.width, t.height), (2, 2));
    }

    #[test]
    fn container_names() {
        assert_eq!(Container::Mkv.muxer(), "matroska");
        assert_eq!(Container::Mp4.extension(), "mp4");
        assert_eq!(Container::default(), Container::Mkv);
    }

    #[test]
    fn quality_profile_settings() {
        assert_eq!(QualityProfile::Preserve.crf(), 18);
        assert_eq!(QualityProfile::Preserve.preset(), "slower");
        assert_eq!(QualityProfile::Ultrafast.crf(), 28);
        assert_eq!(QualityProfile::default(), QualityProfile::Fast);
    }

    #[test]
    fn strategy_serde() {
        let json = serde_json::to_string(&MergeStrategy::FullReencode).unwrap();
        assert_eq!(json, "\"full_reencode\"");
        assert_eq!(MergeStrategy::FastConcat.to_string(), "fast_concat");
    }

    #[test]
    fn critical_fields_display() {
        assert_eq!(CriticalField::AudioSampleRate.to_string(), "audio_sample_rate");
        assert_eq!(CriticalField::ALL.len(), 8);
    }
}
