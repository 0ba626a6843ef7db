//! Video/audio encoder argument selection for re-encoding paths.
//!
//! Software encodes use libx264 driven by the configured
//! [`QualityProfile`]. Hardware encoders do not support CRF, so they get
//! bitrate targeting instead.

use cf_core::config::MergeConfig;
use cf_core::{Container, QualityProfile};

/// Render node used for VA-API encoding.
const VAAPI_DEVICE: &str = "/dev/dri/renderD128";

/// Resolved encoder choice for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    /// ffmpeg encoder name (e.g. `libx264`, `h264_nvenc`).
    pub video_encoder: &'static str,
    /// Whether `video_encoder` is a hardware encoder.
    pub hardware: bool,
    pub quality: QualityProfile,
    pub audio_bitrate: String,
}

impl EncoderSettings {
    /// libx264 with the given quality profile.
    pub fn software(quality: QualityProfile, audio_bitrate: impl Into<String>) -> Self {
        Self {
            video_encoder: "libx264",
            hardware: false,
            quality,
            audio_bitrate: audio_bitrate.into(),
        }
    }

    /// Pick the encoder for a job.
    ///
    /// `available` lists the hardware methods ffmpeg reported (see
    /// [`crate::ToolRegistry::detect_hw_encoders`]). An explicitly requested
    /// method that is not available falls back to software with a warning;
    /// `auto` takes the first available method.
    pub fn resolve(config: &MergeConfig, available: &[&str]) -> Self {
        let requested = config.hw_accel.as_deref().unwrap_or("none");
        let method = match requested {
            "none" => None,
            "auto" => available.first().copied(),
            m if available.contains(&m) => Some(m),
            m => {
                tracing::warn!("hardware encoder '{m}' requested but not available; using libx264");
                None
            }
        };

        match method.and_then(hw_encoder_name) {
            Some(encoder) => Self {
                video_encoder: encoder,
                hardware: true,
                quality: config.quality,
                audio_bitrate: config.audio_bitrate.clone(),
            },
            None => Self::software(config.quality, config.audio_bitrate.clone()),
        }
    }

    /// Video encoder and rate-control arguments.
    pub fn video_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.video_encoder.to_string()];
        if self.hardware {
            // Hardware encoders don't support CRF; use bitrate targeting.
            args.extend(
                ["-b:v", "5M", "-maxrate", "8M", "-bufsize", "16M"]
                    .into_iter()
                    .map(String::from),
            );
        } else {
            args.extend([
                "-crf".to_string(),
                self.quality.crf().to_string(),
                "-preset".to_string(),
                self.quality.preset().to_string(),
            ]);
        }
        args
    }

    /// Global arguments the encoder needs before any input.
    pub fn device_args(&self) -> Vec<String> {
        if self.video_encoder == "h264_vaapi" {
            vec!["-vaapi_device".to_string(), VAAPI_DEVICE.to_string()]
        } else {
            Vec::new()
        }
    }

    /// Filters appended to a software video chain so frames reach the
    /// encoder in the memory it expects.
    pub fn upload_filter(&self) -> Option<&'static str> {
        (self.video_encoder == "h264_vaapi").then_some("format=nv12,hwupload")
    }

    /// AAC encoder arguments.
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]
    }
}

fn hw_encoder_name(method: &str) -> Option<&'static str> {
    crate::tools::HW_ENCODERS
        .iter()
        .find(|(m, _)| *m == method)
        .map(|(_, encoder)| *encoder)
}

/// Bytes reserved at the start of a Matroska file so the cue index can be
/// written before the clusters.
const MKV_INDEX_SPACE: &str = "262144";

/// Muxer selection plus the streaming-friendly layout flag for `container`.
pub fn container_args(container: Container) -> Vec<String> {
    let mut args = vec!["-f".to_string(), container.muxer().to_string()];
    match container {
        Container::Mp4 => args.extend(["-movflags".to_string(), "+faststart".to_string()]),
        Container::Mkv => args.extend(["-reserve_index_space".to_string(), MKV_INDEX_SPACE.to_string()]),
    }
    args
}

/// Input option that regenerates missing presentation timestamps. Must
/// precede the `-i` it applies to.
pub fn genpts_args() -> Vec<String> {
    vec!["-fflags".to_string(), "+genpts".to_string()]
}

/// Output option that shifts timestamps so the first one is zero.
pub fn zero_start_args() -> Vec<String> {
    vec!["-avoid_negative_ts".to_string(), "make_zero".to_string()]
}
