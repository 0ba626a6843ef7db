//! Application configuration types.
//!
//! The top-level [`Config`] struct carries all sub-configs for tools, merge
//! behaviour, target-profile defaults, and the outcome log. Every section
//! defaults sensibly so a completely empty document is valid. Loading from
//! disk is left to the binary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::media::{Container, QualityProfile};

/// Hardware acceleration values accepted in `merge.hw_accel`.
pub const HW_ACCEL_METHODS: &[&str] = &["none", "auto", "nvenc", "qsv", "amf", "vaapi", "videotoolbox"];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub merge: MergeConfig,
    pub target: TargetConfig,
    pub records: RecordsConfig,
}

impl Config {
    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(ref hw) = self.merge.hw_accel {
            if !HW_ACCEL_METHODS.contains(&hw.as_str()) {
                warnings.push(format!(
                    "merge.hw_accel '{}' is not a recognized method (valid: {})",
                    hw,
                    HW_ACCEL_METHODS.join(", ")
                ));
            }
        }

        if self.merge.standardize_parallelism == Some(0) {
            warnings.push("merge.standardize_parallelism is 0; 1 will be used".into());
        }

        if self.merge.progress_interval_secs == 0 {
            warnings.push(
                "merge.progress_interval_secs is 0; every status line will be reported".into(),
            );
        }

        if self.merge.time_budget_secs == Some(0) {
            warnings.push("merge.time_budget_secs is 0; every job will fail immediately".into());
        }

        if self.target.frame_rate <= 0.0 {
            warnings.push(format!(
                "target.frame_rate {} is not positive",
                self.target.frame_rate
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths and limits for external CLI tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_probe_timeout() -> u64 {
    60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl ToolsConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Merge engine behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Directory under which per-job working directories are created.
    pub work_root: PathBuf,
    pub container: Container,
    pub quality: QualityProfile,
    /// Hardware acceleration method; see [`HW_ACCEL_METHODS`].
    pub hw_accel: Option<String>,
    /// Concurrent standardizations per job. Unset means 1, or 2 once a
    /// hardware encoder has been confirmed.
    pub standardize_parallelism: Option<usize>,
    #[serde(default = "default_progress_interval")]
    pub progress_interval_secs: u64,
    /// Keep every audio track in the re-encode fallback when all inputs
    /// carry the same number of tracks. Otherwise only the first is mapped.
    pub preserve_all_tracks: bool,
    /// Wall-clock budget per job.
    pub time_budget_secs: Option<u64>,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    /// Upper bound for a single encoder invocation.
    #[serde(default = "default_encode_timeout")]
    pub encode_timeout_secs: u64,
}

fn default_work_root() -> PathBuf {
    PathBuf::from("./downloads")
}
fn default_progress_interval() -> u64 {
    2
}
fn default_audio_bitrate() -> String {
    "192k".into()
}
fn default_encode_timeout() -> u64 {
    86400
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            container: Container::default(),
            quality: QualityProfile::default(),
            hw_accel: None,
            standardize_parallelism: None,
            progress_interval_secs: default_progress_interval(),
            preserve_all_tracks: false,
            time_budget_secs: None,
            audio_bitrate: default_audio_bitrate(),
            encode_timeout_secs: default_encode_timeout(),
        }
    }
}

impl MergeConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs.map(Duration::from_secs)
    }

    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }

    /// Effective standardization parallelism.
    pub fn parallelism(&self, hw_encoder_confirmed: bool) -> usize {
        match self.standardize_parallelism {
            Some(n) => n.max(1),
            None if hw_encoder_confirmed => 2,
            None => 1,
        }
    }
}

/// Fixed values used when a target profile has to be derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub frame_rate: f64,
    pub pixel_format: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30.0,
            pixel_format: "yuv420p".into(),
            audio_sample_rate: 48000,
            audio_channels: 2,
        }
    }
}

/// Merge outcome log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    /// JSON-lines file that receives one record per finished job.
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.merge.work_root, PathBuf::from("./downloads"));
        assert_eq!(cfg.merge.container, Container::Mkv);
        assert_eq!(cfg.merge.progress_interval(), Duration::from_secs(2));
        assert_eq!(cfg.target.frame_rate, 30.0);
        assert_eq!(cfg.target.pixel_format, "yuv420p");
        assert_eq!(cfg.target.audio_sample_rate, 48000);
        assert_eq!(cfg.tools.probe_timeout(), Duration::from_secs(60));
        assert!(cfg.records.path.is_none());
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn unknown_hw_accel_warns() {
        let mut cfg = Config::default();
        cfg.merge.hw_accel = Some("cuda-magic".into());
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("hw_accel")));
    }

    #[test]
    fn zero_parallelism_warns_and_clamps() {
        let mut cfg = Config::default();
        cfg.merge.standardize_parallelism = Some(0);
        assert!(cfg.validate().iter().any(|w| w.contains("parallelism")));
        assert_eq!(cfg.merge.parallelism(false), 1);
    }

    #[test]
    fn parallelism_defaults_follow_hardware() {
        let cfg = MergeConfig::default();
        assert_eq!(cfg.parallelism(false), 1);
        assert_eq!(cfg.parallelism(true), 2);
        let cfg = MergeConfig {
            standardize_parallelism: Some(4),
            ..MergeConfig::default()
        };
        assert_eq!(cfg.parallelism(false), 4);
    }

    #[test]
    fn parse_partial_json_uses_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{"merge": {"container": "mp4", "quality": "slow"}}"#).unwrap();
        assert_eq!(cfg.merge.container, Container::Mp4);
        assert_eq!(cfg.merge.quality, QualityProfile::Slow);
        assert_eq!(cfg.merge.audio_bitrate, "192k");
        assert_eq!(cfg.target.audio_channels, 2);
    }
}
