//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of ffmpeg and
//! ffprobe, and can ask ffmpeg which hardware H.264 encoders it was built
//! with.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Hardware H.264 encoders, in order of preference, paired with the
/// `hw_accel` method name that selects them.
pub const HW_ENCODERS: &[(&str, &str)] = &[
    ("nvenc", "h264_nvenc"),
    ("qsv", "h264_qsv"),
    ("amf", "h264_amf"),
    ("vaapi", "h264_vaapi"),
    ("videotoolbox", "h264_videotoolbox"),
];

/// Configuration for a single external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// For each known tool, if the [`cf_core::config::ToolsConfig`] supplies a
    /// custom path **and** that path exists, it is used directly.  Otherwise
    /// [`which::which`] is used to locate the tool in `PATH`.  Tools that are
    /// not found are silently omitted from the registry.
    pub fn discover(tools_config: &cf_core::config::ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                "ffprobe" => tools_config.ffprobe_path.as_deref(),
                _ => None,
            };

            let resolved = match custom_path {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!("configured {name} path {} does not exist; searching PATH", p.display());
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            if let Some(path) = resolved {
                tools.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                    },
                );
            }
        }

        Self { tools }
    }

    /// Return a reference to the [`ToolConfig`] for the given tool, or an
    /// [`cf_core::Error::Tool`] if the tool was not found during discovery.
    pub fn require(&self, name: &str) -> cf_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            cf_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Check all known tools and return availability information.
    pub async fn check_all(&self) -> Vec<ToolInfo> {
        let mut infos = Vec::with_capacity(KNOWN_TOOLS.len());
        for &name in KNOWN_TOOLS {
            let info = match self.tools.get(name) {
                Some(cfg) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(&cfg.path).await,
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            };
            infos.push(info);
        }
        infos
    }

    /// Ask ffmpeg which hardware H.264 encoders it supports.
    ///
    /// Returns `hw_accel` method names (e.g. `"nvenc"`) in preference order.
    /// A missing ffmpeg or a failed listing yields an empty list.
    pub async fn detect_hw_encoders(&self) -> Vec<&'static str> {
        let Ok(ffmpeg) = self.require("ffmpeg") else {
            return Vec::new();
        };

        let mut cmd = ToolCommand::new(ffmpeg.path.clone());
        cmd.args(["-hide_banner", "-encoders"]);
        match cmd.execute().await {
            Ok(out) => parse_hw_encoders(&out.stdout),
            Err(e) => {
                tracing::warn!("could not list ffmpeg encoders: {e}");
                Vec::new()
            }
        }
    }
}

/// Extract the supported hardware methods from `ffmpeg -encoders` output.
pub fn parse_hw_encoders(listing: &str) -> Vec<&'static str> {
    let names: Vec<&str> = listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .collect();

    HW_ENCODERS
        .iter()
        .filter(|(_, encoder)| names.contains(encoder))
        .map(|(method, _)| *method)
        .collect()
}

/// Run `<tool> -version` and return the first line of stdout.
async fn detect_version(path: &Path) -> Option<String> {
    let mut cmd = ToolCommand::new(path.to_path_buf());
    cmd.arg("-version");
    let output = cmd.execute().await.ok()?;
    output.stdout.lines().next().map(|s| s.to_string())
}
