//! # cf-av
//!
//! External tool plumbing for the clipforge merge engine.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find ffmpeg and ffprobe and
//!   detect hardware H.264 encoders.
//! - **Command execution** ([`ToolCommand`]) -- async argv-only builder with
//!   timeout, cancellation, and line-by-line status streaming.
//! - **Probing** ([`Prober`], [`FfprobeProber`]) -- media metadata
//!   extraction.
//! - **Encoding** ([`Transcoder`], [`FfmpegTranscoder`], [`EncoderSettings`])
//!   -- the encode capability and encoder argument selection.
//! - **Workspace management** ([`JobWorkspace`]) -- per-job directory with
//!   exactly-once cleanup.

pub mod command;
pub mod encoder;
pub mod probe;
pub mod tools;
pub mod transcode;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{StatusSender, ToolCommand, ToolOutput};
pub use encoder::{container_args, genpts_args, zero_start_args, EncoderSettings};
pub use probe::{FfprobeProber, Prober};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use transcode::{FfmpegTranscoder, TranscodeOutput, Transcoder};
pub use workspace::JobWorkspace;
