//! # cf-merge
//!
//! The merge engine: turns an ordered list of video files into one playable
//! file.
//!
//! - [`inspector`] reads per-file metadata through a [`cf_av::Prober`].
//! - [`analyzer`] compares inputs and picks a [`cf_core::MergeStrategy`].
//! - [`standardizer`] normalises mismatched inputs to a target profile.
//! - [`executor`] concatenates by stream copy or by a single filter graph.
//! - [`orchestrator`] drives one job through its states, including the
//!   one-time re-encode fallback and workspace cleanup.
//! - [`service`] is the caller-facing submit/cancel/wait surface.

pub mod analyzer;
pub mod executor;
pub mod filters;
pub mod inspector;
pub mod orchestrator;
pub mod progress;
pub mod record;
pub mod service;
pub mod standardizer;

#[cfg(test)]
mod testing;

pub use analyzer::analyze;
pub use inspector::Inspector;
pub use orchestrator::{JobState, MergeReport, Orchestrator, StageError};
pub use progress::{ProgressFn, ProgressUpdate};
pub use record::{JsonLinesRecorder, MergeRecord, MergeRecorder, NoopRecorder, RecordOutcome};
pub use service::{MergeHandle, MergeResult, MergeService};
