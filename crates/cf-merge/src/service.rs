//! Caller-facing entry point.
//!
//! [`MergeService::submit`] starts a job on its own task and returns a
//! [`MergeHandle`] that can cancel it or wait for its [`MergeResult`]. Jobs
//! share no mutable state beyond the injected capabilities, so any number
//! may run concurrently.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cf_av::{EncoderSettings, Prober, Transcoder};
use cf_core::config::Config;
use cf_core::{ErrorKind, JobId, MergeStrategy};

use crate::orchestrator::{JobState, MergeReport, Orchestrator};
use crate::progress::{ProgressFn, ProgressUpdate};
use crate::record::{MergeRecord, MergeRecorder};

/// Terminal result of a merge job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MergeResult {
    Done {
        output_path: PathBuf,
        strategy: MergeStrategy,
        fallback_used: bool,
    },
    Failed {
        failed_stage: JobState,
        error_kind: ErrorKind,
        /// Display text of the error, safe to show to users.
        message: String,
        /// Untrusted tool output, for operator logs only.
        #[serde(skip)]
        diagnostic: Option<String>,
    },
}

impl MergeResult {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

impl From<MergeReport> for MergeResult {
    fn from(report: MergeReport) -> Self {
        match report.outcome {
            Ok(output_path) => Self::Done {
                output_path,
                strategy: report.strategy.unwrap_or(MergeStrategy::FastConcat),
                fallback_used: report.fallback_used,
            },
            Err(e) => Self::Failed {
                failed_stage: e.stage,
                error_kind: e.error.kind(),
                message: e.error.to_string(),
                diagnostic: e.error.diagnostic().map(str::to_string),
            },
        }
    }
}

/// Handle to a submitted job.
pub struct MergeHandle {
    job_id: JobId,
    cancel: CancellationToken,
    task: JoinHandle<MergeResult>,
}

impl MergeHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Request cancellation. Idempotent; the job still reports a result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this job, for use after [`MergeHandle::wait`]
    /// has taken the handle.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(self) -> MergeResult {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(job_id = %self.job_id, "merge task aborted: {e}");
                MergeResult::Failed {
                    failed_stage: JobState::Failed,
                    error_kind: ErrorKind::MergeExecutionFailed,
                    message: "merge task aborted".into(),
                    diagnostic: Some(e.to_string()),
                }
            }
        }
    }
}

/// Runs merge jobs against injected probe and encode capabilities.
pub struct MergeService {
    prober: Arc<dyn Prober>,
    transcoder: Arc<dyn Transcoder>,
    config: Arc<Config>,
    recorder: Arc<dyn MergeRecorder>,
    encoder: EncoderSettings,
    hw_confirmed: bool,
}

impl MergeService {
    /// Create a service that encodes in software.
    pub fn new(
        prober: Arc<dyn Prober>,
        transcoder: Arc<dyn Transcoder>,
        config: Arc<Config>,
        recorder: Arc<dyn MergeRecorder>,
    ) -> Self {
        let encoder =
            EncoderSettings::software(config.merge.quality, config.merge.audio_bitrate.clone());
        Self {
            prober,
            transcoder,
            config,
            recorder,
            encoder,
            hw_confirmed: false,
        }
    }

    /// Select an encoder from the hardware methods known to work on this
    /// host, honouring `merge.hw_accel`.
    pub fn with_hw_encoders(mut self, available: &[&str]) -> Self {
        self.encoder = EncoderSettings::resolve(&self.config.merge, available);
        self.hw_confirmed = self.encoder.hardware;
        self
    }

    pub fn encoder(&self) -> &EncoderSettings {
        &self.encoder
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start merging `inputs`, in order, into one file.
    ///
    /// `name_hint` becomes the output file stem after sanitising.
    pub fn submit<F>(
        &self,
        job_id: JobId,
        inputs: Vec<PathBuf>,
        name_hint: impl Into<String>,
        on_progress: F,
    ) -> MergeHandle
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        let orchestrator = Orchestrator::new(
            self.prober.clone(),
            self.transcoder.clone(),
            self.config.clone(),
            self.encoder.clone(),
            self.config.merge.parallelism(self.hw_confirmed),
        );
        let recorder = self.recorder.clone();
        let progress: ProgressFn = Arc::new(on_progress);
        let name_hint = name_hint.into();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let report = orchestrator
                .run(job_id, inputs, &name_hint, progress, token)
                .await;

            let output_bytes = match &report.outcome {
                Ok(path) => tokio::fs::metadata(path).await.ok().map(|m| m.len()),
                Err(_) => None,
            };
            let record = MergeRecord::from_report(&report, output_bytes);
            if let Err(e) = recorder.record(&record).await {
                tracing::warn!(job_id = %job_id, "failed to write merge record: {e}");
            }

            MergeResult::from(report)
        });

        MergeHandle {
            job_id,
            cancel,
            task,
        }
    }
}
