//! Merge outcome log.
//!
//! One [`MergeRecord`] is written per finished job: strategy, whether the
//! fallback ran, timing and, on failure, the stage and error kind. Records
//! never carry tool diagnostics.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use cf_core::{ErrorKind, JobId, MergeStrategy};

use crate::orchestrator::{JobState, MergeReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Done,
    Failed,
}

/// Summary of one finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub job_id: JobId,
    pub outcome: RecordOutcome,
    pub strategy: Option<MergeStrategy>,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<JobState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_bytes: Option<u64>,
    pub elapsed_secs: f64,
    pub input_count: usize,
    pub finished_at: DateTime<Utc>,
}

impl MergeRecord {
    pub fn from_report(report: &MergeReport, output_bytes: Option<u64>) -> Self {
        let (outcome, failed_stage, error_kind) = match &report.outcome {
            Ok(_) => (RecordOutcome::Done, None, None),
            Err(e) => (RecordOutcome::Failed, Some(e.stage), Some(e.error.kind())),
        };
        Self {
            job_id: report.job_id,
            outcome,
            strategy: report.strategy,
            fallback_used: report.fallback_used,
            failed_stage,
            error_kind,
            output_bytes,
            elapsed_secs: report.elapsed.as_secs_f64(),
            input_count: report.input_count,
            finished_at: Utc::now(),
        }
    }
}

/// Sink for finished-job records.
#[async_trait]
pub trait MergeRecorder: Send + Sync {
    async fn record(&self, record: &MergeRecord) -> cf_core::Result<()>;
}

/// Discards every record.
pub struct NoopRecorder;

#[async_trait]
impl MergeRecorder for NoopRecorder {
    async fn record(&self, _record: &MergeRecord) -> cf_core::Result<()> {
        Ok(())
    }
}

/// Appends records as JSON lines to a file.
pub struct JsonLinesRecorder {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MergeRecorder for JsonLinesRecorder {
    async fn record(&self, record: &MergeRecord) -> cf_core::Result<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| cf_core::Error::Internal(format!("serialize merge record: {e}")))?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::StageError;
    use std::time::Duration;

    fn report(outcome: Result<PathBuf, StageError>) -> MergeReport {
        MergeReport {
            job_id: JobId::new(),
            input_count: 3,
            strategy: Some(MergeStrategy::Standardize),
            fallback_used: false,
            elapsed: Duration::from_millis(1500),
            outcome,
        }
    }

    #[test]
    fn failed_report_carries_stage_and_kind() {
        let r = MergeRecord::from_report(
            &report(Err(StageError {
                stage: JobState::Standardize,
                error: cf_core::Error::Cancelled,
            })),
            None,
        );
        assert_eq!(r.outcome, RecordOutcome::Failed);
        assert_eq!(r.failed_stage, Some(JobState::Standardize));
        assert_eq!(r.error_kind, Some(ErrorKind::Cancelled));
        assert_eq!(r.elapsed_secs, 1.5);
    }

    #[tokio::test]
    async fn json_lines_append() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = JsonLinesRecorder::new(dir.path().join("logs/merges.jsonl"));

        let ok = MergeRecord::from_report(&report(Ok(PathBuf::from("/w/out.mkv"))), Some(4096));
        recorder.record(&ok).await.unwrap();
        recorder.record(&ok).await.unwrap();

        let text = std::fs::read_to_string(recorder.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: MergeRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, ok);
        assert!(lines[0].contains(r#""outcome":"done""#));
        assert!(lines[0].contains(r#""strategy":"standardize""#));
        assert!(!lines[0].contains("failed_stage"));
    }
}
