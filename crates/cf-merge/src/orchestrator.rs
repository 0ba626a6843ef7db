//! Strategy Orchestrator: the per-job state machine.
//!
//! ```text
//! Analyzing -> FastConcat ----+
//!           -> Standardize ---+-> Verifying -> Done
//!                             |
//!      (copy attempt failed)  +-> FullReencode -> Verifying -> Done
//!
//! any non-terminal state -> Failed
//! ```
//!
//! A copy-mode attempt that fails execution or verification gets exactly
//! one fallback to a filter-graph re-encode of the original inputs. The job
//! workspace is cleaned up exactly once, on whichever terminal state is
//! reached, before the result is returned.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use cf_av::{EncoderSettings, JobWorkspace, Prober, Transcoder};
use cf_core::config::Config;
use cf_core::{CompatibilityVerdict, Error, JobId, MediaDescriptor, MergeStrategy};

use crate::analyzer::{analyze, derive_target};
use crate::executor::ConcatExecutor;
use crate::inspector::Inspector;
use crate::progress::ProgressFn;
use crate::standardizer::Standardizer;

/// Output durations further than this from the summed inputs are logged.
const DURATION_DRIFT_WARN_SECS: f64 = 0.5;

/// States of a merge job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Analyzing,
    FastConcat,
    Standardize,
    FullReencode,
    Verifying,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Analyzing => "analyzing",
            Self::FastConcat => "fast_concat",
            Self::Standardize => "standardize",
            Self::FullReencode => "full_reencode",
            Self::Verifying => "verifying",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Book-keeping for one job, owned by the orchestrator while it runs.
#[derive(Debug)]
pub struct MergeJob {
    pub id: JobId,
    pub inputs: Vec<MediaDescriptor>,
    pub verdict: Option<CompatibilityVerdict>,
    pub output_path: Option<PathBuf>,
    pub state: JobState,
    pub created_at: Instant,
    /// Strategy of the most recent merge attempt.
    pub strategy: Option<MergeStrategy>,
    pub fallback_used: bool,
}

impl MergeJob {
    fn new(id: JobId) -> Self {
        Self {
            id,
            inputs: Vec::new(),
            verdict: None,
            output_path: None,
            state: JobState::Analyzing,
            created_at: Instant::now(),
            strategy: None,
            fallback_used: false,
        }
    }

    fn transition(&mut self, to: JobState) {
        tracing::info!(job_id = %self.id, from = %self.state, to = %to, "job state change");
        self.state = to;
    }

    fn attempt(&mut self, strategy: MergeStrategy) {
        let state = match strategy {
            MergeStrategy::FastConcat => JobState::FastConcat,
            MergeStrategy::Standardize => JobState::Standardize,
            MergeStrategy::FullReencode => JobState::FullReencode,
        };
        self.strategy = Some(strategy);
        self.transition(state);
    }
}

/// A failure together with the state the job was in when it happened.
#[derive(Debug)]
pub struct StageError {
    pub stage: JobState,
    pub error: Error,
}

/// Everything known about a job once it reached a terminal state.
#[derive(Debug)]
pub struct MergeReport {
    pub job_id: JobId,
    pub input_count: usize,
    pub strategy: Option<MergeStrategy>,
    pub fallback_used: bool,
    pub elapsed: Duration,
    pub outcome: std::result::Result<PathBuf, StageError>,
}

/// Sequences inspection, analysis, standardization, concatenation and
/// verification for merge jobs.
#[derive(Clone)]
pub struct Orchestrator {
    prober: Arc<dyn Prober>,
    transcoder: Arc<dyn Transcoder>,
    config: Arc<Config>,
    encoder: EncoderSettings,
    parallelism: usize,
}

impl Orchestrator {
    pub fn new(
        prober: Arc<dyn Prober>,
        transcoder: Arc<dyn Transcoder>,
        config: Arc<Config>,
        encoder: EncoderSettings,
        parallelism: usize,
    ) -> Self {
        Self {
            prober,
            transcoder,
            config,
            encoder,
            parallelism: parallelism.max(1),
        }
    }

    /// Run one job to a terminal state.
    ///
    /// Cancelling `cancel` terminates any running subprocess; the job then
    /// fails with [`Error::Cancelled`] once cleanup is complete. Exceeding
    /// the configured time budget fails it with
    /// [`Error::ResourceExhausted`].
    pub async fn run(
        &self,
        job_id: JobId,
        inputs: Vec<PathBuf>,
        name_hint: &str,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> MergeReport {
        let mut job = MergeJob::new(job_id);
        let mut workspace: Option<JobWorkspace> = None;
        let token = cancel.child_token();
        let budget = self.config.merge.time_budget();
        let mut timed_out = false;

        tracing::info!(job_id = %job_id, inputs = inputs.len(), "merge job started");

        let result = {
            let work = self.drive(&mut job, &mut workspace, &inputs, name_hint, &progress, &token);
            tokio::pin!(work);
            match budget {
                Some(limit) => tokio::select! {
                    r = &mut work => r,
                    _ = tokio::time::sleep(limit) => {
                        tracing::warn!(job_id = %job_id, "time budget of {limit:?} exhausted; cancelling");
                        timed_out = true;
                        token.cancel();
                        work.await
                    }
                },
                None => work.await,
            }
        };

        let outcome = match result {
            Ok(path) => {
                job.transition(JobState::Done);
                Ok(path)
            }
            Err(error) => {
                let error = match error {
                    Error::Cancelled if timed_out => Error::ResourceExhausted(format!(
                        "time budget of {}s exceeded",
                        budget.map(|b| b.as_secs()).unwrap_or_default()
                    )),
                    e => e,
                };
                let stage = job.state;
                tracing::error!(job_id = %job_id, stage = %stage, kind = %error.kind(), "merge job failed: {error}");
                if let Some(diagnostic) = error.diagnostic() {
                    tracing::debug!(job_id = %job_id, "diagnostic: {diagnostic}");
                }
                job.transition(JobState::Failed);
                Err(StageError { stage, error })
            }
        };

        if let Some(mut ws) = workspace.take() {
            let keep = outcome.as_ref().ok().map(PathBuf::as_path);
            if let Err(e) = ws.cleanup(keep) {
                tracing::warn!(job_id = %job_id, "workspace cleanup incomplete: {e}");
            }
        }

        MergeReport {
            job_id,
            input_count: inputs.len(),
            strategy: job.strategy,
            fallback_used: job.fallback_used,
            elapsed: job.created_at.elapsed(),
            outcome,
        }
    }

    async fn drive(
        &self,
        job: &mut MergeJob,
        workspace: &mut Option<JobWorkspace>,
        inputs: &[PathBuf],
        name_hint: &str,
        progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> cf_core::Result<PathBuf> {
        if inputs.len() < 2 {
            return Err(Error::Validation(format!(
                "at least two inputs are required, got {}",
                inputs.len()
            )));
        }

        let inspector = Inspector::new(self.prober.as_ref());
        let descriptors = cancellable(inspector.inspect_all(inputs), cancel).await?;
        let verdict = analyze(&descriptors, &self.config.target)?;
        tracing::info!(
            job_id = %job.id,
            strategy = %verdict.strategy,
            mismatched = ?verdict.mismatched_fields,
            "compatibility analysed"
        );

        let merge = &self.config.merge;
        let ws = workspace.insert(JobWorkspace::create(&merge.work_root, job.id)?);
        let output = ws.output_path(name_hint, merge.container);
        job.inputs = descriptors.clone();
        job.verdict = Some(verdict.clone());
        job.output_path = Some(output.clone());

        let expect_audio = descriptors.iter().any(|d| d.has_audio);
        let total: f64 = descriptors.iter().map(|d| d.duration).sum();
        let reencode_target = verdict
            .target_profile
            .clone()
            .unwrap_or_else(|| derive_target(&descriptors, &self.config.target));

        let executor = ConcatExecutor::new(
            self.transcoder.as_ref(),
            &self.encoder,
            merge.container,
            merge.preserve_all_tracks,
            merge.progress_interval(),
            progress.clone(),
        );

        let copy_attempt = match verdict.strategy {
            MergeStrategy::FastConcat => {
                job.attempt(MergeStrategy::FastConcat);
                let paths: Vec<PathBuf> = descriptors.iter().map(|d| d.path.clone()).collect();
                executor.run_copy(ws, &paths, total, &output, cancel).await
            }
            MergeStrategy::Standardize => {
                job.attempt(MergeStrategy::Standardize);
                let target = verdict.target_profile.as_ref().ok_or_else(|| {
                    Error::Internal("standardize verdict without a target profile".into())
                })?;
                let standardizer = Standardizer::new(
                    self.transcoder.as_ref(),
                    &self.encoder,
                    merge.container,
                    merge.progress_interval(),
                    progress.clone(),
                );
                let parts = standardizer
                    .standardize_all(&descriptors, target, ws, self.parallelism, cancel)
                    .await?;
                let paths: Vec<PathBuf> = parts.iter().map(|p| p.path().to_path_buf()).collect();
                executor.run_copy(ws, &paths, total, &output, cancel).await
            }
            MergeStrategy::FullReencode => {
                job.attempt(MergeStrategy::FullReencode);
                executor
                    .run_filter_graph(&descriptors, &reencode_target, &output, cancel)
                    .await?;
                job.transition(JobState::Verifying);
                self.verify(&output, expect_audio, total, cancel).await?;
                return Ok(output);
            }
        };

        let copy_attempt = match copy_attempt {
            Ok(()) => {
                job.transition(JobState::Verifying);
                self.verify(&output, expect_audio, total, cancel).await
            }
            Err(e) => Err(e),
        };

        match copy_attempt {
            Ok(()) => Ok(output),
            Err(e) if e.is_fallback_eligible() => {
                tracing::warn!(job_id = %job.id, "copy-mode merge failed ({e}); falling back to full re-encode");
                if let Some(diagnostic) = e.diagnostic() {
                    tracing::debug!(job_id = %job.id, "diagnostic: {diagnostic}");
                }
                remove_partial(&output).await;

                job.fallback_used = true;
                job.attempt(MergeStrategy::FullReencode);
                executor
                    .run_filter_graph(&descriptors, &reencode_target, &output, cancel)
                    .await?;
                job.transition(JobState::Verifying);
                self.verify(&output, expect_audio, total, cancel).await?;
                Ok(output)
            }
            Err(e) => Err(e),
        }
    }

    /// Check that `output` exists, is non-empty, has a video stream, and has
    /// an audio stream when any input had one.
    async fn verify(
        &self,
        output: &Path,
        expect_audio: bool,
        expected_duration: f64,
        cancel: &CancellationToken,
    ) -> cf_core::Result<()> {
        let meta = tokio::fs::metadata(output)
            .await
            .map_err(|_| Error::OutputVerificationFailed("output does not exist".into()))?;
        if meta.len() == 0 {
            return Err(Error::OutputVerificationFailed("output is empty".into()));
        }

        // The prober rejects files without a video stream.
        let probed = cancellable(self.prober.probe(output), cancel)
            .await
            .map_err(|e| match e {
                Error::Cancelled => Error::Cancelled,
                e => Error::OutputVerificationFailed(format!("output did not probe: {e}")),
            })?;

        if expect_audio && !probed.has_audio {
            return Err(Error::OutputVerificationFailed(
                "output has no audio stream".into(),
            ));
        }

        if let Some(drift) = duration_drift(expected_duration, probed.duration) {
            tracing::warn!(
                drift,
                output = %output.display(),
                expected = expected_duration,
                actual = probed.duration,
                "output duration differs from summed inputs"
            );
        }
        Ok(())
    }
}

/// How far `actual` strays from `expected`, when that is more than the
/// tolerated drift. An unknown expectation (zero) never drifts.
fn duration_drift(expected: f64, actual: f64) -> Option<f64> {
    let drift = (actual - expected).abs();
    (expected > 0.0 && drift > DURATION_DRIFT_WARN_SECS).then_some(drift)
}

/// Await `fut` unless `cancel` fires first.
async fn cancellable<T>(
    fut: impl Future<Output = cf_core::Result<T>>,
    cancel: &CancellationToken,
) -> cf_core::Result<T> {
    tokio::select! {
        r = fut => r,
        _ = cancel.cancelled() => Err(Error::Cancelled),
    }
}

async fn remove_partial(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %output.display(), "failed to remove partial output: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::tests::descriptor;
    use crate::testing::{materialize, FakeProber, FakeTranscoder};
    use cf_core::{ErrorKind, QualityProfile};
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    struct Harness {
        root: tempfile::TempDir,
        inputs: Vec<MediaDescriptor>,
    }

    impl Harness {
        fn new(descriptors: Vec<MediaDescriptor>) -> Self {
            let root = tempfile::tempdir().unwrap();
            let inputs_dir = root.path().join("in");
            std::fs::create_dir(&inputs_dir).unwrap();
            let inputs = materialize(&inputs_dir, descriptors);
            Self { root, inputs }
        }

        fn work_root(&self) -> PathBuf {
            self.root.path().join("work")
        }

        fn config(&self) -> Config {
            let mut cfg = Config::default();
            cfg.merge.work_root = self.work_root();
            cfg
        }

        fn orchestrator(&self, cfg: Config, transcoder: Arc<FakeTranscoder>) -> Orchestrator {
            self.orchestrator_with(FakeProber::new(&self.inputs), cfg, transcoder)
        }

        fn orchestrator_with(
            &self,
            prober: FakeProber,
            cfg: Config,
            transcoder: Arc<FakeTranscoder>,
        ) -> Orchestrator {
            Orchestrator::new(
                Arc::new(prober),
                transcoder,
                Arc::new(cfg),
                EncoderSettings::software(QualityProfile::Fast, "192k"),
                1,
            )
        }

        fn paths(&self) -> Vec<PathBuf> {
            self.inputs.iter().map(|d| d.path.clone()).collect()
        }

        /// Every entry left under the work root, recursively.
        fn leftovers(&self) -> Vec<PathBuf> {
            fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
                if let Ok(entries) = std::fs::read_dir(dir) {
                    for e in entries.flatten() {
                        let p = e.path();
                        out.push(p.clone());
                        if p.is_dir() {
                            walk(&p, out);
                        }
                    }
                }
            }
            let mut out = Vec::new();
            walk(&self.work_root(), &mut out);
            out
        }
    }

    fn noop() -> ProgressFn {
        Arc::new(|_| {})
    }

    fn is_copy(args: &[String]) -> bool {
        args.windows(2).any(|w| w[0] == "-f" && w[1] == "concat")
    }

    fn is_filter_graph(args: &[String]) -> bool {
        args.iter().any(|a| a == "-filter_complex")
    }

    #[tokio::test]
    async fn identical_inputs_fast_concat() {
        let h = Harness::new(vec![
            descriptor("a.mp4", 1920, 1080, 30.0),
            descriptor("b.mp4", 1920, 1080, 30.0),
        ]);
        let fake = Arc::new(FakeTranscoder::new());
        let report = h
            .orchestrator(h.config(), fake.clone())
            .run(JobId::new(), h.paths(), "holiday", noop(), CancellationToken::new())
            .await;

        let output = report.outcome.unwrap();
        assert_eq!(report.strategy, Some(MergeStrategy::FastConcat));
        assert!(!report.fallback_used);
        assert_eq!(output.file_name().unwrap(), "holiday.mkv");
        assert!(output.exists());

        let calls = fake.invocations();
        assert_eq!(calls.len(), 1);
        assert!(is_copy(&calls[0]));
        // Only the verified output is left behind.
        assert_eq!(h.leftovers(), vec![output.parent().unwrap().to_path_buf(), output]);
    }

    #[tokio::test]
    async fn mixed_inputs_standardize_then_copy() {
        let h = Harness::new(vec![
            descriptor("a.mp4", 1280, 720, 25.0),
            descriptor("b.mp4", 1920, 1080, 30.0),
        ]);
        let fake = Arc::new(FakeTranscoder::new());
        let report = h
            .orchestrator(h.config(), fake.clone())
            .run(JobId::new(), h.paths(), "mix", noop(), CancellationToken::new())
            .await;

        let output = report.outcome.unwrap();
        assert_eq!(report.strategy, Some(MergeStrategy::Standardize));

        let calls = fake.invocations();
        // The 1920x1080/30 input already matches the tie-broken target and
        // passes through; only the 720p input is re-encoded before the copy.
        assert_eq!(calls.len(), 2);
        let joined = calls[0].join(" ");
        assert!(joined.contains(&*h.inputs[0].path.to_string_lossy()));
        assert!(joined.contains("scale=1920:1080"));
        assert!(joined.contains("fps=30"));
        assert!(is_copy(&calls[1]));
        assert_eq!(h.leftovers().len(), 2);
        assert!(output.exists());
    }

    #[test]
    fn duration_drift_tolerance() {
        assert_eq!(duration_drift(20.0, 20.4), None);
        assert_eq!(duration_drift(20.0, 19.6), None);
        assert!(duration_drift(20.0, 20.6).is_some());
        assert_eq!(duration_drift(20.0, 25.0), Some(5.0));
        assert_eq!(duration_drift(0.0, 3.0), None);
    }

    #[tokio::test]
    async fn duration_drift_does_not_fail_verification() {
        let h = Harness::new(vec![
            descriptor("a.mp4", 1920, 1080, 30.0),
            descriptor("b.mp4", 1920, 1080, 30.0),
        ]);
        let fake = Arc::new(FakeTranscoder::new());
        let prober = FakeProber::new(&h.inputs).with_output_duration(25.0);
        let report = h
            .orchestrator_with(prober, h.config(), fake.clone())
            .run(JobId::new(), h.paths(), "long", noop(), CancellationToken::new())
            .await;

        assert!(report.outcome.is_ok());
        assert_eq!(report.strategy, Some(MergeStrategy::FastConcat));
        assert!(!report.fallback_used);
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn output_hint_cannot_overwrite_intermediates() {
        let h = Harness::new(vec![
            descriptor("a.mp4", 1280, 720, 25.0),
            descriptor("b.mp4", 1920, 1080, 30.0),
        ]);
        let fake = Arc::new(FakeTranscoder::new());
        let report = h
            .orchestrator(h.config(), fake.clone())
            .run(JobId::new(), h.paths(), "std_000", noop(), CancellationToken::new())
            .await;

        let output = report.outcome.unwrap();
        assert_eq!(output.file_name().unwrap(), "std_000.mkv");
        let calls = fake.invocations();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].last(), calls[1].last());
    }

    #[tokio::test]
    async fn failed_copy_verification_falls_back_exactly_once() {
        let h = Harness::new(vec![
            descriptor("a.mp4", 1920, 1080, 30.0),
            descriptor("b.mp4", 1920, 1080, 30.0),
        ]);
        let fake = Arc::new(FakeTranscoder::new().copy_drops_audio());
        let report = h
            .orchestrator(h.config(), fake.clone())
            .run(JobId::new(), h.paths(), "x", noop(), CancellationToken::new())
            .await;

        assert!(report.outcome.is_ok());
        assert!(report.fallback_used);
        assert_eq!(report.strategy, Some(MergeStrategy::FullReencode));

        let calls = fake.invocations();
        assert_eq!(calls.len(), 2);
        assert!(is_copy(&calls[0]));
        assert!(is_filter_graph(&calls[1]));
        // The fallback re-encodes the original inputs.
        assert!(calls[1].contains(&h.inputs[0].path.to_string_lossy().to_string()));
    }

    #[tokio::test]
    async fn second_failure_is_terminal() {
        let h = Harness::new(vec![
            descriptor("a.mp4", 1920, 1080, 30.0),
            descriptor("b.mp4", 1920, 1080, 30.0),
        ]);
        let fake = Arc::new(
            FakeTranscoder::new()
                .copy_drops_audio()
                .fail_when_arg_contains("filter_complex"),
        );
        let report = h
            .orchestrator(h.config(), fake.clone())
            .run(JobId::new(), h.paths(), "x", noop(), CancellationToken::new())
            .await;

        let err = report.outcome.unwrap_err();
        assert_eq!(err.stage, JobState::FullReencode);
        assert_eq!(err.error.kind(), ErrorKind::MergeExecutionFailed);
        assert!(report.fallback_used);
        assert_eq!(fake.calls(), 2);
        assert!(h.leftovers().is_empty());
    }

    #[tokio::test]
    async fn standardization_failure_does_not_fall_back() {
        let h = Harness::new(vec![
            descriptor("a.mp4", 1280, 720, 25.0),
            descriptor("b.mp4", 1920, 1080, 30.0),
        ]);
        let fake = Arc::new(FakeTranscoder::new().fail_when_arg_contains("a.mp4"));
        let report = h
            .orchestrator(h.config(), fake.clone())
            .run(JobId::new(), h.paths(), "x", noop(), CancellationToken::new())
            .await;

        let err = report.outcome.unwrap_err();
        assert_eq!(err.stage, JobState::Standardize);
        assert_eq!(err.error.kind(), ErrorKind::StandardizationFailure);
        assert!(!report.fallback_used);
        assert!(fake.invocations().iter().all(|c| !is_filter_graph(c)));
        assert!(h.leftovers().is_empty());
    }

    #[tokio::test]
    async fn zero_byte_input_never_reaches_execution() {
        let h = Harness::new(vec![
            descriptor("a.mp4", 1920, 1080, 30.0),
            descriptor("b.mp4", 1920, 1080, 30.0),
        ]);
        std::fs::write(&h.inputs[1].path, b"").unwrap();
        let fake = Arc::new(FakeTranscoder::new());
        let report = h
            .orchestrator(h.config(), fake.clone())
            .run(JobId::new(), h.paths(), "x", noop(), CancellationToken::new())
            .await;

        let err = report.outcome.unwrap_err();
        assert_eq!(err.stage, JobState::Analyzing);
        assert_eq!(err.error.kind(), ErrorKind::InvalidMedia);
        assert!(report.strategy.is_none());
        assert_eq!(fake.calls(), 0);
        assert!(h.leftovers().is_empty());
    }

    #[tokio::test]
    async fn single_input_is_rejected() {
        let h = Harness::new(vec![descriptor("a.mp4", 1920, 1080, 30.0)]);
        let fake = Arc::new(FakeTranscoder::new());
        let report = h
            .orchestrator(h.config(), fake)
            .run(JobId::new(), h.paths(), "x", noop(), CancellationToken::new())
            .await;
        assert_eq!(report.outcome.unwrap_err().error.kind(), ErrorKind::InvalidMedia);
    }

    #[tokio::test]
    async fn cancellation_during_full_reencode_cleans_up() {
        let h = Harness::new(vec![
            descriptor("a.mp4", 1920, 1080, 30.0),
            descriptor("b.mp4", 1920, 1080, 30.0),
        ]);
        let fake = Arc::new(
            FakeTranscoder::new()
                .copy_drops_audio()
                .block_when_arg_contains("filter_complex"),
        );
        let orch = h.orchestrator(h.config(), fake.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let blocked = fake.blocked.clone();
        tokio::spawn(async move {
            blocked.notified().await;
            trigger.cancel();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            orch.run(JobId::new(), h.paths(), "x", noop(), cancel),
        )
        .await
        .expect("cancellation must finish promptly");

        let err = report.outcome.unwrap_err();
        assert_eq!(err.stage, JobState::FullReencode);
        assert_eq!(err.error.kind(), ErrorKind::Cancelled);
        assert_eq!(fake.terminated.load(Ordering::SeqCst), 1);
        assert!(h.leftovers().is_empty());
    }

    #[tokio::test]
    async fn time_budget_exhaustion() {
        let h = Harness::new(vec![
            descriptor("a.mp4", 1920, 1080, 30.0),
            descriptor("b.mp4", 1920, 1080, 30.0),
        ]);
        let fake = Arc::new(FakeTranscoder::new().block_when_arg_contains("concat"));
        let mut cfg = h.config();
        cfg.merge.time_budget_secs = Some(1);

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            h.orchestrator(cfg, fake.clone())
                .run(JobId::new(), h.paths(), "x", noop(), CancellationToken::new()),
        )
        .await
        .unwrap();

        let err = report.outcome.unwrap_err();
        assert_eq!(err.error.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(err.stage, JobState::FastConcat);
        assert!(!report.fallback_used);
        assert!(h.leftovers().is_empty());
    }

    #[tokio::test]
    async fn progress_updates_reach_the_callback() {
        let h = Harness::new(vec![
            descriptor("a.mp4", 1920, 1080, 30.0),
            descriptor("b.mp4", 1920, 1080, 30.0),
        ]);
        let fake = Arc::new(
            FakeTranscoder::new().emit(&["out_time_us=5000000", "out_time_us=10000000", "progress=end"]),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |u| sink.lock().unwrap().push(u));

        let report = h
            .orchestrator(h.config(), fake)
            .run(JobId::new(), h.paths(), "x", progress, CancellationToken::new())
            .await;
        assert!(report.outcome.is_ok());

        let seen = seen.lock().unwrap();
        // Two markers inside one throttle window: one update.
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].stage_label, "merging");
        assert_eq!(seen[0].fraction, 0.25);
    }
}
