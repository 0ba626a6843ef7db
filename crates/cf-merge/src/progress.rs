//! Progress monitoring for encoder invocations.
//!
//! A [`ProgressMonitor`] is created per subprocess. It reads the encoder's
//! status lines, turns processed-time markers into a [`ProgressSample`], and
//! forwards at most one [`ProgressUpdate`] per throttle window to the job's
//! callback. Each monitor owns its own last-emit timestamp, so concurrent
//! jobs never share throttle state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cf_av::{TranscodeOutput, Transcoder};

/// How long to wait for a monitor to drain after its subprocess exits.
const MONITOR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Throttled progress report delivered to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    /// 0.0..=1.0
    pub fraction: f64,
    /// Media seconds processed per wall-clock second.
    pub speed: f64,
    /// Estimated seconds remaining; `None` until a speed is known.
    pub eta_seconds: Option<f64>,
    pub stage_label: String,
}

/// Caller-supplied progress callback.
pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// One progress reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub elapsed_seconds: f64,
    pub processed_seconds: f64,
    pub total_seconds: f64,
    pub fraction: f64,
    pub speed: f64,
    pub eta_seconds: Option<f64>,
}

impl ProgressSample {
    /// Derive fraction, speed and ETA from raw times.
    pub fn compute(processed_seconds: f64, total_seconds: f64, elapsed_seconds: f64) -> Self {
        let processed = processed_seconds.max(0.0);
        let fraction = if total_seconds > 0.0 {
            (processed / total_seconds).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let speed = if elapsed_seconds > 0.0 {
            processed / elapsed_seconds
        } else {
            0.0
        };
        let eta_seconds =
            (speed > 0.0).then(|| ((total_seconds - processed).max(0.0)) / speed);

        Self {
            elapsed_seconds,
            processed_seconds: processed,
            total_seconds,
            fraction,
            speed,
            eta_seconds,
        }
    }
}

/// Per-subprocess progress monitor.
pub struct ProgressMonitor {
    total_seconds: f64,
    interval: Duration,
    stage_label: String,
    callback: ProgressFn,
    started: Instant,
    last_emit: Option<Instant>,
    emitted: usize,
}

impl ProgressMonitor {
    pub fn new(
        total_seconds: f64,
        interval: Duration,
        stage_label: impl Into<String>,
        callback: ProgressFn,
    ) -> Self {
        Self {
            total_seconds,
            interval,
            stage_label: stage_label.into(),
            callback,
            started: Instant::now(),
            last_emit: None,
            emitted: 0,
        }
    }

    /// Feed one status line observed at `now`.
    ///
    /// Returns the sample if an update was delivered to the callback. Lines
    /// without a time marker, and markers inside the current throttle
    /// window, deliver nothing.
    pub fn observe(&mut self, line: &str, now: Instant) -> Option<ProgressSample> {
        let processed = parse_processed_seconds(line)?;

        if let Some(last) = self.last_emit {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }

        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let sample = ProgressSample::compute(processed, self.total_seconds, elapsed);
        self.last_emit = Some(now);
        self.emitted += 1;

        (self.callback)(ProgressUpdate {
            fraction: sample.fraction,
            speed: sample.speed,
            eta_seconds: sample.eta_seconds,
            stage_label: self.stage_label.clone(),
        });
        Some(sample)
    }

    /// Number of updates delivered so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Drain `rx` on a background task until every sender is gone.
    pub fn spawn(mut self, mut rx: mpsc::UnboundedReceiver<String>) -> JoinHandle<usize> {
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                self.observe(&line, Instant::now());
            }
            self.emitted
        })
    }
}

/// Run one encoder invocation with a [`ProgressMonitor`] attached.
///
/// The monitor is started before the subprocess and joined after it
/// returns, whatever the outcome. If it has not drained within a short grace
/// period it is aborted.
pub async fn run_monitored(
    transcoder: &dyn Transcoder,
    args: Vec<String>,
    monitor: ProgressMonitor,
    cancel: &CancellationToken,
) -> cf_core::Result<TranscodeOutput> {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = monitor.spawn(rx);

    let result = transcoder.run(args, tx, cancel).await;

    let abort = handle.abort_handle();
    match tokio::time::timeout(MONITOR_DRAIN_TIMEOUT, handle).await {
        Ok(Ok(emitted)) => tracing::trace!(emitted, "progress monitor finished"),
        Ok(Err(e)) => tracing::warn!("progress monitor task failed: {e}"),
        Err(_) => {
            tracing::warn!("progress monitor did not drain; aborting");
            abort.abort();
        }
    }

    result
}

/// Extract the processed media time, in seconds, from an encoder status line.
///
/// Understands ffmpeg's `-progress` keys (`out_time_us`, `out_time_ms`,
/// which despite its name is also microseconds, and `out_time`) as well as
/// the `time=` field of classic stderr stats lines.
pub fn parse_processed_seconds(line: &str) -> Option<f64> {
    let line = line.trim();

    if let Some(v) = line.strip_prefix("out_time_us=").or_else(|| line.strip_prefix("out_time_ms=")) {
        return v.trim().parse::<i64>().ok().map(|us| us.max(0) as f64 / 1_000_000.0);
    }
    if let Some(v) = line.strip_prefix("out_time=") {
        return parse_clock(v.trim());
    }

    line.split_whitespace()
        .find_map(|tok| tok.strip_prefix("time="))
        .and_then(parse_clock)
}

/// Parse `[-]HH:MM:SS[.frac]`.
fn parse_clock(s: &str) -> Option<f64> {
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let mut parts = s.splitn(3, ':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let sec: f64 = parts.next()?.parse().ok()?;
    if negative {
        return Some(0.0);
    }
    Some(h * 3600.0 + m * 60.0 + sec)
}
