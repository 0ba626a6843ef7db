//! The encode capability: run ffmpeg with an explicit argument vector while
//! streaming its status output.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::command::{StatusSender, ToolCommand};

/// Arguments prepended to every invocation. `-progress pipe:1` makes ffmpeg
/// write `key=value` status lines to stdout.
const GLOBAL_ARGS: &[&str] = &[
    "-hide_banner",
    "-nostdin",
    "-y",
    "-loglevel",
    "error",
    "-progress",
    "pipe:1",
    "-nostats",
];

/// Outcome of one encoder invocation that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutput {
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Trailing stderr text. Untrusted; for operator logs only.
    pub diagnostic: String,
}

/// Runs the encoder.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run one invocation with `args` (inputs, filters, maps, output path).
    ///
    /// Every status line the encoder emits is sent on `status`; the sender is
    /// dropped before this returns. Cancelling `cancel` terminates the
    /// process.
    ///
    /// # Errors
    ///
    /// - [`cf_core::Error::Cancelled`] if `cancel` fired.
    /// - [`cf_core::Error::Tool`] if the encoder could not be started or
    ///   timed out. A non-zero exit is *not* an error here; it is reported
    ///   through [`TranscodeOutput::success`].
    async fn run(
        &self,
        args: Vec<String>,
        status: StatusSender,
        cancel: &CancellationToken,
    ) -> cf_core::Result<TranscodeOutput>;
}

/// [`Transcoder`] backed by the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            timeout,
        }
    }

    fn command(&self, args: Vec<String>) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.timeout(self.timeout);
        cmd.args(GLOBAL_ARGS.iter().copied());
        cmd.args(args);
        cmd
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(
        &self,
        args: Vec<String>,
        status: StatusSender,
        cancel: &CancellationToken,
    ) -> cf_core::Result<TranscodeOutput> {
        let cmd = self.command(args);
        tracing::debug!(args = ?cmd.get_args(), "running ffmpeg");

        let out = cmd.run_streaming(status, cancel).await?;
        Ok(TranscodeOutput {
            success: out.status.success(),
            exit_code: out.status.code(),
            diagnostic: out.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn global_args_come_first() {
        let t = FfmpegTranscoder::new(PathBuf::from("ffmpeg"), Duration::from_secs(1));
        let cmd = t.command(vec!["-i".into(), "a.mkv".into(), "out.mkv".into()]);
        let args = cmd.get_args();
        assert_eq!(&args[..GLOBAL_ARGS.len()], GLOBAL_ARGS);
        assert_eq!(args.last().map(String::as_str), Some("out.mkv"));
    }

    #[tokio::test]
    async fn missing_binary_is_tool_error() {
        let t = FfmpegTranscoder::new(
            PathBuf::from("/nonexistent/ffmpeg_xyz"),
            Duration::from_secs(5),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = t
            .run(vec![], tx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, cf_core::Error::Tool { .. }));
    }
}
