//! Builder for executing external tool commands with timeout support.
//!
//! Arguments are always passed as an argument vector straight to the process
//! spawn API; nothing ever goes through a shell.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// How long a killed process gets to exit before we stop waiting for it.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// How many trailing stderr lines are kept as diagnostic text.
const STDERR_TAIL_LINES: usize = 40;

/// Channel end that receives status lines from a streaming run.
pub type StatusSender = mpsc::UnboundedSender<String>;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8). Empty for streaming runs.
    pub stdout: String,
    /// Captured standard error (lossy UTF-8). For streaming runs only the
    /// trailing lines are kept.
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use cf_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> cf_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
///     .arg("/path/to/video.mkv")
///     .output()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// The arguments collected so far.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Dropping the future that owns the child must never leave the
        // process running.
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run the command to completion and capture its output, whatever the
    /// exit status.
    ///
    /// # Errors
    ///
    /// - [`cf_core::Error::Tool`] if spawning fails or the timeout expires.
    pub async fn output(&self) -> cf_core::Result<ToolOutput> {
        let program_name = self.program_name();
        let child = self.command().spawn().map_err(|e| {
            cf_core::Error::tool(program_name.clone(), format!("failed to spawn: {e}"))
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ToolOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Ok(Err(e)) => Err(cf_core::Error::tool(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            // The timed-out future owned the child; kill_on_drop reaps it.
            Err(_elapsed) => Err(cf_core::Error::tool(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }

    /// Execute the command, failing on a non-zero exit status.
    ///
    /// # Errors
    ///
    /// - Everything [`ToolCommand::output`] returns.
    /// - [`cf_core::Error::Tool`] if the process exits with a non-zero
    ///   status (message includes stderr).
    pub async fn execute(&self) -> cf_core::Result<ToolOutput> {
        let output = self.output().await?;
        if !output.status.success() {
            return Err(cf_core::Error::tool(
                self.program_name(),
                format!(
                    "exited with status {}: {}",
                    output.status,
                    output.stderr.trim()
                ),
            ));
        }
        Ok(output)
    }

    /// Run the command while forwarding every stdout and stderr line to
    /// `status` as it arrives.
    ///
    /// The sender is dropped before this returns, so a consumer draining the
    /// other end observes end-of-stream once the process is gone. Cancelling
    /// `cancel` kills the process and waits (bounded) for it to exit.
    ///
    /// # Errors
    ///
    /// - [`cf_core::Error::Cancelled`] if `cancel` fired.
    /// - [`cf_core::Error::Tool`] on spawn failure or timeout.
    pub async fn run_streaming(
        &self,
        status: StatusSender,
        cancel: &CancellationToken,
    ) -> cf_core::Result<ToolOutput> {
        let program_name = self.program_name();
        let mut child = self.command().spawn().map_err(|e| {
            cf_core::Error::tool(program_name.clone(), format!("failed to spawn: {e}"))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            cf_core::Error::tool(program_name.clone(), "stdout was not captured")
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            cf_core::Error::tool(program_name.clone(), "stderr was not captured")
        })?;

        let stdout_task = forward_lines(stdout, status.clone(), None);
        let stderr_task = forward_lines(stderr, status, Some(STDERR_TAIL_LINES));

        enum Exit {
            Done(std::io::Result<ExitStatus>),
            Cancelled,
            TimedOut,
        }

        let exit = tokio::select! {
            r = child.wait() => Exit::Done(r),
            _ = cancel.cancelled() => Exit::Cancelled,
            _ = tokio::time::sleep(self.timeout) => Exit::TimedOut,
        };

        let (status, cancelled) = match exit {
            Exit::Done(r) => (Some(r), false),
            Exit::Cancelled => {
                kill_and_reap(&mut child, &program_name).await;
                (None, true)
            }
            Exit::TimedOut => {
                kill_and_reap(&mut child, &program_name).await;
                (None, false)
            }
        };

        // Readers finish once the pipes close; never let them outlive us.
        let _ = join_or_abort(stdout_task).await;
        let stderr_tail = join_or_abort(stderr_task).await.unwrap_or_default();

        match status {
            Some(Ok(status)) => Ok(ToolOutput {
                status,
                stdout: String::new(),
                stderr: stderr_tail,
            }),
            Some(Err(e)) => Err(cf_core::Error::tool(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            None if cancelled => Err(cf_core::Error::Cancelled),
            None => Err(cf_core::Error::tool(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }
}

async fn kill_and_reap(child: &mut tokio::process::Child, program_name: &str) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(tool = %program_name, "failed to kill process: {e}");
    }
    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        tracing::warn!(tool = %program_name, "process did not exit within {:?} of kill", KILL_GRACE);
    }
}

/// Spawn a task that forwards each line of `reader` to `tx`. When `keep` is
/// set the task also returns the last `keep` lines joined with newlines.
fn forward_lines<R>(reader: R, tx: StatusSender, keep: Option<usize>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tail: VecDeque<String> = VecDeque::new();
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(limit) = keep {
                if tail.len() == limit {
                    tail.pop_front();
                }
                tail.push_back(line.clone());
            }
            // The consumer may already be gone; keep draining the pipe.
            let _ = tx.send(line);
        }
        tail.into_iter().collect::<Vec<_>>().join("\n")
    })
}

async fn join_or_abort(task: JoinHandle<String>) -> Option<String> {
    let abort = task.abort_handle();
    match tokio::time::timeout(KILL_GRACE, task).await {
        Ok(Ok(s)) => Some(s),
        Ok(Err(_)) => None,
        Err(_) => {
            abort.abort();
            None
        }
    }
}
