//! In-process fakes for the probing and encode capabilities.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use cf_av::{Prober, StatusSender, TranscodeOutput, Transcoder};
use cf_core::{Error, MediaDescriptor};

/// Content the fake encoder writes for a copy-mode output that lost audio.
const NO_AUDIO_MARKER: &[u8] = b"noaudio";

fn is_copy_mode(args: &[String]) -> bool {
    args.windows(2).any(|w| w[0] == "-f" && w[1] == "concat")
}

/// Records every invocation and writes a small file at the output path
/// (the last argument).
#[derive(Default)]
pub(crate) struct FakeTranscoder {
    invocations: Mutex<Vec<Vec<String>>>,
    fail_on: Option<String>,
    block_on: Option<String>,
    empty_output: bool,
    copy_drops_audio: bool,
    status_lines: Vec<String>,
    pub(crate) blocked: Arc<Notify>,
    pub(crate) terminated: AtomicUsize,
}

impl FakeTranscoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Exit non-zero for invocations with an argument containing `needle`.
    pub(crate) fn fail_when_arg_contains(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Hang until cancelled for invocations with an argument containing
    /// `needle`.
    pub(crate) fn block_when_arg_contains(mut self, needle: &str) -> Self {
        self.block_on = Some(needle.to_string());
        self
    }

    pub(crate) fn write_empty_output(mut self) -> Self {
        self.empty_output = true;
        self
    }

    /// Copy-mode outputs probe as having no audio stream.
    pub(crate) fn copy_drops_audio(mut self) -> Self {
        self.copy_drops_audio = true;
        self
    }

    pub(crate) fn emit(mut self, lines: &[&str]) -> Self {
        self.status_lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub(crate) fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.lock().unwrap().clone()
    }
}

fn contains(args: &[String], needle: &Option<String>) -> bool {
    needle
        .as_deref()
        .is_some_and(|n| args.iter().any(|a| a.contains(n)))
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn run(
        &self,
        args: Vec<String>,
        status: StatusSender,
        cancel: &CancellationToken,
    ) -> cf_core::Result<TranscodeOutput> {
        self.invocations.lock().unwrap().push(args.clone());

        for line in &self.status_lines {
            let _ = status.send(line.clone());
        }

        if contains(&args, &self.block_on) {
            self.blocked.notify_one();
            cancel.cancelled().await;
            self.terminated.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Cancelled);
        }

        if contains(&args, &self.fail_on) {
            return Ok(TranscodeOutput {
                success: false,
                exit_code: Some(1),
                diagnostic: "simulated failure: Conversion failed!".into(),
            });
        }

        let content: &[u8] = if self.empty_output {
            b""
        } else if self.copy_drops_audio && is_copy_mode(&args) {
            NO_AUDIO_MARKER
        } else {
            b"media"
        };
        if let Some(output) = args.last() {
            tokio::fs::write(output, content).await?;
        }

        Ok(TranscodeOutput {
            success: true,
            exit_code: Some(0),
            diagnostic: String::new(),
        })
    }
}

/// Returns registered descriptors for inputs; anything else is treated as a
/// produced output and described from its content.
#[derive(Default)]
pub(crate) struct FakeProber {
    inputs: HashMap<PathBuf, MediaDescriptor>,
    output_duration: Option<f64>,
    pub(crate) probes: AtomicUsize,
}

impl FakeProber {
    pub(crate) fn new(inputs: &[MediaDescriptor]) -> Self {
        Self {
            inputs: inputs.iter().map(|d| (d.path.clone(), d.clone())).collect(),
            output_duration: None,
            probes: AtomicUsize::new(0),
        }
    }

    /// Report produced outputs with `secs` instead of the summed inputs.
    pub(crate) fn with_output_duration(mut self, secs: f64) -> Self {
        self.output_duration = Some(secs);
        self
    }

    fn output_duration(&self) -> f64 {
        self.output_duration
            .unwrap_or_else(|| self.inputs.values().map(|d| d.duration).sum())
    }
}

#[async_trait]
impl Prober for FakeProber {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, path: &Path) -> cf_core::Result<MediaDescriptor> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.inputs.get(path) {
            return Ok(d.clone());
        }

        let content = tokio::fs::read(path)
            .await
            .map_err(|e| Error::probe_failure(path, e.to_string()))?;
        let has_audio = content != NO_AUDIO_MARKER;
        Ok(MediaDescriptor {
            path: path.to_path_buf(),
            duration: self.output_duration(),
            width: 1920,
            height: 1080,
            frame_rate: 30.0,
            video_codec: "h264".into(),
            audio_codec: has_audio.then(|| "aac".to_string()),
            pixel_format: "yuv420p".into(),
            audio_sample_rate: has_audio.then_some(48000),
            audio_channels: has_audio.then_some(2),
            has_audio,
            has_subtitles: false,
            audio_streams: u32::from(has_audio),
            container: "matroska,webm".into(),
            file_size: content.len() as u64,
        })
    }
}

/// Write `descriptors` as small real files under `dir`, returning them with
/// their paths rewritten.
pub(crate) fn materialize(dir: &Path, descriptors: Vec<MediaDescriptor>) -> Vec<MediaDescriptor> {
    descriptors
        .into_iter()
        .map(|mut d| {
            let name = d
                .path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "input.mp4".into());
            let path = dir.join(name);
            std::fs::write(&path, b"input").unwrap();
            d.path = path;
            d
        })
        .collect()
}
