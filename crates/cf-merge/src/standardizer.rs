//! Standardizer: normalise individual inputs to a [`TargetProfile`] so the
//! set becomes stream-copy compatible.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use cf_av::{EncoderSettings, JobWorkspace, Transcoder};
use cf_core::{Container, Error, MediaDescriptor, TargetProfile};

use crate::analyzer::FRAME_RATE_TOLERANCE;
use crate::filters;
use crate::progress::{run_monitored, ProgressFn, ProgressMonitor};

/// Codecs every standardized file ends up with.
const TARGET_VIDEO_CODEC: &str = "h264";
const TARGET_AUDIO_CODEC: &str = "aac";

/// Result of standardizing one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Standardized {
    /// The input already matched; the original file is used as is.
    PassThrough(PathBuf),
    /// A re-encoded copy was written into the job workspace.
    Encoded(PathBuf),
}

impl Standardized {
    pub fn path(&self) -> &Path {
        match self {
            Self::PassThrough(p) | Self::Encoded(p) => p,
        }
    }
}

/// Whether `d` can be used unchanged alongside files standardized to
/// `target`.
///
/// Besides the target parameters this requires the target codecs and
/// exactly the stream layout a standardized file has (one video stream, one
/// audio stream if the target has audio, nothing else), since copy-mode
/// concatenation maps every stream.
pub fn matches_target(d: &MediaDescriptor, target: &TargetProfile) -> bool {
    let video_ok = d.width == target.width
        && d.height == target.height
        && (d.frame_rate - target.frame_rate).abs() <= FRAME_RATE_TOLERANCE
        && d.pixel_format == target.pixel_format
        && d.video_codec == TARGET_VIDEO_CODEC
        && !d.has_subtitles;

    let audio_ok = if target.with_audio {
        d.audio_streams == 1
            && d.audio_codec.as_deref() == Some(TARGET_AUDIO_CODEC)
            && d.audio_sample_rate == Some(target.audio_sample_rate)
            && d.audio_channels == Some(target.audio_channels)
    } else {
        !d.has_audio
    };

    video_ok && audio_ok
}

/// Build the encoder arguments that normalise `d` into `output`.
///
/// Exactly the first video stream and the first audio stream are mapped. An
/// input without audio gets a generated silent track when the target has
/// audio.
pub fn standardize_args(
    d: &MediaDescriptor,
    target: &TargetProfile,
    encoder: &EncoderSettings,
    container: Container,
    output: &Path,
) -> Vec<String> {
    let mut args = encoder.device_args();
    args.extend(["-i".to_string(), d.path.to_string_lossy().into_owned()]);

    let needs_silence = target.with_audio && !d.has_audio;
    if needs_silence {
        args.extend([
            "-f".to_string(),
            "lavfi".to_string(),
            "-t".to_string(),
            filters::seconds_arg(d.duration),
            "-i".to_string(),
            filters::silent_source(target),
        ]);
    }

    args.extend(["-map".to_string(), "0:v:0".to_string()]);
    if target.with_audio {
        let audio_map = if needs_silence { "1:a:0" } else { "0:a:0" };
        args.extend(["-map".to_string(), audio_map.to_string()]);
    }

    args.extend(["-vf".to_string(), filters::video_chain(target, encoder)]);
    args.extend(encoder.video_args());

    if target.with_audio {
        args.extend(["-af".to_string(), filters::audio_chain(target)]);
        args.extend(encoder.audio_args());
        args.extend([
            "-ar".to_string(),
            target.audio_sample_rate.to_string(),
            "-ac".to_string(),
            target.audio_channels.to_string(),
        ]);
    } else {
        args.push("-an".to_string());
    }

    args.extend(["-f".to_string(), container.muxer().to_string()]);
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Normalises inputs through a [`Transcoder`].
pub struct Standardizer<'a> {
    transcoder: &'a dyn Transcoder,
    encoder: &'a EncoderSettings,
    container: Container,
    progress_interval: Duration,
    progress: ProgressFn,
}

impl<'a> Standardizer<'a> {
    pub fn new(
        transcoder: &'a dyn Transcoder,
        encoder: &'a EncoderSettings,
        container: Container,
        progress_interval: Duration,
        progress: ProgressFn,
    ) -> Self {
        Self {
            transcoder,
            encoder,
            container,
            progress_interval,
            progress,
        }
    }

    /// Standardize input `index` (of `count`) into the workspace.
    ///
    /// # Errors
    ///
    /// [`Error::StandardizationFailure`] if the encoder fails or produces
    /// nothing; [`Error::Cancelled`] if `cancel` fired.
    pub async fn standardize_one(
        &self,
        index: usize,
        count: usize,
        d: &MediaDescriptor,
        target: &TargetProfile,
        workspace: &JobWorkspace,
        cancel: &CancellationToken,
    ) -> cf_core::Result<Standardized> {
        if matches_target(d, target) {
            tracing::debug!(path = %d.path.display(), "input already matches target; passing through");
            return Ok(Standardized::PassThrough(d.path.clone()));
        }

        let output = workspace.intermediate_path(index, self.container);
        let args = standardize_args(d, target, self.encoder, self.container, &output);
        let monitor = ProgressMonitor::new(
            d.duration,
            self.progress_interval,
            format!("standardizing {}/{}", index + 1, count),
            self.progress.clone(),
        );

        tracing::info!(
            path = %d.path.display(),
            from = ?d.resolution(),
            to = ?(target.width, target.height),
            "standardizing input"
        );

        let failure = |diagnostic: String| Error::StandardizationFailure {
            path: d.path.clone(),
            diagnostic,
        };

        let out = match run_monitored(self.transcoder, args, monitor, cancel).await {
            Ok(out) => out,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => return Err(failure(e.to_string())),
        };
        if !out.success {
            tracing::debug!(path = %d.path.display(), "encoder output: {}", out.diagnostic);
            return Err(failure(out.diagnostic));
        }
        match tokio::fs::metadata(&output).await {
            Ok(meta) if meta.len() > 0 => Ok(Standardized::Encoded(output)),
            _ => Err(failure("encoder produced no output".into())),
        }
    }

    /// Standardize every input, at most `parallelism` at a time.
    ///
    /// Results are in input order. The first failure aborts the remaining
    /// work; in-flight encodes are cancelled.
    pub async fn standardize_all(
        &self,
        inputs: &[MediaDescriptor],
        target: &TargetProfile,
        workspace: &JobWorkspace,
        parallelism: usize,
        cancel: &CancellationToken,
    ) -> cf_core::Result<Vec<Standardized>> {
        let batch = cancel.child_token();
        let count = inputs.len();

        let batch = &batch;
        let jobs: Vec<_> = inputs
            .iter()
            .enumerate()
            .map(|(i, d)| async move {
                if batch.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let r = self.standardize_one(i, count, d, target, workspace, batch).await;
                if r.is_err() {
                    batch.cancel();
                }
                r
            })
            .collect();
        let mut results = futures::stream::iter(jobs).buffered(parallelism.max(1));

        let mut done = Vec::with_capacity(count);
        let mut first_error = None;
        while let Some(r) = results.next().await {
            match r {
                Ok(s) => done.push(s),
                // Aborted by the batch token because a sibling failed.
                Err(Error::Cancelled) if !cancel.is_cancelled() => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(done),
        }
    }
}
