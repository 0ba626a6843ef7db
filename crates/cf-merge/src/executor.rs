//! Concatenation Executor.
//!
//! Two modes:
//!
//! - **Copy**: a concat demuxer manifest is written into the job workspace
//!   and every stream is stream-copied into the output.
//! - **Filter graph**: every original input is decoded, normalised to the
//!   target profile inside one filter graph, joined with the `concat` filter
//!   and re-encoded in a single pass.
//!
//! Both modes name the muxer explicitly, normalise timestamps and request a
//! streaming-friendly layout. Each invocation runs with its own
//! [`ProgressMonitor`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cf_av::{container_args, genpts_args, zero_start_args, EncoderSettings, JobWorkspace, Transcoder};
use cf_core::{Container, Error, MediaDescriptor, TargetProfile};

use crate::filters;
use crate::progress::{run_monitored, ProgressFn, ProgressMonitor};

/// Executor mode, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Copy,
    FilterGraph,
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => f.write_str("copy"),
            Self::FilterGraph => f.write_str("filter-graph"),
        }
    }
}

/// Render a concat demuxer manifest for `paths`.
///
/// Each path is single-quoted; embedded single quotes are closed, escaped and
/// reopened. Paths containing line breaks cannot be expressed and are
/// rejected.
pub fn render_manifest(paths: &[PathBuf]) -> cf_core::Result<String> {
    let mut manifest = String::from("ffconcat version 1.0\n");
    for path in paths {
        let s = path.to_string_lossy();
        if s.contains('\n') || s.contains('\r') {
            return Err(Error::merge_failed(
                ExecMode::Copy,
                format!("path contains a line break: {s:?}"),
            ));
        }
        manifest.push_str("file '");
        manifest.push_str(&s.replace('\'', r"'\''"));
        manifest.push_str("'\n");
    }
    Ok(manifest)
}

/// Arguments for a copy-mode concatenation of `manifest` into `output`.
pub fn copy_args(manifest: &Path, container: Container, output: &Path) -> Vec<String> {
    let mut args = genpts_args();
    args.extend(
        ["-f", "concat", "-safe", "0", "-i"]
            .into_iter()
            .map(String::from),
    );
    args.push(manifest.to_string_lossy().into_owned());
    args.extend(["-map", "0", "-c", "copy"].into_iter().map(String::from));
    args.extend(zero_start_args());
    args.extend(container_args(container));
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Number of audio tracks the re-encoded output carries.
///
/// With `preserve_all_tracks`, all tracks are kept when every input has the
/// same number of them; otherwise only the first.
pub fn output_audio_tracks(
    inputs: &[MediaDescriptor],
    target: &TargetProfile,
    preserve_all_tracks: bool,
) -> u32 {
    if !target.with_audio {
        return 0;
    }
    if preserve_all_tracks {
        if let Some(first) = inputs.first() {
            let k = first.audio_streams;
            if k > 1 && inputs.iter().all(|d| d.audio_streams == k) {
                return k;
            }
        }
    }
    1
}

/// Arguments for a single-pass filter-graph re-encode of `inputs`.
pub fn filter_graph_args(
    inputs: &[MediaDescriptor],
    target: &TargetProfile,
    encoder: &EncoderSettings,
    container: Container,
    preserve_all_tracks: bool,
    output: &Path,
) -> Vec<String> {
    let tracks = output_audio_tracks(inputs, target, preserve_all_tracks);
    let mut args = encoder.device_args();

    for d in inputs {
        args.extend(genpts_args());
        args.extend(["-i".to_string(), d.path.to_string_lossy().into_owned()]);
    }

    // Silent sources for inputs without audio, indexed after the files.
    let mut silent_index = Vec::with_capacity(inputs.len());
    let mut next_index = inputs.len();
    for d in inputs {
        if tracks > 0 && !d.has_audio {
            args.extend([
                "-f".to_string(),
                "lavfi".to_string(),
                "-t".to_string(),
                filters::seconds_arg(d.duration),
                "-i".to_string(),
                filters::silent_source(target),
            ]);
            silent_index.push(Some(next_index));
            next_index += 1;
        } else {
            silent_index.push(None);
        }
    }

    let video = filters::video_chain(target, encoder);
    let audio = filters::audio_chain(target);
    let mut graph = String::new();
    let mut concat_inputs = String::new();

    for (i, silent) in silent_index.iter().enumerate() {
        graph.push_str(&format!("[{i}:v:0]{video}[v{i}];"));
        concat_inputs.push_str(&format!("[v{i}]"));
        for t in 0..tracks {
            let source = match silent {
                Some(s) => format!("[{s}:a:0]"),
                None => format!("[{i}:a:{t}]"),
            };
            graph.push_str(&format!("{source}{audio}[a{i}_{t}];"));
            concat_inputs.push_str(&format!("[a{i}_{t}]"));
        }
    }

    graph.push_str(&concat_inputs);
    graph.push_str(&format!("concat=n={}:v=1:a={tracks}[outv]", inputs.len()));
    for t in 0..tracks {
        graph.push_str(&format!("[outa{t}]"));
    }

    args.extend(["-filter_complex".to_string(), graph]);
    args.extend(["-map".to_string(), "[outv]".to_string()]);
    for t in 0..tracks {
        args.extend(["-map".to_string(), format!("[outa{t}]")]);
    }

    args.extend(encoder.video_args());
    if tracks > 0 {
        args.extend(encoder.audio_args());
    }
    args.extend(zero_start_args());
    args.extend(container_args(container));
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Runs concatenations through a [`Transcoder`].
pub struct ConcatExecutor<'a> {
    transcoder: &'a dyn Transcoder,
    encoder: &'a EncoderSettings,
    container: Container,
    preserve_all_tracks: bool,
    progress_interval: Duration,
    progress: ProgressFn,
}

impl<'a> ConcatExecutor<'a> {
    pub fn new(
        transcoder: &'a dyn Transcoder,
        encoder: &'a EncoderSettings,
        container: Container,
        preserve_all_tracks: bool,
        progress_interval: Duration,
        progress: ProgressFn,
    ) -> Self {
        Self {
            transcoder,
            encoder,
            container,
            preserve_all_tracks,
            progress_interval,
            progress,
        }
    }

    /// Stream-copy `paths`, in order, into `output`.
    ///
    /// `total_seconds` is the summed input duration used for progress.
    pub async fn run_copy(
        &self,
        workspace: &JobWorkspace,
        paths: &[PathBuf],
        total_seconds: f64,
        output: &Path,
        cancel: &CancellationToken,
    ) -> cf_core::Result<()> {
        let mut absolute = Vec::with_capacity(paths.len());
        for p in paths {
            absolute.push(tokio::fs::canonicalize(p).await.map_err(|e| {
                Error::merge_failed(ExecMode::Copy, format!("cannot resolve {}: {e}", p.display()))
            })?);
        }

        let manifest = workspace.manifest_path("copy");
        tokio::fs::write(&manifest, render_manifest(&absolute)?).await?;

        let args = copy_args(&manifest, self.container, output);
        self.run(ExecMode::Copy, args, total_seconds, "merging", output, cancel)
            .await
    }

    /// Re-encode the original `inputs` into `output` in one pass.
    pub async fn run_filter_graph(
        &self,
        inputs: &[MediaDescriptor],
        target: &TargetProfile,
        output: &Path,
        cancel: &CancellationToken,
    ) -> cf_core::Result<()> {
        let args = filter_graph_args(
            inputs,
            target,
            self.encoder,
            self.container,
            self.preserve_all_tracks,
            output,
        );
        let total: f64 = inputs.iter().map(|d| d.duration).sum();
        self.run(ExecMode::FilterGraph, args, total, "re-encoding", output, cancel)
            .await
    }

    async fn run(
        &self,
        mode: ExecMode,
        args: Vec<String>,
        total_seconds: f64,
        label: &str,
        output: &Path,
        cancel: &CancellationToken,
    ) -> cf_core::Result<()> {
        tracing::info!(mode = %mode, output = %output.display(), "starting concatenation");
        let monitor = ProgressMonitor::new(
            total_seconds,
            self.progress_interval,
            label,
            self.progress.clone(),
        );

        let out = match run_monitored(self.transcoder, args, monitor, cancel).await {
            Ok(out) => out,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => return Err(Error::merge_failed(mode, e.to_string())),
        };

        if !out.success {
            tracing::debug!(mode = %mode, exit_code = ?out.exit_code, "encoder output: {}", out.diagnostic);
            return Err(Error::merge_failed(mode, out.diagnostic));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(Error::merge_failed(mode, "output file is empty")),
            Err(_) => Err(Error::merge_failed(mode, "output file was not created")),
        }
    }
}
