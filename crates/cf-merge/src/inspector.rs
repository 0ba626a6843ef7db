//! Stream Inspector: per-file metadata extraction.

use std::path::{Path, PathBuf};

use cf_av::Prober;
use cf_core::{Error, ErrorKind, MediaDescriptor};

/// Extracts [`MediaDescriptor`]s through a [`Prober`].
pub struct Inspector<'a> {
    prober: &'a dyn Prober,
}

impl<'a> Inspector<'a> {
    pub fn new(prober: &'a dyn Prober) -> Self {
        Self { prober }
    }

    /// Inspect a single file.
    ///
    /// Missing, non-regular, and zero-byte files are rejected as
    /// [`Error::InvalidMedia`] before the prober is invoked.
    pub async fn inspect(&self, path: &Path) -> cf_core::Result<MediaDescriptor> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::invalid_media(path, "file not found"));
            }
            Err(e) => return Err(Error::invalid_media(path, format!("unreadable: {e}"))),
        };
        if !meta.is_file() {
            return Err(Error::invalid_media(path, "not a regular file"));
        }
        if meta.len() == 0 {
            return Err(Error::invalid_media(path, "file is empty"));
        }

        let mut descriptor = self.prober.probe(path).await.map_err(|e| match e.kind() {
            ErrorKind::InvalidMedia | ErrorKind::ProbeFailure | ErrorKind::Cancelled => e,
            _ => Error::probe_failure(path, e.to_string()),
        })?;

        if descriptor.file_size == 0 {
            descriptor.file_size = meta.len();
        }

        tracing::debug!(
            path = %path.display(),
            width = descriptor.width,
            height = descriptor.height,
            fps = descriptor.frame_rate,
            video_codec = %descriptor.video_codec,
            audio_codec = ?descriptor.audio_codec,
            "inspected input"
        );
        Ok(descriptor)
    }

    /// Inspect every file concurrently, preserving input order.
    ///
    /// Fails with the first error encountered.
    pub async fn inspect_all(&self, paths: &[PathBuf]) -> cf_core::Result<Vec<MediaDescriptor>> {
        futures::future::try_join_all(paths.iter().map(|p| self.inspect(p))).await
    }
}
