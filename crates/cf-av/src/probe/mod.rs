//! Media probing.
//!
//! The [`Prober`] trait is the probing capability the merge engine consumes.
//! [`FfprobeProber`] is the production backend; tests substitute their own.

pub mod ffprobe;

use std::path::Path;

use async_trait::async_trait;
use cf_core::MediaDescriptor;

pub use self::ffprobe::FfprobeProber;

/// Extracts a [`MediaDescriptor`] from a media file.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Short backend name used in logs (e.g. "ffprobe").
    fn name(&self) -> &'static str;

    /// Probe `path`.
    ///
    /// # Errors
    ///
    /// - [`cf_core::Error::InvalidMedia`] if the file has no decodable video
    ///   stream or the backend rejects it.
    /// - [`cf_core::Error::ProbeFailure`] if the backend cannot be invoked or
    ///   returns output that cannot be parsed.
    async fn probe(&self, path: &Path) -> cf_core::Result<MediaDescriptor>;
}
