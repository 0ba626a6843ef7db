//! Per-job working directory.
//!
//! A [`JobWorkspace`] owns one directory under the configured work root.
//! Everything a merge job writes (standardized intermediates, concat
//! manifests, the output) lives inside it, so cleanup can be expressed as
//! "remove everything here except the verified output".

use std::path::{Path, PathBuf};

use cf_core::{Container, JobId};

/// Name used when the caller's hint sanitizes to nothing.
const DEFAULT_OUTPUT_STEM: &str = "merged";

/// Maximum length of the output file stem.
const MAX_STEM_LEN: usize = 120;

/// Leading marker of every working file in a job directory.
const WORK_PREFIX: char = '.';

/// Working directory for a single merge job.
///
/// # Example
///
/// ```no_run
/// use cf_av::JobWorkspace;
/// use cf_core::{Container, JobId};
///
/// let mut ws = JobWorkspace::create(std::path::Path::new("./downloads"), JobId::new()).unwrap();
/// let out = ws.output_path("holiday", Container::Mkv);
/// // ... produce and verify `out` ...
/// ws.cleanup(Some(&out)).unwrap();
/// ```
#[derive(Debug)]
pub struct JobWorkspace {
    dir: PathBuf,
    cleaned: bool,
}

impl JobWorkspace {
    /// Create the job directory `<work_root>/<short job id>`.
    ///
    /// Falls back to the full id if the short name is already taken.
    pub fn create(work_root: &Path, job_id: JobId) -> cf_core::Result<Self> {
        std::fs::create_dir_all(work_root)?;

        let short = work_root.join(job_id.short());
        let dir = match std::fs::create_dir(&short) {
            Ok(()) => short,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let full = work_root.join(job_id.to_string());
                std::fs::create_dir(&full)?;
                full
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(job_id = %job_id, dir = %dir.display(), "created job workspace");
        Ok(Self { dir, cleaned: false })
    }

    /// Path to the job directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the standardized copy of input `index`.
    pub fn intermediate_path(&self, index: usize, container: Container) -> PathBuf {
        self.dir
            .join(format!("{WORK_PREFIX}std_{index:03}.{}", container.extension()))
    }

    /// Path of the concat demuxer manifest for `attempt`.
    pub fn manifest_path(&self, attempt: &str) -> PathBuf {
        self.dir.join(format!("{WORK_PREFIX}concat_{attempt}.txt"))
    }

    /// Path of the merged output, named after the caller's hint.
    ///
    /// A sanitized stem never starts with [`WORK_PREFIX`], so the output
    /// cannot land on a working file.
    pub fn output_path(&self, hint: &str, container: Container) -> PathBuf {
        self.dir.join(format!(
            "{}.{}",
            sanitize_stem(hint, container),
            container.extension()
        ))
    }

    /// Remove everything in the job directory except `keep`.
    ///
    /// With `keep = None` the directory itself is removed too. Runs at most
    /// once; later calls are no-ops. Individual removal failures are logged
    /// and the first one is returned after every entry has been attempted.
    pub fn cleanup(&mut self, keep: Option<&Path>) -> cf_core::Result<()> {
        if self.cleaned {
            return Ok(());
        }
        self.cleaned = true;

        let Some(keep) = keep else {
            return match std::fs::remove_dir_all(&self.dir) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => {
                    tracing::warn!(dir = %self.dir.display(), "failed to remove job workspace: {e}");
                    Err(e.into())
                }
            };
        };

        let mut first_error = None;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path == keep {
                continue;
            }
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = removed {
                tracing::warn!(path = %path.display(), "failed to remove intermediate: {e}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Whether [`JobWorkspace::cleanup`] has run.
    pub fn is_cleaned(&self) -> bool {
        self.cleaned
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if !self.cleaned {
            tracing::warn!(dir = %self.dir.display(), "job workspace dropped without cleanup; removing");
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}

/// Turn a caller-supplied name hint into a safe file stem.
pub fn sanitize_stem(hint: &str, container: Container) -> String {
    let hint = hint.trim();
    let hint = hint
        .strip_suffix(&format!(".{}", container.extension()))
        .unwrap_or(hint);

    let stem: String = hint
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();
    let stem = stem.trim().trim_start_matches(WORK_PREFIX).to_string();

    if stem.is_empty() {
        DEFAULT_OUTPUT_STEM.to_string()
    } else {
        stem
    }
}
