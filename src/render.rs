//! Terminal rendering for progress updates and results.

use cf_merge::{MergeResult, ProgressUpdate};

/// Format seconds as `HH:MM:SS`.
pub fn clock(seconds: f64) -> String {
    let secs = seconds.max(0.0).round() as u64;
    let mins = secs / 60;
    let hours = mins / 60;
    format!("{:02}:{:02}:{:02}", hours, mins % 60, secs % 60)
}

/// One-line progress summary, e.g. `merging   42.0%  1.8x  ETA 00:01:05`.
pub fn progress_line(update: &ProgressUpdate) -> String {
    let eta = match update.eta_seconds {
        Some(s) => format!("ETA {}", clock(s)),
        None => "ETA --:--:--".to_string(),
    };
    format!(
        "{:<12} {:>5.1}%  {:.1}x  {}",
        update.stage_label,
        update.fraction * 100.0,
        update.speed,
        eta
    )
}

/// Human-readable summary of a finished job.
pub fn result_summary(result: &MergeResult) -> String {
    match result {
        MergeResult::Done {
            output_path,
            strategy,
            fallback_used,
        } => {
            let mut s = format!("Merged into {}\nStrategy: {}", output_path.display(), strategy);
            if *fallback_used {
                s.push_str(" (after fallback)");
            }
            s
        }
        MergeResult::Failed {
            failed_stage,
            error_kind,
            message,
            ..
        } => format!("Merge failed during {failed_stage} [{error_kind}]: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::{ErrorKind, MergeStrategy};
    use cf_merge::JobState;
    use std::path::PathBuf;

    #[test]
    fn clock_format() {
        assert_eq!(clock(0.0), "00:00:00");
        assert_eq!(clock(65.4), "00:01:05");
        assert_eq!(clock(3725.0), "01:02:05");
        assert_eq!(clock(-3.0), "00:00:00");
    }

    #[test]
    fn progress_line_with_and_without_eta() {
        let mut u = ProgressUpdate {
            fraction: 0.42,
            speed: 1.8,
            eta_seconds: Some(65.0),
            stage_label: "merging".into(),
        };
        assert_eq!(progress_line(&u), "merging       42.0%  1.8x  ETA 00:01:05");

        u.eta_seconds = None;
        assert!(progress_line(&u).ends_with("ETA --:--:--"));
    }

    #[test]
    fn summaries() {
        let done = MergeResult::Done {
            output_path: PathBuf::from("/w/a1b2c3d4/trip.mkv"),
            strategy: MergeStrategy::FullReencode,
            fallback_used: true,
        };
        let s = result_summary(&done);
        assert!(s.contains("/w/a1b2c3d4/trip.mkv"));
        assert!(s.contains("(after fallback)"));

        let failed = MergeResult::Failed {
            failed_stage: JobState::Standardize,
            error_kind: ErrorKind::StandardizationFailure,
            message: "standardization failed for b.mp4".into(),
            diagnostic: Some("x264 [error]: broken".into()),
        };
        let s = result_summary(&failed);
        assert!(s.starts_with("Merge failed during standardize [standardization_failure]"));
        assert!(!s.contains("x264"));
    }
}
