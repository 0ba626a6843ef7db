//! Compatibility Analyzer: decides how a set of inputs can be merged.
//!
//! Every input is compared against the first one on the critical field set.
//! Identical inputs are stream-copied; anything else is standardized to a
//! [`TargetProfile`] first. The analyzer never selects
//! [`MergeStrategy::FullReencode`]; that is only reached through the
//! orchestrator's fallback.

use std::collections::BTreeSet;

use cf_core::config::TargetConfig;
use cf_core::{
    CompatibilityVerdict, CriticalField, Error, MediaDescriptor, MergeStrategy, TargetProfile,
};

/// Frame rates closer than this are considered equal.
pub const FRAME_RATE_TOLERANCE: f64 = 0.1;

/// Analyze `inputs` and pick a strategy.
///
/// # Errors
///
/// [`Error::Validation`] if fewer than two inputs are supplied.
pub fn analyze(
    inputs: &[MediaDescriptor],
    target: &TargetConfig,
) -> cf_core::Result<CompatibilityVerdict> {
    if inputs.len() < 2 {
        return Err(Error::Validation(format!(
            "at least two inputs are required, got {}",
            inputs.len()
        )));
    }

    let mismatched_fields = mismatched_fields(inputs);
    if mismatched_fields.is_empty() {
        return Ok(CompatibilityVerdict {
            strategy: MergeStrategy::FastConcat,
            mismatched_fields,
            target_profile: None,
        });
    }

    Ok(CompatibilityVerdict {
        strategy: MergeStrategy::Standardize,
        mismatched_fields,
        target_profile: Some(derive_target(inputs, target)),
    })
}

/// Critical fields on which some input differs from the first.
pub fn mismatched_fields(inputs: &[MediaDescriptor]) -> BTreeSet<CriticalField> {
    let Some((reference, rest)) = inputs.split_first() else {
        return BTreeSet::new();
    };

    CriticalField::ALL
        .into_iter()
        .filter(|&field| rest.iter().any(|d| !field_matches(field, reference, d)))
        .collect()
}

fn field_matches(field: CriticalField, a: &MediaDescriptor, b: &MediaDescriptor) -> bool {
    match field {
        CriticalField::Width => a.width == b.width,
        CriticalField::Height => a.height == b.height,
        CriticalField::FrameRate => (a.frame_rate - b.frame_rate).abs() <= FRAME_RATE_TOLERANCE,
        CriticalField::VideoCodec => a.video_codec == b.video_codec,
        CriticalField::AudioCodec => a.audio_codec == b.audio_codec,
        CriticalField::PixelFormat => a.pixel_format == b.pixel_format,
        CriticalField::AudioSampleRate => a.audio_sample_rate == b.audio_sample_rate,
        CriticalField::AudioChannels => a.audio_channels == b.audio_channels,
    }
}

/// Build the target profile for `inputs`.
///
/// The resolution is the most frequent one among the inputs. Ties go to the
/// larger frame, then to whichever was seen first. Everything else comes
/// from `cfg`. The output carries audio if any input does.
pub fn derive_target(inputs: &[MediaDescriptor], cfg: &TargetConfig) -> TargetProfile {
    let (width, height) = mode_resolution(inputs).unwrap_or((2, 2));
    TargetProfile::new(
        width,
        height,
        cfg.frame_rate,
        cfg.pixel_format.clone(),
        cfg.audio_sample_rate,
        cfg.audio_channels,
        inputs.iter().any(|d| d.has_audio),
    )
}

fn mode_resolution(inputs: &[MediaDescriptor]) -> Option<(u32, u32)> {
    // (resolution, count) in first-seen order.
    let mut counts: Vec<((u32, u32), usize)> = Vec::new();
    for d in inputs {
        let res = d.resolution();
        match counts.iter_mut().find(|(r, _)| *r == res) {
            Some((_, n)) => *n += 1,
            None => counts.push((res, 1)),
        }
    }

    let area = |(w, h): (u32, u32)| u64::from(w) * u64::from(h);
    let mut best: Option<((u32, u32), usize)> = None;
    for (res, n) in counts {
        // Strict comparisons keep the earliest resolution on a full tie.
        let better = match best {
            None => true,
            Some((r, m)) => n > m || (n == m && area(res) > area(r)),
        };
        if better {
            best = Some((res, n));
        }
    }
    best.map(|(res, _)| res)
}
