//! ffmpeg filter expressions shared by the Standardizer and the filter-graph
//! executor.

use cf_av::EncoderSettings;
use cf_core::TargetProfile;

/// Channel layout name accepted by ffmpeg for `channels`.
pub fn channel_layout(channels: u32) -> String {
    match channels {
        1 => "mono".into(),
        2 => "stereo".into(),
        6 => "5.1".into(),
        8 => "7.1".into(),
        n => format!("{n}c"),
    }
}

/// Scale to fit inside the target while keeping aspect ratio, pad to the
/// exact target size (centered), then force frame rate and pixel format.
pub fn video_chain(target: &TargetProfile, encoder: &EncoderSettings) -> String {
    let (w, h) = (target.width, target.height);
    let mut chain = format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,\
         fps={fps},format={pix}",
        fps = target.frame_rate,
        pix = target.pixel_format,
    );
    if let Some(upload) = encoder.upload_filter() {
        chain.push(',');
        chain.push_str(upload);
    }
    chain
}

/// Resample and remix audio to the target rate and layout.
pub fn audio_chain(target: &TargetProfile) -> String {
    format!(
        "aresample={rate},aformat=sample_fmts=fltp:sample_rates={rate}:channel_layouts={layout}",
        rate = target.audio_sample_rate,
        layout = channel_layout(target.audio_channels),
    )
}

/// `lavfi` source producing silence in the target audio format.
pub fn silent_source(target: &TargetProfile) -> String {
    format!(
        "anullsrc=channel_layout={}:sample_rate={}",
        channel_layout(target.audio_channels),
        target.audio_sample_rate
    )
}

/// Format a duration for `-t`.
pub fn seconds_arg(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}
