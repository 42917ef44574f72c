//! Per-segment encoding for each split method.

use std::path::Path;
use std::time::Duration;
use tracing::info;

use vsplit_models::{EncodingConfig, SplitConfig};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::plan::PlannedSegment;

/// Encodes planned segments, choosing the FFmpeg strategy per split method.
///
/// - `intervals`: stream copy. Cuts land on existing keyframes; fast and
///   lossless.
/// - `keyframes`: re-encode, forcing a keyframe every `interval` seconds so
///   segment boundaries are frame-accurate.
/// - `explicit_ranges`: re-encode for accurate cuts at arbitrary offsets.
#[derive(Debug, Clone)]
pub struct SegmentEncoder {
    encoding: EncodingConfig,
}

impl SegmentEncoder {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self { encoding }
    }

    /// Build the FFmpeg command for one planned segment.
    ///
    /// `fps` is the probed source frame rate, used to size the GOP for the
    /// keyframes method (group size = interval x frame rate).
    pub fn command_for(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        config: &SplitConfig,
        segment: &PlannedSegment,
        fps: f64,
    ) -> FfmpegCommand {
        let base = FfmpegCommand::new(input, output)
            .seek(segment.start)
            .duration(segment.duration());

        match config {
            SplitConfig::Intervals { .. } => base.codec_copy(),
            SplitConfig::Keyframes { interval } => {
                let gop = (interval * fps).round().max(1.0) as u32;
                base.output_args(self.encoding.to_ffmpeg_args())
                    .force_key_frames(format!("expr:gte(t,n_forced*{})", interval))
                    .gop(gop)
            }
            SplitConfig::ExplicitRanges { .. } => base.output_args(self.encoding.to_ffmpeg_args()),
        }
    }

    /// Encode one segment to the output path.
    pub async fn encode_segment(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        config: &SplitConfig,
        segment: &PlannedSegment,
        fps: f64,
        timeout: Duration,
    ) -> MediaResult<()> {
        let input = input.as_ref();
        let output = output.as_ref();

        info!(
            index = segment.index,
            start = segment.start,
            end = segment.end,
            method = config.method_name(),
            "Encoding segment {} -> {}",
            input.display(),
            output.display()
        );

        let cmd = self.command_for(input, output, config, segment, fps);
        FfmpegRunner::new().with_timeout(timeout).run(&cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsplit_models::TimeRange;

    fn encoder() -> SegmentEncoder {
        SegmentEncoder::new(EncodingConfig::default())
    }

    fn segment() -> PlannedSegment {
        PlannedSegment {
            index: 0,
            start: 60.0,
            end: 120.0,
        }
    }

    #[test]
    fn intervals_stream_copy() {
        let config = SplitConfig::Intervals {
            interval_duration: 60.0,
        };
        let args = encoder()
            .command_for("in.mkv", "out.mp4", &config, &segment(), 30.0)
            .build_args();

        assert!(args.contains(&"copy".to_string()));
        assert!(!args.contains(&"-force_key_frames".to_string()));
        assert!(args.contains(&"60.000".to_string()));
    }

    #[test]
    fn keyframes_forces_gop_from_fps() {
        let config = SplitConfig::Keyframes { interval: 60.0 };
        let args = encoder()
            .command_for("in.mkv", "out.mp4", &config, &segment(), 29.97)
            .build_args();

        assert!(args.contains(&"-force_key_frames".to_string()));
        assert!(args.contains(&"expr:gte(t,n_forced*60)".to_string()));
        assert!(args.contains(&"-g".to_string()));
        // 60 * 29.97 rounds to 1798
        assert!(args.contains(&"1798".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(!args.contains(&"copy".to_string()));
    }

    #[test]
    fn explicit_ranges_reencode_without_forced_keyframes() {
        let config = SplitConfig::ExplicitRanges {
            ranges: vec![TimeRange::new(60.0, 120.0)],
        };
        let args = encoder()
            .command_for("in.mkv", "out.mp4", &config, &segment(), 30.0)
            .build_args();

        assert!(args.contains(&"libx264".to_string()));
        assert!(!args.contains(&"-force_key_frames".to_string()));
        assert!(!args.contains(&"copy".to_string()));
    }
}
