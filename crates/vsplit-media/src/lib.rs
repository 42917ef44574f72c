//! FFmpeg CLI wrapper for media splitting.
//!
//! This crate provides:
//! - Source probing via ffprobe
//! - An FFmpeg command builder and runner with timeout
//! - Split-plan computation for all split methods
//! - Per-segment encoding

pub mod command;
pub mod error;
pub mod plan;
pub mod probe;
pub mod split;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use plan::{compute_plan, PlannedSegment, SplitPlan};
pub use probe::{probe_media, MediaInfo};
pub use split::SegmentEncoder;
