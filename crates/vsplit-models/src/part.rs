//! Output part metadata and deterministic naming.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::split::OutputFormat;

/// One output segment produced by splitting the source media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Part {
    /// 0-based index assigned at split-plan time
    pub index: u32,
    /// Output filename
    pub filename: String,
    /// Segment duration in seconds
    pub duration: f64,
    /// Size in bytes
    pub size: u64,
    /// Blob-store key of the output object
    pub output_reference: String,
}

impl Part {
    pub fn new(
        index: u32,
        filename: impl Into<String>,
        duration: f64,
        size: u64,
        output_reference: impl Into<String>,
    ) -> Self {
        Self {
            index,
            filename: filename.into(),
            duration,
            size,
            output_reference: output_reference.into(),
        }
    }
}

/// Derive the deterministic filename for a part.
///
/// The name depends only on (job_id, index, format), so re-processing a
/// redelivered WorkItem overwrites the same object instead of duplicating it.
pub fn part_filename(job_id: &JobId, index: u32, format: OutputFormat) -> String {
    format!("{}_part_{:03}.{}", job_id, index, format.extension())
}

/// Derive the blob-store key a part is written to.
pub fn output_key(output_prefix: &str, filename: &str) -> String {
    format!("{}/{}", output_prefix.trim_end_matches('/'), filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_zero_padded() {
        let id = JobId::from_string("abc-123");
        assert_eq!(
            part_filename(&id, 0, OutputFormat::Mp4),
            "abc-123_part_000.mp4"
        );
        assert_eq!(
            part_filename(&id, 42, OutputFormat::Mkv),
            "abc-123_part_042.mkv"
        );
        // indices past the pad width keep their full value
        assert_eq!(
            part_filename(&id, 1234, OutputFormat::Mp4),
            "abc-123_part_1234.mp4"
        );
    }

    #[test]
    fn filename_is_deterministic() {
        let id = JobId::from_string("abc-123");
        assert_eq!(
            part_filename(&id, 7, OutputFormat::Mp4),
            part_filename(&id, 7, OutputFormat::Mp4)
        );
    }

    #[test]
    fn output_key_joins_prefix() {
        assert_eq!(output_key("outputs/abc", "f.mp4"), "outputs/abc/f.mp4");
        assert_eq!(output_key("outputs/abc/", "f.mp4"), "outputs/abc/f.mp4");
    }
}
