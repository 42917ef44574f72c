//! Split method configuration.
//!
//! The wire shape is `{"method": "...", "parameters": {...}}`, mapped onto
//! a tagged enum so every consumer matches exhaustively instead of
//! dispatching on strings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the source media is cut into parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "method", content = "parameters", rename_all = "snake_case")]
pub enum SplitConfig {
    /// Fixed-duration segments; the final segment may be shorter.
    Intervals { interval_duration: f64 },
    /// Re-encode forcing a keyframe every `interval` seconds so cuts are
    /// frame-accurate at the interval boundaries.
    Keyframes { interval: f64 },
    /// Caller-supplied ordered (start, end) pairs, used verbatim.
    ExplicitRanges { ranges: Vec<TimeRange> },
}

/// A half-open time range in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Validation failures for a split configuration.
#[derive(Debug, Error, PartialEq)]
pub enum SplitValidationError {
    #[error("{name} must be strictly positive, got {value}")]
    NonPositiveParameter { name: &'static str, value: f64 },

    #[error("explicit_ranges requires at least one range")]
    EmptyRanges,

    #[error("range {index} is invalid: start {start} must be before end {end}")]
    InvalidRange { index: usize, start: f64, end: f64 },
}

impl SplitConfig {
    /// The wire name of the split method.
    pub fn method_name(&self) -> &'static str {
        match self {
            SplitConfig::Intervals { .. } => "intervals",
            SplitConfig::Keyframes { .. } => "keyframes",
            SplitConfig::ExplicitRanges { .. } => "explicit_ranges",
        }
    }

    /// Validate numeric parameters and range ordering.
    pub fn validate(&self) -> Result<(), SplitValidationError> {
        match self {
            SplitConfig::Intervals { interval_duration } => {
                if !interval_duration.is_finite() || *interval_duration <= 0.0 {
                    return Err(SplitValidationError::NonPositiveParameter {
                        name: "interval_duration",
                        value: *interval_duration,
                    });
                }
            }
            SplitConfig::Keyframes { interval } => {
                if !interval.is_finite() || *interval <= 0.0 {
                    return Err(SplitValidationError::NonPositiveParameter {
                        name: "interval",
                        value: *interval,
                    });
                }
            }
            SplitConfig::ExplicitRanges { ranges } => {
                if ranges.is_empty() {
                    return Err(SplitValidationError::EmptyRanges);
                }
                for (index, range) in ranges.iter().enumerate() {
                    if !range.start.is_finite()
                        || !range.end.is_finite()
                        || range.start < 0.0
                        || range.start >= range.end
                    {
                        return Err(SplitValidationError::InvalidRange {
                            index,
                            start: range.start,
                            end: range.end,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Container format for output parts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Mkv,
    Webm,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mkv => "mkv",
            OutputFormat::Webm => "webm",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Mkv => "video/x-matroska",
            OutputFormat::Webm => "video/webm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_uses_method_and_parameters() {
        let config = SplitConfig::Intervals {
            interval_duration: 300.0,
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["method"], "intervals");
        assert_eq!(json["parameters"]["interval_duration"], 300.0);

        let decoded: SplitConfig = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn explicit_ranges_roundtrip() {
        let json = serde_json::json!({
            "method": "explicit_ranges",
            "parameters": { "ranges": [{"start": 0.0, "end": 10.5}, {"start": 20.0, "end": 30.0}] }
        });
        let config: SplitConfig = serde_json::from_value(json).unwrap();
        match &config {
            SplitConfig::ExplicitRanges { ranges } => {
                assert_eq!(ranges.len(), 2);
                assert!((ranges[0].duration() - 10.5).abs() < f64::EPSILON);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_method_is_rejected() {
        let json = serde_json::json!({ "method": "by_scene", "parameters": {} });
        assert!(serde_json::from_value::<SplitConfig>(json).is_err());
    }

    #[test]
    fn validate_rejects_non_positive_parameters() {
        let config = SplitConfig::Intervals {
            interval_duration: 0.0,
        };
        assert!(matches!(
            config.validate(),
            Err(SplitValidationError::NonPositiveParameter { name: "interval_duration", .. })
        ));

        let config = SplitConfig::Keyframes { interval: -5.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_ranges() {
        let config = SplitConfig::ExplicitRanges { ranges: vec![] };
        assert_eq!(config.validate(), Err(SplitValidationError::EmptyRanges));

        let config = SplitConfig::ExplicitRanges {
            ranges: vec![TimeRange::new(10.0, 10.0)],
        };
        assert!(matches!(
            config.validate(),
            Err(SplitValidationError::InvalidRange { index: 0, .. })
        ));

        let config = SplitConfig::ExplicitRanges {
            ranges: vec![TimeRange::new(-1.0, 5.0)],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_configs_pass() {
        assert!(SplitConfig::Intervals {
            interval_duration: 300.0
        }
        .validate()
        .is_ok());
        assert!(SplitConfig::ExplicitRanges {
            ranges: vec![TimeRange::new(0.0, 10.0), TimeRange::new(5.0, 8.0)]
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn output_format_defaults_to_mp4() {
        assert_eq!(OutputFormat::default(), OutputFormat::Mp4);
        assert_eq!(OutputFormat::Webm.extension(), "webm");
        assert_eq!(OutputFormat::Mkv.content_type(), "video/x-matroska");
    }
}
