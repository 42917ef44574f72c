//! Split-plan computation.
//!
//! A plan assigns every output part its index, start, and end before any
//! encoding happens. Indexes are stable across retries, which is what makes
//! redelivered work idempotent.

use vsplit_models::SplitConfig;

use crate::error::{MediaError, MediaResult};

/// Tolerance for floating-point boundary comparisons.
const BOUNDARY_EPSILON: f64 = 1e-6;

/// One planned output segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedSegment {
    /// 0-based part index
    pub index: u32,
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds
    pub end: f64,
}

impl PlannedSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// The full split plan for a job.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPlan {
    pub segments: Vec<PlannedSegment>,
}

impl SplitPlan {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_parts(&self) -> u32 {
        self.segments.len() as u32
    }
}

/// Compute the split plan for a source of known duration.
///
/// Intervals and keyframes share the same boundary math: fixed-size
/// segments from zero, final segment shorter when the duration is not an
/// exact multiple. Explicit ranges are used verbatim.
pub fn compute_plan(config: &SplitConfig, source_duration: f64) -> MediaResult<SplitPlan> {
    if !source_duration.is_finite() || source_duration <= 0.0 {
        return Err(MediaError::invalid_plan(format!(
            "source duration {} is not positive",
            source_duration
        )));
    }

    config
        .validate()
        .map_err(|e| MediaError::invalid_plan(e.to_string()))?;

    let segments = match config {
        SplitConfig::Intervals { interval_duration } => {
            fixed_segments(source_duration, *interval_duration)
        }
        SplitConfig::Keyframes { interval } => fixed_segments(source_duration, *interval),
        SplitConfig::ExplicitRanges { ranges } => ranges
            .iter()
            .enumerate()
            .map(|(i, r)| PlannedSegment {
                index: i as u32,
                start: r.start,
                end: r.end,
            })
            .collect(),
    };

    if segments.is_empty() {
        return Err(MediaError::invalid_plan("plan produced no segments"));
    }

    Ok(SplitPlan { segments })
}

fn fixed_segments(duration: f64, interval: f64) -> Vec<PlannedSegment> {
    let mut segments = Vec::new();
    let mut start = 0.0;
    let mut index = 0u32;

    while start < duration - BOUNDARY_EPSILON {
        let end = (start + interval).min(duration);
        segments.push(PlannedSegment { index, start, end });
        start = end;
        index += 1;
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsplit_models::TimeRange;

    fn intervals(duration: f64) -> SplitConfig {
        SplitConfig::Intervals {
            interval_duration: duration,
        }
    }

    #[test]
    fn interval_count_is_ceil_of_duration_over_interval() {
        let plan = compute_plan(&intervals(300.0), 1000.0).unwrap();
        assert_eq!(plan.len(), 4); // ceil(1000/300)
        assert!((plan.segments[3].duration() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let plan = compute_plan(&intervals(300.0), 900.0).unwrap();
        assert_eq!(plan.len(), 3);
        assert!((plan.segments[2].end - 900.0).abs() < 1e-6);
        assert!((plan.segments[2].duration() - 300.0).abs() < 1e-6);
    }

    #[test]
    fn short_source_yields_single_segment() {
        let plan = compute_plan(&intervals(300.0), 100.0).unwrap();
        assert_eq!(plan.len(), 1);
        assert!((plan.segments[0].duration() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn interval_segments_cover_source_without_gaps_or_overlaps() {
        let plan = compute_plan(&intervals(7.5), 100.0).unwrap();

        assert!((plan.segments[0].start).abs() < 1e-9);
        for pair in plan.segments.windows(2) {
            assert!((pair[0].end - pair[1].start).abs() < 1e-9);
        }
        assert!((plan.segments.last().unwrap().end - 100.0).abs() < 1e-9);

        let indices: Vec<u32> = plan.segments.iter().map(|s| s.index).collect();
        let expected: Vec<u32> = (0..plan.total_parts()).collect();
        assert_eq!(indices, expected);
    }

    #[test]
    fn keyframe_boundaries_match_interval_math() {
        let by_keyframes = compute_plan(&SplitConfig::Keyframes { interval: 60.0 }, 250.0).unwrap();
        let by_intervals = compute_plan(&intervals(60.0), 250.0).unwrap();
        assert_eq!(by_keyframes, by_intervals);
    }

    #[test]
    fn explicit_ranges_are_used_verbatim() {
        let config = SplitConfig::ExplicitRanges {
            ranges: vec![TimeRange::new(10.0, 20.0), TimeRange::new(15.0, 40.0)],
        };
        let plan = compute_plan(&config, 100.0).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.segments[0].index, 0);
        assert!((plan.segments[0].start - 10.0).abs() < 1e-9);
        assert!((plan.segments[1].end - 40.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_inputs_are_invalid_plans() {
        assert!(matches!(
            compute_plan(&intervals(300.0), 0.0),
            Err(MediaError::InvalidPlan(_))
        ));
        assert!(matches!(
            compute_plan(&intervals(0.0), 100.0),
            Err(MediaError::InvalidPlan(_))
        ));
        let config = SplitConfig::ExplicitRanges {
            ranges: vec![TimeRange::new(20.0, 10.0)],
        };
        assert!(matches!(
            compute_plan(&config, 100.0),
            Err(MediaError::InvalidPlan(_))
        ));
    }

    #[test]
    fn near_boundary_float_noise_does_not_create_empty_segment() {
        let plan = compute_plan(&intervals(0.1), 0.30000000000000004).unwrap();
        assert_eq!(plan.len(), 3);
    }
}
