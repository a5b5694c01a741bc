// Event matching types
// Sample-index events, tolerance windows and confusion counts

use serde::{Deserialize, Serialize};

/// Position of an event within one channel of one record, in samples.
/// Only the index matters; no amplitude or type is attached.
pub type SampleIndex = i64;

/// Inclusive `±radius` sample interval around an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToleranceWindow {
    /// Tolerance in milliseconds as chosen by the operator (or a fixed supplement)
    pub tolerance_ms: u32,

    /// Radius in samples: `floor(tolerance_ms * fs / 1000)`
    pub radius: SampleIndex,
}

impl ToleranceWindow {
    /// Convert a tolerance in milliseconds using a record's sampling frequency
    pub fn from_ms(tolerance_ms: u32, sampling_frequency_hz: u32) -> Self {
        let radius = (tolerance_ms as i64 * sampling_frequency_hz as i64) / 1000;
        ToleranceWindow {
            tolerance_ms,
            radius,
        }
    }

    /// Window expressed directly in samples (tolerance_ms unknown, reported as 0)
    pub fn from_samples(radius: SampleIndex) -> Self {
        ToleranceWindow {
            tolerance_ms: 0,
            radius: radius.max(0),
        }
    }

    /// Bounds of the window around an annotation, both inclusive.
    /// Saturates at the ends of the index range.
    pub fn bounds(&self, annotation: SampleIndex) -> (SampleIndex, SampleIndex) {
        (
            annotation.saturating_sub(self.radius),
            annotation.saturating_add(self.radius),
        )
    }

    /// Whether a detection falls inside the window around an annotation
    pub fn contains(&self, annotation: SampleIndex, detection: SampleIndex) -> bool {
        let (lo, hi) = self.bounds(annotation);
        detection >= lo && detection <= hi
    }
}

/// Confusion counts for one (record, tolerance).
///
/// `true_positive + false_negative` always equals the number of annotations.
/// `false_positive` is `|detections| - true_positive`; with the shared matching
/// policy one detection may confirm several annotations, so it can go negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_positive: i64,
    pub false_positive: i64,
    pub false_negative: i64,
}

impl ConfusionCounts {
    pub fn new(true_positive: i64, false_positive: i64, false_negative: i64) -> Self {
        ConfusionCounts {
            true_positive,
            false_positive,
            false_negative,
        }
    }

    /// Number of annotations these counts were derived from
    pub fn annotation_count(&self) -> i64 {
        self.true_positive + self.false_negative
    }

    /// Combined error count (FP + FN)
    pub fn errors(&self) -> i64 {
        self.false_positive + self.false_negative
    }
}

impl std::ops::Add for ConfusionCounts {
    type Output = ConfusionCounts;

    fn add(self, rhs: ConfusionCounts) -> ConfusionCounts {
        ConfusionCounts {
            true_positive: self.true_positive + rhs.true_positive,
            false_positive: self.false_positive + rhs.false_positive,
            false_negative: self.false_negative + rhs.false_negative,
        }
    }
}

impl std::ops::AddAssign for ConfusionCounts {
    fn add_assign(&mut self, rhs: ConfusionCounts) {
        *self = *self + rhs;
    }
}

/// Result of matching one detection set against one annotation set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub counts: ConfusionCounts,

    /// Signed offsets `detection - annotation`, one per true positive,
    /// in annotation order
    pub delays: Vec<SampleIndex>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_from_ms_floors() {
        // 150 ms at 360 Hz = 54 samples
        assert_eq!(ToleranceWindow::from_ms(150, 360).radius, 54);
        // 25 ms at 128 Hz = 3.2 samples -> 3
        assert_eq!(ToleranceWindow::from_ms(25, 128).radius, 3);
        // 50 ms at 250 Hz = 12.5 samples -> 12
        assert_eq!(ToleranceWindow::from_ms(50, 250).radius, 12);
        assert_eq!(ToleranceWindow::from_ms(0, 360).radius, 0);
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let window = ToleranceWindow::from_samples(5);
        assert!(window.contains(100, 95));
        assert!(window.contains(100, 105));
        assert!(!window.contains(100, 94));
        assert!(!window.contains(100, 106));
    }

    #[test]
    fn test_window_bounds_saturate() {
        let window = ToleranceWindow::from_samples(5);
        assert_eq!(window.bounds(SampleIndex::MAX), (SampleIndex::MAX - 5, SampleIndex::MAX));
        assert_eq!(window.bounds(SampleIndex::MIN), (SampleIndex::MIN, SampleIndex::MIN + 5));
        assert!(window.contains(SampleIndex::MAX, SampleIndex::MAX - 2));
        assert!(!window.contains(SampleIndex::MAX, 0));
    }

    #[test]
    fn test_counts_addition() {
        let mut total = ConfusionCounts::new(2, 1, 1);
        total += ConfusionCounts::new(3, 0, 2);
        assert_eq!(total, ConfusionCounts::new(5, 1, 3));
        assert_eq!(total.annotation_count(), 8);
        assert_eq!(total.errors(), 4);
    }
}
