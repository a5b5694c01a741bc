// Multi-tolerance evaluator
// Runs the matcher at the operator tolerance and the two fixed supplements

use serde::{Deserialize, Serialize};

use crate::events::{EventMatcher, SampleIndex, ToleranceWindow};
use crate::report::RecordReport;

/// Supplementary tolerances evaluated alongside the operator's choice (ms)
pub const SUPPLEMENTARY_TOLERANCES_MS: [u32; 2] = [25, 50];

/// Upper bound accepted for the operator tolerance (ms)
pub const MAX_TOLERANCE_MS: u32 = 1000;

/// The three tolerance windows of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tolerances(pub [ToleranceWindow; 3]);

impl Tolerances {
    /// Operator tolerance followed by the 25 ms and 50 ms supplements,
    /// each converted with the record's own sampling frequency
    pub fn for_record(tolerance_ms: u32, sampling_frequency_hz: u32) -> Self {
        let [sup1, sup2] = SUPPLEMENTARY_TOLERANCES_MS;
        Tolerances([
            ToleranceWindow::from_ms(tolerance_ms, sampling_frequency_hz),
            ToleranceWindow::from_ms(sup1, sampling_frequency_hz),
            ToleranceWindow::from_ms(sup2, sampling_frequency_hz),
        ])
    }

    /// Tolerances in milliseconds, in evaluation order
    pub fn milliseconds(&self) -> [u32; 3] {
        [
            self.0[0].tolerance_ms,
            self.0[1].tolerance_ms,
            self.0[2].tolerance_ms,
        ]
    }

    pub fn windows(&self) -> &[ToleranceWindow; 3] {
        &self.0
    }
}

/// Result of one record at one tolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceResult {
    pub window: ToleranceWindow,
    pub report: RecordReport,
    pub delays: Vec<SampleIndex>,

    /// Kept apart from the row because the global scores need summed TP
    pub true_positive: i64,
}

/// Results of one record at all three tolerances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEvaluation {
    pub record_id: String,
    pub results: [ToleranceResult; 3],
}

impl RecordEvaluation {
    pub fn true_positives(&self) -> [i64; 3] {
        [
            self.results[0].true_positive,
            self.results[1].true_positive,
            self.results[2].true_positive,
        ]
    }
}

/// Evaluate one record at three tolerances.
///
/// Each tolerance is matched independently. Undefined percentages (for instance
/// F(%) of a record without annotations) are left empty in the row and logged;
/// they never abort the evaluation.
pub fn evaluate_record(
    record_id: &str,
    detections: &[SampleIndex],
    annotations: &[SampleIndex],
    tolerances: &Tolerances,
    matcher: &EventMatcher,
) -> RecordEvaluation {
    let beat_count = annotations.len() as i64;

    let results = tolerances.0.map(|window| {
        let outcome = matcher.match_events(detections, annotations, window);
        let report = RecordReport::from_counts(record_id, beat_count, &outcome.counts);

        for metric in report.undefined_metrics() {
            log::warn!(
                "Record {} at {} ms: {} is undefined (TP={}, FP={}, FN={})",
                record_id,
                window.tolerance_ms,
                metric,
                outcome.counts.true_positive,
                outcome.counts.false_positive,
                outcome.counts.false_negative
            );
        }

        ToleranceResult {
            window,
            report,
            delays: outcome.delays,
            true_positive: outcome.counts.true_positive,
        }
    });

    RecordEvaluation {
        record_id: record_id.to_string(),
        results,
    }
}
