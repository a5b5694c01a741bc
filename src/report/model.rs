// Report model
// Row, table and delay-log shapes exchanged with the persistence layer

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::events::{ConfusionCounts, SampleIndex};
use crate::metrics::scores::{self, Metric};

/// Column names of a performance table, after the record-id index column
pub const COLUMNS: [&str; 8] = [
    "nbofbeats", "FP", "FN", "F", "F(%)", "P+(%)", "Se(%)", "F1(%)",
];

/// Index and cell value of the separator row
pub const SEPARATOR: &str = "_____";

/// Index of the dataset-wide row
pub const GLOBAL_ROW: &str = "global";

/// One (record, tolerance) row of a performance table.
/// Percentages are `None` when their denominator is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordReport {
    pub record_id: String,

    /// Number of annotated beats (nbofbeats)
    pub beat_count: i64,

    pub false_positive: i64,
    pub false_negative: i64,

    /// Combined error count F = FP + FN
    pub errors: i64,

    /// F(%) = 100 * F / nbofbeats
    pub error_rate: Option<f64>,

    /// P+(%)
    pub positive_predictivity: Option<f64>,

    /// Se(%)
    pub sensitivity: Option<f64>,

    /// F1(%)
    pub f1: Option<f64>,
}

impl RecordReport {
    /// Build a row from confusion counts.
    /// The true-positive count is needed for the scores but is not a column.
    pub fn from_counts(record_id: impl Into<String>, beat_count: i64, counts: &ConfusionCounts) -> Self {
        let errors = counts.errors();
        RecordReport {
            record_id: record_id.into(),
            beat_count,
            false_positive: counts.false_positive,
            false_negative: counts.false_negative,
            errors,
            error_rate: scores::error_rate(errors, beat_count).ok(),
            positive_predictivity: scores::positive_predictivity(
                counts.true_positive,
                counts.false_positive,
            )
            .ok(),
            sensitivity: scores::sensitivity(counts.true_positive, counts.false_negative).ok(),
            f1: scores::f1_score(
                counts.true_positive,
                counts.false_positive,
                counts.false_negative,
            )
            .ok(),
        }
    }

    /// Metrics of this row whose denominator was zero
    pub fn undefined_metrics(&self) -> Vec<Metric> {
        let cells = [
            (Metric::ErrorRate, self.error_rate),
            (Metric::PositivePredictivity, self.positive_predictivity),
            (Metric::Sensitivity, self.sensitivity),
            (Metric::F1, self.f1),
        ];
        cells
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(metric, _)| *metric)
            .collect()
    }

    /// Counts recoverable from a row; true positives are `beats - FN`
    pub fn counts(&self) -> ConfusionCounts {
        ConfusionCounts::new(
            self.beat_count - self.false_negative,
            self.false_positive,
            self.false_negative,
        )
    }

    /// Value of a percentage column
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::ErrorRate => self.error_rate,
            Metric::PositivePredictivity => self.positive_predictivity,
            Metric::Sensitivity => self.sensitivity,
            Metric::F1 => self.f1,
        }
    }
}

/// A row as rendered in the tabular output
#[derive(Debug, Clone, PartialEq)]
pub enum ReportRow<'a> {
    Record(&'a RecordReport),
    Separator,
    Global(&'a RecordReport),
}

/// Per-record rows for one tolerance, followed by the dataset-wide row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub tolerance_ms: u32,

    /// Rows in canonical record order
    pub records: Vec<RecordReport>,

    /// Counts summed over `records`, scores recomputed from the sums
    pub global: RecordReport,

    /// Number of records the registry expected
    pub expected_records: usize,
}

impl DatasetReport {
    /// Whether every registry record contributed a row
    pub fn is_complete(&self) -> bool {
        self.records.len() == self.expected_records
    }

    /// Rows in output order: records, separator, global
    pub fn rows(&self) -> impl Iterator<Item = ReportRow<'_>> {
        self.records
            .iter()
            .map(ReportRow::Record)
            .chain(std::iter::once(ReportRow::Separator))
            .chain(std::iter::once(ReportRow::Global(&self.global)))
    }

    pub fn record(&self, record_id: &str) -> Option<&RecordReport> {
        self.records.iter().find(|r| r.record_id == record_id)
    }
}

/// Delays of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayEntry {
    pub record_id: String,
    pub delays: Vec<SampleIndex>,
}

/// Record id -> delays between annotations and their matched detections,
/// for one tolerance. Serializes as a JSON object in record order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelayLog {
    entries: Vec<DelayEntry>,
}

impl DelayLog {
    pub fn with_capacity(capacity: usize) -> Self {
        DelayLog {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record_id: impl Into<String>, delays: Vec<SampleIndex>) {
        self.entries.push(DelayEntry {
            record_id: record_id.into(),
            delays,
        });
    }

    pub fn get(&self, record_id: &str) -> Option<&[SampleIndex]> {
        self.entries
            .iter()
            .find(|e| e.record_id == record_id)
            .map(|e| e.delays.as_slice())
    }

    pub fn entries(&self) -> &[DelayEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All delays of all records, in record order
    pub fn pooled(&self) -> Vec<SampleIndex> {
        self.entries
            .iter()
            .flat_map(|e| e.delays.iter().copied())
            .collect()
    }
}

impl Serialize for DelayLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.record_id, &entry.delays)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DelayLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DelayLogVisitor;

        impl<'de> Visitor<'de> for DelayLogVisitor {
            type Value = DelayLog;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of record id to delay list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DelayLog, A::Error> {
                let mut log = DelayLog::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((record_id, delays)) =
                    access.next_entry::<String, Vec<SampleIndex>>()?
                {
                    log.push(record_id, delays);
                }
                Ok(log)
            }
        }

        deserializer.deserialize_map(DelayLogVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_from_counts() {
        let report = RecordReport::from_counts("100", 3, &ConfusionCounts::new(2, 1, 1));

        assert_eq!(report.beat_count, 3);
        assert_eq!(report.errors, 2);
        assert_eq!(report.error_rate, Some(66.67));
        assert_eq!(report.positive_predictivity, Some(66.67));
        assert_eq!(report.sensitivity, Some(66.67));
        assert_eq!(report.f1, Some(66.67));
        assert!(report.undefined_metrics().is_empty());
    }

    #[test]
    fn test_zero_beat_record_is_undefined_not_fatal() {
        let report = RecordReport::from_counts("empty", 0, &ConfusionCounts::new(0, 4, 0));

        assert_eq!(report.error_rate, None);
        assert_eq!(report.sensitivity, None);
        // 4 false positives and no hits: P+ and F1 are defined
        assert_eq!(report.positive_predictivity, Some(0.0));
        assert_eq!(report.f1, Some(0.0));
        assert_eq!(
            report.undefined_metrics(),
            vec![Metric::ErrorRate, Metric::Sensitivity]
        );
    }

    #[test]
    fn test_rows_order() {
        let a = RecordReport::from_counts("a", 1, &ConfusionCounts::new(1, 0, 0));
        let global = RecordReport::from_counts(GLOBAL_ROW, 1, &ConfusionCounts::new(1, 0, 0));
        let report = DatasetReport {
            tolerance_ms: 50,
            records: vec![a.clone()],
            global: global.clone(),
            expected_records: 1,
        };

        let rows: Vec<_> = report.rows().collect();
        assert_eq!(
            rows,
            vec![ReportRow::Record(&a), ReportRow::Separator, ReportRow::Global(&global)]
        );
        assert!(report.is_complete());
    }

    #[test]
    fn test_delay_log_keeps_record_order() {
        let mut log = DelayLog::default();
        log.push("119", vec![1, -2]);
        log.push("100", vec![0]);

        let json = serde_json::to_string(&log).unwrap();
        assert_eq!(json, r#"{"119":[1,-2],"100":[0]}"#);

        let parsed: DelayLog = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, log);
        assert_eq!(parsed.entries()[0].record_id, "119");
        assert_eq!(parsed.pooled(), vec![1, -2, 0]);
    }
}
