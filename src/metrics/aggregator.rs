// Dataset aggregator
// Folds per-record rows into a dataset table with a recomputed global row

use rayon::prelude::*;
use std::collections::HashSet;
use thiserror::Error;

use crate::events::{ConfusionCounts, EventMatcher, SampleIndex};
use crate::metrics::evaluator::{evaluate_record, RecordEvaluation, Tolerances, ToleranceResult};
use crate::report::{DatasetReport, DelayLog, RecordReport, GLOBAL_ROW};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Record {0} was already aggregated")]
    DuplicateRecord(String),

    #[error("Incomplete evaluation: {processed} of {expected} records processed")]
    Incomplete { processed: usize, expected: usize },

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type AggregateResult<T> = Result<T, AggregateError>;

/// Accumulates the rows of one tolerance across a dataset.
///
/// Records must be pushed in canonical registry order; the table keeps that
/// order. Running sums feed the global row, whose scores are recomputed from
/// the summed counts rather than averaged.
pub struct DatasetAggregator {
    tolerance_ms: u32,
    expected_records: usize,
    rows: Vec<RecordReport>,
    delays: DelayLog,
    seen: HashSet<String>,
    beat_total: i64,
    totals: ConfusionCounts,
}

impl DatasetAggregator {
    /// Create an aggregator sized for the registry
    pub fn new(tolerance_ms: u32, expected_records: usize) -> Self {
        DatasetAggregator {
            tolerance_ms,
            expected_records,
            rows: Vec::with_capacity(expected_records),
            delays: DelayLog::with_capacity(expected_records),
            seen: HashSet::with_capacity(expected_records),
            beat_total: 0,
            totals: ConfusionCounts::default(),
        }
    }

    /// Add one record's row for this tolerance
    pub fn push(
        &mut self,
        report: RecordReport,
        true_positive: i64,
        delays: Vec<SampleIndex>,
    ) -> AggregateResult<()> {
        if !self.seen.insert(report.record_id.clone()) {
            return Err(AggregateError::DuplicateRecord(report.record_id));
        }

        self.beat_total += report.beat_count;
        self.totals += ConfusionCounts::new(
            true_positive,
            report.false_positive,
            report.false_negative,
        );
        self.delays.push(report.record_id.clone(), delays);
        self.rows.push(report);
        Ok(())
    }

    pub fn push_result(&mut self, result: &ToleranceResult) -> AggregateResult<()> {
        self.push(
            result.report.clone(),
            result.true_positive,
            result.delays.clone(),
        )
    }

    pub fn processed(&self) -> usize {
        self.rows.len()
    }

    pub fn is_complete(&self) -> bool {
        self.rows.len() == self.expected_records
    }

    /// Summed counts so far
    pub fn totals(&self) -> ConfusionCounts {
        self.totals
    }

    /// Materialize the table. An incomplete aggregator still produces a report
    /// covering the records seen so far; `DatasetReport::is_complete` tells them apart.
    pub fn finish(self) -> (DatasetReport, DelayLog) {
        let global = RecordReport::from_counts(GLOBAL_ROW, self.beat_total, &self.totals);
        if !self.is_complete() {
            log::warn!(
                "Dataset report at {} ms covers {} of {} records",
                self.tolerance_ms,
                self.rows.len(),
                self.expected_records
            );
        }

        let report = DatasetReport {
            tolerance_ms: self.tolerance_ms,
            records: self.rows,
            global,
            expected_records: self.expected_records,
        };
        (report, self.delays)
    }

    /// Like `finish`, but refuses a partially consumed record set
    pub fn finish_complete(self) -> AggregateResult<(DatasetReport, DelayLog)> {
        if !self.is_complete() {
            return Err(AggregateError::Incomplete {
                processed: self.rows.len(),
                expected: self.expected_records,
            });
        }
        Ok(self.finish())
    }
}

/// One aggregator per tolerance, fed with whole record evaluations
pub struct MultiToleranceAggregator {
    aggregators: [DatasetAggregator; 3],
}

impl MultiToleranceAggregator {
    pub fn new(tolerances_ms: [u32; 3], expected_records: usize) -> Self {
        MultiToleranceAggregator {
            aggregators: tolerances_ms.map(|ms| DatasetAggregator::new(ms, expected_records)),
        }
    }

    pub fn push(&mut self, evaluation: &RecordEvaluation) -> AggregateResult<()> {
        for (aggregator, result) in self.aggregators.iter_mut().zip(evaluation.results.iter()) {
            aggregator.push_result(result)?;
        }
        Ok(())
    }

    pub fn processed(&self) -> usize {
        self.aggregators[0].processed()
    }

    pub fn finish(self) -> [(DatasetReport, DelayLog); 3] {
        self.aggregators.map(DatasetAggregator::finish)
    }

    pub fn finish_complete(self) -> AggregateResult<[(DatasetReport, DelayLog); 3]> {
        let [a, b, c] = self.aggregators;
        Ok([a.finish_complete()?, b.finish_complete()?, c.finish_complete()?])
    }
}

/// Inputs of one record, already resolved from the persisted files
#[derive(Debug, Clone)]
pub struct RecordInput {
    pub record_id: String,
    pub sampling_frequency_hz: u32,
    pub detections: Vec<SampleIndex>,
    pub annotations: Vec<SampleIndex>,
}

/// Evaluate records with a bounded worker pool.
///
/// Evaluation order across workers is unspecified, but the returned vector is
/// in input order, so the single writer downstream sees canonical order.
pub fn evaluate_records(
    inputs: &[RecordInput],
    tolerance_ms: u32,
    matcher: &EventMatcher,
    workers: usize,
) -> AggregateResult<Vec<RecordEvaluation>> {
    let evaluate = |input: &RecordInput| {
        let tolerances = Tolerances::for_record(tolerance_ms, input.sampling_frequency_hz);
        evaluate_record(
            &input.record_id,
            &input.detections,
            &input.annotations,
            &tolerances,
            matcher,
        )
    };

    if workers <= 1 {
        return Ok(inputs.iter().map(evaluate).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()?;
    Ok(pool.install(|| inputs.par_iter().map(evaluate).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::scores::{f1_score, score};
    use proptest::prelude::*;

    fn row(id: &str, tp: i64, fp: i64, fn_: i64) -> RecordReport {
        RecordReport::from_counts(id, tp + fn_, &ConfusionCounts::new(tp, fp, fn_))
    }

    #[test]
    fn test_global_row_from_summed_counts() {
        let mut aggregator = DatasetAggregator::new(50, 2);
        aggregator.push(row("100", 2, 1, 1), 2, vec![2, 0]).unwrap();
        aggregator.push(row("101", 8, 0, 0), 8, vec![0; 8]).unwrap();

        let (report, delays) = aggregator.finish();
        assert!(report.is_complete());
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].record_id, "100");

        let global = &report.global;
        assert_eq!(global.record_id, "global");
        assert_eq!(global.beat_count, 11);
        assert_eq!(global.false_positive, 1);
        assert_eq!(global.false_negative, 1);
        assert_eq!(global.errors, 2);
        assert_eq!(global.error_rate, Some(18.18));

        // Recomputed from sums (10, 1, 1), not the mean of 66.67 and 100
        let expected = score(10, 1, 1).unwrap();
        assert_eq!(global.positive_predictivity, Some(expected.positive_predictivity));
        assert_eq!(global.sensitivity, Some(expected.recall));
        assert_eq!(global.f1, Some(expected.f1));
        assert_eq!(global.f1, Some(90.91));

        assert_eq!(delays.len(), 2);
        assert_eq!(delays.get("100"), Some(&[2, 0][..]));
    }

    #[test]
    fn test_duplicate_record_rejected() {
        let mut aggregator = DatasetAggregator::new(50, 2);
        aggregator.push(row("100", 1, 0, 0), 1, vec![0]).unwrap();
        let err = aggregator.push(row("100", 1, 0, 0), 1, vec![0]).unwrap_err();
        assert!(matches!(err, AggregateError::DuplicateRecord(id) if id == "100"));
    }

    #[test]
    fn test_partial_stream_is_incomplete() {
        let mut aggregator = DatasetAggregator::new(50, 3);
        aggregator.push(row("100", 1, 0, 0), 1, vec![0]).unwrap();

        let (report, _) = DatasetAggregator::finish(aggregator);
        assert!(!report.is_complete());
        assert_eq!(report.global.beat_count, 1);

        let mut aggregator = DatasetAggregator::new(50, 3);
        aggregator.push(row("100", 1, 0, 0), 1, vec![0]).unwrap();
        let err = aggregator.finish_complete().unwrap_err();
        assert!(matches!(
            err,
            AggregateError::Incomplete {
                processed: 1,
                expected: 3
            }
        ));
    }

    #[test]
    fn test_empty_dataset_global_row_undefined() {
        let (report, delays) = DatasetAggregator::new(50, 0).finish();
        assert!(report.is_complete());
        assert_eq!(report.global.beat_count, 0);
        assert_eq!(report.global.error_rate, None);
        assert!(delays.is_empty());
    }

    #[test]
    fn test_multi_tolerance_aggregation() {
        let inputs = vec![
            RecordInput {
                record_id: "a".to_string(),
                sampling_frequency_hz: 1000,
                detections: vec![102, 530, 940],
                annotations: vec![100, 500, 900],
            },
            RecordInput {
                record_id: "b".to_string(),
                sampling_frequency_hz: 1000,
                detections: vec![1000],
                annotations: vec![1000, 2000],
            },
        ];

        let evaluations = evaluate_records(&inputs, 5, &EventMatcher::default(), 1).unwrap();
        let mut aggregator = MultiToleranceAggregator::new([5, 25, 50], inputs.len());
        for evaluation in &evaluations {
            aggregator.push(evaluation).unwrap();
        }
        assert_eq!(aggregator.processed(), 2);

        let [(first, _), _, (last, last_delays)] = aggregator.finish_complete().unwrap();
        assert_eq!(first.tolerance_ms, 5);
        assert_eq!(first.global.beat_count, 5);
        assert_eq!(first.global.false_negative, 3);
        assert_eq!(last.tolerance_ms, 50);
        assert_eq!(last.global.false_negative, 1);
        assert_eq!(last_delays.get("a"), Some(&[2, 30, 40][..]));
    }

    #[test]
    fn test_parallel_evaluation_keeps_order() {
        let inputs: Vec<RecordInput> = (0..40)
            .map(|i| RecordInput {
                record_id: format!("r{}", i),
                sampling_frequency_hz: 360,
                detections: (0..i).map(|k| k * 300 + 3).collect(),
                annotations: (0..20).map(|k| k * 300).collect(),
            })
            .collect();

        let sequential = evaluate_records(&inputs, 50, &EventMatcher::default(), 1).unwrap();
        let parallel = evaluate_records(&inputs, 50, &EventMatcher::default(), 4).unwrap();
        assert_eq!(sequential, parallel);
        assert_eq!(parallel[7].record_id, "r7");
    }

    proptest! {
        #[test]
        fn prop_global_counts_are_sums(
            counts in prop::collection::vec((0i64..200, 0i64..50, 0i64..50), 1..20)
        ) {
            let mut aggregator = DatasetAggregator::new(100, counts.len());
            for (i, (tp, fp, fn_)) in counts.iter().enumerate() {
                aggregator.push(row(&i.to_string(), *tp, *fp, *fn_), *tp, vec![]).unwrap();
            }
            let (report, _) = aggregator.finish();

            let tp: i64 = counts.iter().map(|c| c.0).sum();
            let fp: i64 = counts.iter().map(|c| c.1).sum();
            let fn_: i64 = counts.iter().map(|c| c.2).sum();
            prop_assert_eq!(report.global.beat_count, tp + fn_);
            prop_assert_eq!(report.global.false_positive, fp);
            prop_assert_eq!(report.global.false_negative, fn_);
            prop_assert_eq!(report.global.f1, f1_score(tp, fp, fn_).ok());
        }
    }
}
