// Metrics module
// Scores, multi-tolerance evaluation, dataset aggregation and delay statistics

pub mod aggregator;
pub mod delays;
pub mod evaluator;
pub mod scores;

pub use aggregator::{
    evaluate_records, AggregateError, AggregateResult, DatasetAggregator,
    MultiToleranceAggregator, RecordInput,
};
pub use delays::{DelayHistogram, DelayStats};
pub use evaluator::{
    evaluate_record, RecordEvaluation, ToleranceResult, Tolerances, MAX_TOLERANCE_MS,
    SUPPLEMENTARY_TOLERANCES_MS,
};
pub use scores::{score, Metric, ScoreError, ScoreResult, ScoreSet};
