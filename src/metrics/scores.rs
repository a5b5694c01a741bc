// Score calculator
// Positive predictivity, sensitivity and F1 from confusion counts

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::events::ConfusionCounts;

/// Percentage metrics that can be undefined for degenerate counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// P+(%) = 100 * TP / (TP + FP)
    PositivePredictivity,
    /// Se(%) = 100 * TP / (TP + FN)
    Sensitivity,
    /// F1(%) = 100 * 2TP / (2TP + FP + FN)
    F1,
    /// F(%) = 100 * (FP + FN) / beats
    ErrorRate,
}

impl Metric {
    /// Column label used in performance tables
    pub fn column(&self) -> &'static str {
        match self {
            Metric::PositivePredictivity => "P+(%)",
            Metric::Sensitivity => "Se(%)",
            Metric::F1 => "F1(%)",
            Metric::ErrorRate => "F(%)",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreError {
    #[error("Undefined score {metric}: denominator is zero")]
    UndefinedMetric { metric: Metric },
}

pub type ScoreResult<T> = Result<T, ScoreError>;

/// Precision / recall / F1 for one set of confusion counts,
/// as percentages rounded to 2 decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub positive_predictivity: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Round a percentage to 2 decimal places.
/// Formatting rounds the exact binary value half to even, so 3.125 gives 3.12
/// where `(v * 100.0).round()` would give 3.13.
pub fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}

fn percentage(numerator: i64, denominator: i64, metric: Metric) -> ScoreResult<f64> {
    if denominator == 0 {
        return Err(ScoreError::UndefinedMetric { metric });
    }
    Ok(round2(100.0 * numerator as f64 / denominator as f64))
}

pub fn positive_predictivity(true_positive: i64, false_positive: i64) -> ScoreResult<f64> {
    percentage(
        true_positive,
        true_positive + false_positive,
        Metric::PositivePredictivity,
    )
}

pub fn sensitivity(true_positive: i64, false_negative: i64) -> ScoreResult<f64> {
    percentage(
        true_positive,
        true_positive + false_negative,
        Metric::Sensitivity,
    )
}

pub fn f1_score(true_positive: i64, false_positive: i64, false_negative: i64) -> ScoreResult<f64> {
    percentage(
        2 * true_positive,
        2 * true_positive + false_positive + false_negative,
        Metric::F1,
    )
}

/// Combined error rate F(%) relative to the number of annotated beats
pub fn error_rate(errors: i64, beat_count: i64) -> ScoreResult<f64> {
    percentage(errors, beat_count, Metric::ErrorRate)
}

/// All three scores; fails on the first undefined metric
pub fn score(true_positive: i64, false_positive: i64, false_negative: i64) -> ScoreResult<ScoreSet> {
    Ok(ScoreSet {
        positive_predictivity: positive_predictivity(true_positive, false_positive)?,
        recall: sensitivity(true_positive, false_negative)?,
        f1: f1_score(true_positive, false_positive, false_negative)?,
    })
}

impl ConfusionCounts {
    pub fn scores(&self) -> ScoreResult<ScoreSet> {
        score(self.true_positive, self.false_positive, self.false_negative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worked_example_scores() {
        let scores = score(2, 1, 1).unwrap();
        assert_eq!(scores.positive_predictivity, 66.67);
        assert_eq!(scores.recall, 66.67);
        assert_eq!(scores.f1, 66.67);
    }

    #[test]
    fn test_perfect_detection() {
        let scores = ConfusionCounts::new(10, 0, 0).scores().unwrap();
        assert_eq!(scores.positive_predictivity, 100.0);
        assert_eq!(scores.recall, 100.0);
        assert_eq!(scores.f1, 100.0);
    }

    #[test]
    fn test_no_detections_is_undefined() {
        // No detections at all: tp + fp == 0
        let err = score(0, 0, 5).unwrap_err();
        assert_eq!(
            err,
            ScoreError::UndefinedMetric {
                metric: Metric::PositivePredictivity
            }
        );

        // Sensitivity and F1 are still defined on their own
        assert_eq!(sensitivity(0, 5).unwrap(), 0.0);
        assert_eq!(f1_score(0, 0, 5).unwrap(), 0.0);
    }

    #[test]
    fn test_exact_halves_round_to_even() {
        // 100 / 32 = 3.125 and 100 / 800 = 0.125 are exact binary halves
        assert_eq!(sensitivity(1, 31).unwrap(), 3.12);
        assert_eq!(error_rate(1, 800).unwrap(), 0.12);
        assert_eq!(round2(0.375), 0.38);
        // Not an exact half in binary: 1.005 is stored slightly below it
        assert_eq!(round2(1.005), 1.0);
        assert_eq!(round2(-2.5), -2.5);
    }

    #[test]
    fn test_all_zero_counts() {
        assert!(score(0, 0, 0).is_err());
        assert!(f1_score(0, 0, 0).is_err());
    }

    #[test]
    fn test_error_rate() {
        assert_eq!(error_rate(2, 3).unwrap(), 66.67);
        assert_eq!(
            error_rate(4, 0).unwrap_err(),
            ScoreError::UndefinedMetric {
                metric: Metric::ErrorRate
            }
        );
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round2(99.994), 99.99);
        assert_eq!(round2(99.996), 100.0);
        assert_eq!(round2(12.3), 12.3);
    }

    #[test]
    fn test_undefined_is_reproducible() {
        // Identical inputs give identical errors
        assert_eq!(score(0, 0, 0), score(0, 0, 0));
    }
}
