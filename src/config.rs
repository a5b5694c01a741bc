// Evaluation configuration
// Operator choices for one evaluation run

use std::path::PathBuf;
use thiserror::Error;

use crate::dataset::{Dataset, DatasetError};
use crate::detector::{Algorithm, DetectorError};
use crate::events::{EventMatcher, MatchPolicy};
use crate::metrics::{MAX_TOLERANCE_MS, SUPPLEMENTARY_TOLERANCES_MS};
use crate::report::OutputLayout;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Algorithm(#[from] DetectorError),

    #[error("Worker count must be at least 1")]
    NoWorkers,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Clamp an operator tolerance into `0..=1000` ms
pub fn clamp_tolerance(tolerance_ms: i64) -> u32 {
    let clamped = tolerance_ms.clamp(0, MAX_TOLERANCE_MS as i64);
    if clamped != tolerance_ms {
        log::warn!("Tolerance {} ms clamped to {} ms", tolerance_ms, clamped);
    }
    clamped as u32
}

/// Configuration of one evaluation
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    pub dataset: Dataset,
    pub algorithm: Algorithm,

    /// Operator tolerance in ms, already clamped
    pub tolerance_ms: u32,

    /// Root of the frames/, annotations/ and perf/ directories
    pub output_root: PathBuf,

    pub policy: MatchPolicy,

    /// Records evaluated concurrently; 1 keeps everything on the calling thread
    pub workers: usize,

    /// Channel to evaluate instead of each record's first channel
    pub channel: Option<String>,

    /// SQLite run ledger; when set, completed records are checkpointed
    pub checkpoint_db: Option<PathBuf>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            dataset: Dataset::MitBihArrhythmia,
            algorithm: Algorithm::PanTompkins,
            tolerance_ms: 150,
            output_root: PathBuf::from("output"),
            policy: MatchPolicy::default(),
            workers: 1,
            channel: None,
            checkpoint_db: None,
        }
    }
}

impl EvaluationConfig {
    /// Build a configuration from operator-supplied names.
    /// Datasets match case-insensitively, algorithms exactly.
    pub fn from_names(dataset: &str, algorithm: &str, tolerance_ms: i64) -> ConfigResult<Self> {
        Ok(EvaluationConfig {
            dataset: dataset.parse()?,
            algorithm: algorithm.parse()?,
            tolerance_ms: clamp_tolerance(tolerance_ms),
            ..EvaluationConfig::default()
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Operator tolerance followed by the fixed supplements
    pub fn tolerances_ms(&self) -> [u32; 3] {
        let [sup1, sup2] = SUPPLEMENTARY_TOLERANCES_MS;
        [self.tolerance_ms, sup1, sup2]
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(self.output_root.clone())
    }

    pub fn matcher(&self) -> EventMatcher {
        EventMatcher::new(self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_tolerance() {
        assert_eq!(clamp_tolerance(-20), 0);
        assert_eq!(clamp_tolerance(0), 0);
        assert_eq!(clamp_tolerance(150), 150);
        assert_eq!(clamp_tolerance(1000), 1000);
        assert_eq!(clamp_tolerance(5000), 1000);
    }

    #[test]
    fn test_from_names() {
        let config = EvaluationConfig::from_names("EUROPEAN-STT", "gqrs-wfdb", 2000).unwrap();
        assert_eq!(config.dataset, Dataset::EuropeanStt);
        assert_eq!(config.algorithm, Algorithm::GqrsWfdb);
        assert_eq!(config.tolerances_ms(), [1000, 25, 50]);
        assert_eq!(config.workers, 1);
        assert_eq!(config.policy, MatchPolicy::Shared);
    }

    #[test]
    fn test_from_names_rejects_unknown() {
        assert!(matches!(
            EvaluationConfig::from_names("nope", "heartpy", 100),
            Err(ConfigError::Dataset(_))
        ));
        assert!(matches!(
            EvaluationConfig::from_names("european-stt", "HeartPy", 100),
            Err(ConfigError::Algorithm(_))
        ));
    }

    #[test]
    fn test_validate_workers() {
        let config = EvaluationConfig {
            workers: 0,
            ..EvaluationConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoWorkers)));
        assert!(EvaluationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_layout_follows_root() {
        let config = EvaluationConfig {
            output_root: PathBuf::from("/tmp/bench"),
            ..EvaluationConfig::default()
        };
        assert_eq!(
            config.layout().perf_table_path("heartpy", "european-stt", 50),
            PathBuf::from("/tmp/bench/perf/heartpy_european-stt_50.csv")
        );
    }
}
