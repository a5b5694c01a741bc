// Detector backends
// Registry of externally supplied detector implementations

use std::collections::HashMap;
use thiserror::Error;

use crate::detector::algorithm::Algorithm;
use crate::events::SampleIndex;
use crate::report::ReportError;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Unknown algorithm '{name}'. Valid algorithms: {valid}")]
    UnknownAlgorithm { name: String, valid: String },

    #[error("No implementation registered for {0}")]
    NotRegistered(Algorithm),

    #[error("{algorithm} cannot run at {sampling_frequency_hz} Hz")]
    UnsupportedSamplingFrequency {
        algorithm: Algorithm,
        sampling_frequency_hz: u32,
    },

    #[error("Failed to load channel {channel} of record {record_id}: {reason}")]
    SignalLoad {
        record_id: String,
        channel: String,
        reason: String,
    },

    #[error("Failed to write detections: {0}")]
    Report(#[from] ReportError),
}

pub type DetectorResult<T> = Result<T, DetectorError>;

/// A QRS detector: one channel in, beat positions out
pub trait Detector: Send + Sync {
    /// Sample indices of the detected beats. Order and uniqueness are not required.
    fn detect(&self, signal: &[f32], sampling_frequency_hz: u32) -> Vec<SampleIndex>;
}

impl<F> Detector for F
where
    F: Fn(&[f32], u32) -> Vec<SampleIndex> + Send + Sync,
{
    fn detect(&self, signal: &[f32], sampling_frequency_hz: u32) -> Vec<SampleIndex> {
        self(signal, sampling_frequency_hz)
    }
}

/// Detector implementations keyed by algorithm
#[derive(Default)]
pub struct DetectorSet {
    detectors: HashMap<Algorithm, Box<dyn Detector>>,
}

impl DetectorSet {
    pub fn new() -> Self {
        DetectorSet::default()
    }

    /// Register an implementation, replacing any previous one
    pub fn register(&mut self, algorithm: Algorithm, detector: impl Detector + 'static) {
        if self.detectors.insert(algorithm, Box::new(detector)).is_some() {
            log::debug!("Replaced detector implementation for {}", algorithm);
        }
    }

    pub fn is_registered(&self, algorithm: Algorithm) -> bool {
        self.detectors.contains_key(&algorithm)
    }

    /// Look the implementation up once, before any record is processed
    pub fn resolve(
        &self,
        algorithm: Algorithm,
        sampling_frequency_hz: u32,
    ) -> DetectorResult<&dyn Detector> {
        if !algorithm.supports(sampling_frequency_hz) {
            return Err(DetectorError::UnsupportedSamplingFrequency {
                algorithm,
                sampling_frequency_hz,
            });
        }

        self.detectors
            .get(&algorithm)
            .map(|d| d.as_ref())
            .ok_or(DetectorError::NotRegistered(algorithm))
    }
}
