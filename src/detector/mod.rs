// Detector module
// Algorithm names, pluggable implementations and the per-dataset detection run

pub mod algorithm;
pub mod backend;
pub mod runner;

pub use algorithm::Algorithm;
pub use backend::{Detector, DetectorError, DetectorResult, DetectorSet};
pub use runner::{run_and_store_detection, run_detection, SignalSource};
