// Dataset module
// Benchmark databases, their record tables and beat-annotation filtering

pub mod annotations;
pub mod registry;

pub use annotations::{beat_annotations, is_beat_symbol, BEAT_SYMBOLS};
pub use registry::{Dataset, DatasetError, DatasetResult, RecordEntry};
