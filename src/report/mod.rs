// Report module
// Performance tables, delay logs, their on-disk formats and cross-run comparisons

pub mod compare;
pub mod io;
pub mod model;

pub use compare::{
    available_tolerances, compare_algorithms, noise_robustness, overview, AlgorithmComparison,
    AlgorithmSummary, NoiseLevelResult,
};
pub use io::{
    evaluation_command, read_annotations, read_delay_log, read_detections, read_perf_table,
    write_annotations, write_delay_log, write_detections, write_perf_table, Annotations,
    AnnotationsFile, ArtifactInfo, Detections, DetectionsFile, OutputLayout, ReportError,
    ReportResult,
};
pub use model::{
    DatasetReport, DelayEntry, DelayLog, RecordReport, ReportRow, COLUMNS, GLOBAL_ROW, SEPARATOR,
};
