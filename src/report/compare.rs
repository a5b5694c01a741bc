// Cross-run comparisons
// Read persisted performance tables back and line algorithms up against each other

use serde::Serialize;
use std::cmp::Ordering;
use std::fs;

use crate::report::io::{evaluation_command, read_perf_table, OutputLayout, ReportError, ReportResult};
use crate::report::model::{DatasetReport, RecordReport};

/// Global rows of several algorithms on one dataset at one tolerance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgorithmComparison {
    pub dataset: String,
    pub tolerance_ms: u32,

    /// `(algorithm, global row)` in the order requested
    pub rows: Vec<(String, RecordReport)>,

    /// Algorithms without a persisted evaluation
    pub missing: Vec<String>,
}

/// Mean global scores of one algorithm across datasets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgorithmSummary {
    pub algorithm: String,
    pub datasets_evaluated: usize,
    pub mean_f1: Option<f64>,
    pub mean_error_rate: Option<f64>,
}

/// One signal-to-noise level of the noise stress test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoiseLevelResult {
    pub snr_db: i32,
    pub dataset: String,

    /// `None` when that level has not been evaluated
    pub global: Option<RecordReport>,

    /// Per-record rows, for following a single record across levels
    pub records: Vec<RecordReport>,
}

/// Load a table, mapping "not evaluated yet" to `None`
fn load_optional(
    layout: &OutputLayout,
    algorithm: &str,
    dataset: &str,
    tolerance_ms: u32,
) -> ReportResult<Option<DatasetReport>> {
    let path = layout.perf_table_path(algorithm, dataset, tolerance_ms);
    let command = evaluation_command(dataset, algorithm, tolerance_ms);
    match read_perf_table(&path, tolerance_ms, &command) {
        Ok(report) => Ok(Some(report)),
        Err(ReportError::EvaluationNotPerformed { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Tolerances for which any algorithm has a table on this dataset, ascending.
///
/// File names are `{algorithm}_{dataset}_{tolerance}.csv`; dataset names may
/// themselves contain underscores, so the tolerance is taken after the last one.
pub fn available_tolerances(layout: &OutputLayout, dataset: &str) -> ReportResult<Vec<u32>> {
    let dir = layout.perf_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let suffix = format!("_{}", dataset);
    let mut tolerances = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some((prefix, tolerance)) = stem.rsplit_once('_') else {
            continue;
        };
        if !prefix.ends_with(&suffix) {
            continue;
        }
        if let Ok(tolerance) = tolerance.parse::<u32>() {
            tolerances.push(tolerance);
        }
    }

    tolerances.sort_unstable();
    tolerances.dedup();
    Ok(tolerances)
}

pub fn compare_algorithms(
    layout: &OutputLayout,
    dataset: &str,
    tolerance_ms: u32,
    algorithms: &[&str],
) -> ReportResult<AlgorithmComparison> {
    let mut rows = Vec::with_capacity(algorithms.len());
    let mut missing = Vec::new();

    for algorithm in algorithms {
        match load_optional(layout, algorithm, dataset, tolerance_ms)? {
            Some(report) => rows.push((algorithm.to_string(), report.global)),
            None => {
                log::info!(
                    "No evaluation of {} on {} at {} ms. Run: {}",
                    algorithm,
                    dataset,
                    tolerance_ms,
                    evaluation_command(dataset, algorithm, tolerance_ms)
                );
                missing.push(algorithm.to_string());
            }
        }
    }

    Ok(AlgorithmComparison {
        dataset: dataset.to_string(),
        tolerance_ms,
        rows,
        missing,
    })
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Mean global F1 and F(%) of each algorithm over the datasets it was
/// evaluated on, best mean F1 first. Algorithms without any result go last.
pub fn overview(
    layout: &OutputLayout,
    datasets: &[&str],
    algorithms: &[&str],
    tolerance_ms: u32,
) -> ReportResult<Vec<AlgorithmSummary>> {
    let mut summaries = Vec::with_capacity(algorithms.len());

    for algorithm in algorithms {
        let mut f1 = Vec::new();
        let mut error_rate = Vec::new();
        let mut evaluated = 0;

        for dataset in datasets {
            if let Some(report) = load_optional(layout, algorithm, dataset, tolerance_ms)? {
                evaluated += 1;
                f1.extend(report.global.f1);
                error_rate.extend(report.global.error_rate);
            }
        }

        summaries.push(AlgorithmSummary {
            algorithm: algorithm.to_string(),
            datasets_evaluated: evaluated,
            mean_f1: mean(&f1),
            mean_error_rate: mean(&error_rate),
        });
    }

    summaries.sort_by(|a, b| match (a.mean_f1, b.mean_f1) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    Ok(summaries)
}

/// Global and per-record rows of one algorithm for each `(snr_db, dataset)` level
pub fn noise_robustness(
    layout: &OutputLayout,
    algorithm: &str,
    levels: &[(i32, &str)],
    tolerance_ms: u32,
) -> ReportResult<Vec<NoiseLevelResult>> {
    levels
        .iter()
        .map(|&(snr_db, dataset)| -> ReportResult<NoiseLevelResult> {
            let report = load_optional(layout, algorithm, dataset, tolerance_ms)?;
            let (global, records) = match report {
                Some(report) => (Some(report.global), report.records),
                None => (None, Vec::new()),
            };
            Ok(NoiseLevelResult {
                snr_db,
                dataset: dataset.to_string(),
                global,
                records,
            })
        })
        .collect()
}
