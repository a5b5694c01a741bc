// Report persistence
// File layout, detections/annotations input and performance/delay output

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::events::SampleIndex;
use crate::report::model::{DatasetReport, DelayLog, RecordReport, COLUMNS, GLOBAL_ROW, SEPARATOR};
use crate::state::storage::calculate_sha256;

/// `{record_id: {channel_name: [sample, ...]}}`
pub type Detections = BTreeMap<String, BTreeMap<String, Vec<SampleIndex>>>;

/// `{record_id: [sample, ...]}`
pub type Annotations = BTreeMap<String, Vec<SampleIndex>>;

/// Cell written for a metric whose denominator was zero
const UNDEFINED_CELL: &str = "nan";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{what} not found at {}: the evaluation has not been performed yet. Run: {command}", .path.display())]
    EvaluationNotPerformed {
        what: String,
        path: PathBuf,
        command: String,
    },

    #[error("Refusing to persist an incomplete report ({processed} of {expected} records)")]
    IncompleteReport { processed: usize, expected: usize },

    #[error("Malformed performance table {}: {reason}", .path.display())]
    MalformedTable { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// Path and checksum of a file written by this module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Every input and output path, derived from one root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl Default for OutputLayout {
    fn default() -> Self {
        OutputLayout::new("output")
    }
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        OutputLayout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn annotations_dir(&self) -> PathBuf {
        self.root.join("annotations")
    }

    pub fn perf_dir(&self) -> PathBuf {
        self.root.join("perf")
    }

    /// `frames/{algorithm}_{dataset}.json`
    pub fn detections_path(&self, algorithm: &str, dataset: &str) -> PathBuf {
        self.frames_dir().join(format!("{}_{}.json", algorithm, dataset))
    }

    /// `annotations/{dataset}.json`
    pub fn annotations_path(&self, dataset: &str) -> PathBuf {
        self.annotations_dir().join(format!("{}.json", dataset))
    }

    /// `perf/{algorithm}_{dataset}_{tolerance_ms}.csv`
    pub fn perf_table_path(&self, algorithm: &str, dataset: &str, tolerance_ms: u32) -> PathBuf {
        self.perf_dir()
            .join(format!("{}_{}_{}.csv", algorithm, dataset, tolerance_ms))
    }

    /// `perf/{algorithm}_{dataset}_{tolerance_ms}.json`
    pub fn delay_log_path(&self, algorithm: &str, dataset: &str, tolerance_ms: u32) -> PathBuf {
        self.perf_dir()
            .join(format!("{}_{}_{}.json", algorithm, dataset, tolerance_ms))
    }
}

/// Command that produces the performance files of one evaluation
pub fn evaluation_command(dataset: &str, algorithm: &str, tolerance_ms: u32) -> String {
    format!(
        "qrsbench evaluate --dataset {} --algorithm {} --tolerance {}",
        dataset, algorithm, tolerance_ms
    )
}

/// Instruction for producing a detections file; detectors run outside this tool
pub fn detection_command(dataset: &str, algorithm: &str) -> String {
    format!("run detection of {} on {} and export its frames", algorithm, dataset)
}

/// Instruction for producing an annotations file
pub fn annotation_command(dataset: &str) -> String {
    format!("export the beat annotations of {}", dataset)
}

fn not_performed(what: impl Into<String>, path: &Path, command: impl Into<String>) -> ReportError {
    ReportError::EvaluationNotPerformed {
        what: what.into(),
        path: path.to_path_buf(),
        command: command.into(),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str, command: &str) -> ReportResult<T> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(not_performed(what, path, command));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&data)?)
}

/// Write bytes, creating parent directories, and checksum them
pub fn write_artifact(path: &Path, data: &[u8]) -> ReportResult<ArtifactInfo> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    log::debug!("Wrote {} ({} bytes)", path.display(), data.len());

    Ok(ArtifactInfo {
        path: path.to_path_buf(),
        sha256: calculate_sha256(data),
        size_bytes: data.len() as u64,
    })
}

/// Detections of one algorithm on one dataset
#[derive(Debug, Clone)]
pub struct DetectionsFile {
    path: PathBuf,
    command: String,
    records: Detections,
}

impl DetectionsFile {
    pub fn records(&self) -> &Detections {
        &self.records
    }

    /// Events of one (record, channel). A record or channel missing from the
    /// file means the detection step never covered it.
    pub fn channel(&self, record_id: &str, channel: &str) -> ReportResult<&[SampleIndex]> {
        let channels = self.records.get(record_id).ok_or_else(|| {
            not_performed(
                format!("Record {} in detections", record_id),
                &self.path,
                self.command.as_str(),
            )
        })?;
        channels.get(channel).map(Vec::as_slice).ok_or_else(|| {
            not_performed(
                format!("Channel {} of record {} in detections", channel, record_id),
                &self.path,
                self.command.as_str(),
            )
        })
    }
}

/// Reference annotations of one dataset
#[derive(Debug, Clone)]
pub struct AnnotationsFile {
    path: PathBuf,
    command: String,
    records: Annotations,
}

impl AnnotationsFile {
    pub fn records(&self) -> &Annotations {
        &self.records
    }

    pub fn record(&self, record_id: &str) -> ReportResult<&[SampleIndex]> {
        self.records
            .get(record_id)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                not_performed(
                    format!("Record {} in annotations", record_id),
                    &self.path,
                    self.command.as_str(),
                )
            })
    }
}

pub fn read_detections(
    layout: &OutputLayout,
    algorithm: &str,
    dataset: &str,
) -> ReportResult<DetectionsFile> {
    let path = layout.detections_path(algorithm, dataset);
    let command = detection_command(dataset, algorithm);
    let records = read_json(&path, "Detections file", &command)?;
    Ok(DetectionsFile {
        path,
        command,
        records,
    })
}

pub fn read_annotations(layout: &OutputLayout, dataset: &str) -> ReportResult<AnnotationsFile> {
    let path = layout.annotations_path(dataset);
    let command = annotation_command(dataset);
    let records = read_json(&path, "Annotations file", &command)?;
    Ok(AnnotationsFile {
        path,
        command,
        records,
    })
}

pub fn write_detections(
    layout: &OutputLayout,
    algorithm: &str,
    dataset: &str,
    detections: &Detections,
) -> ReportResult<ArtifactInfo> {
    let data = serde_json::to_vec(detections)?;
    write_artifact(&layout.detections_path(algorithm, dataset), &data)
}

pub fn write_annotations(
    layout: &OutputLayout,
    dataset: &str,
    annotations: &Annotations,
) -> ReportResult<ArtifactInfo> {
    let data = serde_json::to_vec(annotations)?;
    write_artifact(&layout.annotations_path(dataset), &data)
}

fn format_percentage(value: Option<f64>) -> String {
    match value {
        // Whole percentages keep one decimal so the column reads as floats
        Some(v) if v.fract() == 0.0 => format!("{:.1}", v),
        Some(v) => v.to_string(),
        None => UNDEFINED_CELL.to_string(),
    }
}

fn report_cells(report: &RecordReport) -> Vec<String> {
    vec![
        report.record_id.clone(),
        report.beat_count.to_string(),
        report.false_positive.to_string(),
        report.false_negative.to_string(),
        report.errors.to_string(),
        format_percentage(report.error_rate),
        format_percentage(report.positive_predictivity),
        format_percentage(report.sensitivity),
        format_percentage(report.f1),
    ]
}

/// Render a complete report as CSV: records, separator, global row
pub fn perf_table_bytes(report: &DatasetReport) -> ReportResult<Vec<u8>> {
    if !report.is_complete() {
        return Err(ReportError::IncompleteReport {
            processed: report.records.len(),
            expected: report.expected_records,
        });
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec![""];
    header.extend_from_slice(&COLUMNS);
    writer.write_record(&header)?;

    for record in &report.records {
        writer.write_record(report_cells(record))?;
    }
    writer.write_record(std::iter::repeat(SEPARATOR).take(COLUMNS.len() + 1))?;
    writer.write_record(report_cells(&report.global))?;

    writer
        .into_inner()
        .map_err(|e| ReportError::Io(e.into_error()))
}

pub fn write_perf_table(path: &Path, report: &DatasetReport) -> ReportResult<ArtifactInfo> {
    let data = perf_table_bytes(report)?;
    write_artifact(path, &data)
}

pub fn write_delay_log(path: &Path, delays: &DelayLog) -> ReportResult<ArtifactInfo> {
    let data = serde_json::to_vec(delays)?;
    write_artifact(path, &data)
}

pub fn read_delay_log(path: &Path, command: &str) -> ReportResult<DelayLog> {
    read_json(path, "Delay log", command)
}

fn parse_count(cell: &str, path: &Path) -> ReportResult<i64> {
    let cell = cell.trim();
    if let Ok(value) = cell.parse::<i64>() {
        return Ok(value);
    }
    // Tables written by other tools may carry counts as floats ("12.0")
    match cell.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 => Ok(value as i64),
        _ => Err(ReportError::MalformedTable {
            path: path.to_path_buf(),
            reason: format!("expected an integer count, found {:?}", cell),
        }),
    }
}

fn parse_percentage(cell: &str, path: &Path) -> ReportResult<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case(UNDEFINED_CELL) {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|_| ReportError::MalformedTable {
            path: path.to_path_buf(),
            reason: format!("expected a percentage, found {:?}", cell),
        })
}

fn parse_row(row: &csv::StringRecord, path: &Path) -> ReportResult<RecordReport> {
    if row.len() != COLUMNS.len() + 1 {
        return Err(ReportError::MalformedTable {
            path: path.to_path_buf(),
            reason: format!("expected {} cells, found {}", COLUMNS.len() + 1, row.len()),
        });
    }

    Ok(RecordReport {
        record_id: row[0].to_string(),
        beat_count: parse_count(&row[1], path)?,
        false_positive: parse_count(&row[2], path)?,
        false_negative: parse_count(&row[3], path)?,
        errors: parse_count(&row[4], path)?,
        error_rate: parse_percentage(&row[5], path)?,
        positive_predictivity: parse_percentage(&row[6], path)?,
        sensitivity: parse_percentage(&row[7], path)?,
        f1: parse_percentage(&row[8], path)?,
    })
}

/// Read a persisted table back into rows
pub fn read_perf_table(path: &Path, tolerance_ms: u32, command: &str) -> ReportResult<DatasetReport> {
    if !path.exists() {
        return Err(not_performed("Performance table", path, command));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    let mut records = Vec::new();
    let mut global = None;
    for row in reader.records() {
        let row = row?;
        match row.get(0) {
            Some(SEPARATOR) => continue,
            Some(GLOBAL_ROW) => global = Some(parse_row(&row, path)?),
            _ => records.push(parse_row(&row, path)?),
        }
    }

    let global = global.ok_or_else(|| ReportError::MalformedTable {
        path: path.to_path_buf(),
        reason: "missing global row".to_string(),
    })?;

    let expected_records = records.len();
    Ok(DatasetReport {
        tolerance_ms,
        records,
        global,
        expected_records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ConfusionCounts;
    use tempfile::tempdir;

    fn sample_report() -> DatasetReport {
        let a = RecordReport::from_counts("100", 3, &ConfusionCounts::new(2, 1, 1));
        let b = RecordReport::from_counts("101", 0, &ConfusionCounts::new(0, 2, 0));
        let global = RecordReport::from_counts(GLOBAL_ROW, 3, &ConfusionCounts::new(2, 3, 1));
        DatasetReport {
            tolerance_ms: 50,
            records: vec![a, b],
            global,
            expected_records: 2,
        }
    }

    #[test]
    fn test_layout_paths() {
        let layout = OutputLayout::default();
        assert_eq!(
            layout.perf_table_path("xqrs-wfdb", "mit-bih-arrhythmia", 150),
            PathBuf::from("output/perf/xqrs-wfdb_mit-bih-arrhythmia_150.csv")
        );
        assert_eq!(
            layout.delay_log_path("xqrs-wfdb", "european-stt", 25),
            PathBuf::from("output/perf/xqrs-wfdb_european-stt_25.json")
        );
        assert_eq!(
            layout.detections_path("heartpy", "european-stt"),
            PathBuf::from("output/frames/heartpy_european-stt.json")
        );
        assert_eq!(
            layout.annotations_path("european-stt"),
            PathBuf::from("output/annotations/european-stt.json")
        );
    }

    #[test]
    fn test_perf_table_layout() {
        let bytes = perf_table_bytes(&sample_report()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], ",nbofbeats,FP,FN,F,F(%),P+(%),Se(%),F1(%)");
        assert_eq!(lines[1], "100,3,1,1,2,66.67,66.67,66.67,66.67");
        assert_eq!(lines[2], "101,0,2,0,2,nan,0.0,nan,0.0");
        assert_eq!(lines[3], "_____,_____,_____,_____,_____,_____,_____,_____,_____");
        assert!(lines[4].starts_with("global,3,3,1,4,133.33,"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_incomplete_report_is_refused() {
        let mut report = sample_report();
        report.expected_records = 3;
        let err = perf_table_bytes(&report).unwrap_err();
        assert!(matches!(
            err,
            ReportError::IncompleteReport {
                processed: 2,
                expected: 3
            }
        ));
    }

    #[test]
    fn test_perf_table_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("perf").join("algo_ds_50.csv");
        let report = sample_report();

        let info = write_perf_table(&path, &report).unwrap();
        assert_eq!(info.sha256.len(), 64);
        assert_eq!(info.size_bytes, fs::metadata(&path).unwrap().len());

        let parsed = read_perf_table(&path, 50, "cmd").unwrap();
        assert_eq!(parsed, report);
        assert_eq!(parsed.global.counts(), ConfusionCounts::new(2, 3, 1));
    }

    #[test]
    fn test_read_table_accepts_float_counts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(
            &path,
            ",nbofbeats,FP,FN,F,F(%),P+(%),Se(%),F1(%)\n\
             100,10,1,0,1,10.0,90.91,100.0,95.24\n\
             _____,_____,_____,_____,_____,_____,_____,_____,_____\n\
             global,10.0,1.0,0.0,1.0,10.0,90.91,100.0,95.24\n",
        )
        .unwrap();

        let parsed = read_perf_table(&path, 150, "cmd").unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.global.beat_count, 10);
        assert_eq!(parsed.global.f1, Some(95.24));
    }

    #[test]
    fn test_missing_files_are_not_empty_data() {
        let dir = tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());

        let err = read_detections(&layout, "heartpy", "european-stt").unwrap_err();
        assert!(matches!(err, ReportError::EvaluationNotPerformed { .. }));

        let err = read_annotations(&layout, "european-stt").unwrap_err();
        assert!(matches!(err, ReportError::EvaluationNotPerformed { .. }));

        let path = layout.perf_table_path("heartpy", "european-stt", 50);
        let command = evaluation_command("european-stt", "heartpy", 50);
        let err = read_perf_table(&path, 50, &command).unwrap_err();
        assert!(err.to_string().contains("--tolerance 50"));
    }

    #[test]
    fn test_missing_record_in_inputs() {
        let dir = tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());

        let mut detections = Detections::new();
        detections.insert(
            "100".to_string(),
            BTreeMap::from([("MLII".to_string(), vec![10, 20])]),
        );
        write_detections(&layout, "heartpy", "mit-bih-arrhythmia", &detections).unwrap();

        let file = read_detections(&layout, "heartpy", "mit-bih-arrhythmia").unwrap();
        assert_eq!(file.channel("100", "MLII").unwrap(), &[10, 20]);
        assert!(matches!(
            file.channel("101", "MLII"),
            Err(ReportError::EvaluationNotPerformed { .. })
        ));
        assert!(matches!(
            file.channel("100", "V1"),
            Err(ReportError::EvaluationNotPerformed { .. })
        ));

        let annotations = Annotations::from([("100".to_string(), vec![11, 19])]);
        write_annotations(&layout, "mit-bih-arrhythmia", &annotations).unwrap();
        let file = read_annotations(&layout, "mit-bih-arrhythmia").unwrap();
        assert_eq!(file.record("100").unwrap(), &[11, 19]);
        assert!(file.record("102").is_err());
    }

    #[test]
    fn test_delay_log_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.json");
        let mut log = DelayLog::default();
        log.push("201", vec![3, -1]);
        log.push("100", vec![]);

        write_delay_log(&path, &log).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"201":[3,-1],"100":[]}"#);
        assert_eq!(read_delay_log(&path, "cmd").unwrap(), log);
    }
}
