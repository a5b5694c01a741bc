// Operator commands
// Each command loads its inputs, runs the engine and returns a serializable result
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::EvaluationConfig;
use crate::dataset::Dataset;
use crate::detector::Algorithm;
use crate::events::{EventMatcher, ToleranceWindow};
use crate::metrics::{
    evaluate_records, DelayHistogram, DelayStats, MultiToleranceAggregator, RecordEvaluation,
    RecordInput, SUPPLEMENTARY_TOLERANCES_MS,
};
use crate::report::{
    self, AlgorithmComparison, AlgorithmSummary, ArtifactInfo, DatasetReport, DelayLog,
    NoiseLevelResult, OutputLayout, RecordReport,
};
use crate::state::{
    self, ArtifactKind, DbConnection, EvaluationRun, RunStatus, RunWithArtifacts,
};

#[derive(Debug, Serialize)]
pub struct CommandError {
    message: String,
}

impl<E: std::fmt::Display> From<E> for CommandError {
    fn from(error: E) -> Self {
        CommandError {
            message: error.to_string(),
        }
    }
}

impl CommandError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

fn open_ledger(path: Option<&Path>) -> CommandResult<DbConnection> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => state::storage::default_db_path()?,
    };
    Ok(state::init_db(&path)?)
}

// ==================== EVALUATION ====================

#[derive(Debug, Serialize)]
pub struct EvaluationSummary {
    pub algorithm: String,
    pub dataset: String,
    pub run_id: Option<Uuid>,

    /// Records taken from the checkpoint instead of being evaluated again
    pub resumed_records: usize,
    pub reports: Vec<DatasetReport>,
    pub artifacts: Vec<PathBuf>,
}

/// Resolve every record's inputs up front, so a missing record fails the run
/// before anything is evaluated
fn load_inputs(config: &EvaluationConfig) -> CommandResult<Vec<RecordInput>> {
    let layout = config.layout();
    let dataset = config.dataset;
    let detections = report::read_detections(&layout, config.algorithm.name(), dataset.name())?;
    let annotations = report::read_annotations(&layout, dataset.name())?;
    let sampling_frequency_hz = dataset.sampling_frequency();

    dataset
        .records()
        .iter()
        .map(|record| -> CommandResult<RecordInput> {
            let channel = dataset.channel_for(record, config.channel.as_deref())?;
            Ok(RecordInput {
                record_id: record.id.clone(),
                sampling_frequency_hz,
                detections: detections.channel(&record.id, channel)?.to_vec(),
                annotations: annotations.record(&record.id)?.to_vec(),
            })
        })
        .collect()
}

/// Checkpointed evaluations that form a prefix of the registry order.
/// Anything after the first mismatch is evaluated again.
fn checkpoint_prefix(
    stored: Vec<RecordEvaluation>,
    inputs: &[RecordInput],
) -> Vec<RecordEvaluation> {
    let total = stored.len();
    let prefix: Vec<RecordEvaluation> = stored
        .into_iter()
        .zip(inputs)
        .take_while(|(evaluation, input)| evaluation.record_id == input.record_id)
        .map(|(evaluation, _)| evaluation)
        .collect();
    if prefix.len() < total {
        log::warn!(
            "Ignoring {} checkpointed records that do not follow registry order",
            total - prefix.len()
        );
    }
    prefix
}

struct Ledger {
    db: DbConnection,
    run: EvaluationRun,
}

impl Ledger {
    fn open(config: &EvaluationConfig, path: &Path, expected_records: usize) -> CommandResult<Self> {
        let db = open_ledger(Some(path))?;
        let existing = state::find_resumable_run(
            &db,
            config.algorithm.name(),
            config.dataset.name(),
            config.tolerance_ms,
            config.policy,
            config.channel.as_deref(),
        )?;

        let run = match existing {
            Some(run) => {
                log::info!("Resuming run {} ({})", run.id, run.status.as_str());
                run
            }
            None => state::create_run(
                &db,
                config.algorithm.name(),
                config.dataset.name(),
                config.tolerance_ms,
                config.policy,
                config.channel.clone(),
                expected_records as i64,
            )?,
        };
        state::update_run_status(&db, &run.id, RunStatus::Processing)?;
        Ok(Ledger { db, run })
    }

    /// Matcher with the policy the run was recorded under
    fn matcher(&self) -> EventMatcher {
        state::matcher_for_run(&self.run)
    }

    fn record_artifact(&self, kind: ArtifactKind, tolerance_ms: u32, info: &ArtifactInfo) -> CommandResult<()> {
        state::create_artifact(
            &self.db,
            self.run.id,
            kind,
            Some(tolerance_ms),
            info.path.to_string_lossy().to_string(),
            info.sha256.clone(),
            info.size_bytes as i64,
        )?;
        Ok(())
    }
}

fn persist_reports(
    layout: &OutputLayout,
    config: &EvaluationConfig,
    tables: [(DatasetReport, DelayLog); 3],
    ledger: Option<&Ledger>,
) -> CommandResult<(Vec<DatasetReport>, Vec<PathBuf>)> {
    let algorithm = config.algorithm.name();
    let dataset = config.dataset.name();
    let mut reports = Vec::with_capacity(3);
    let mut artifacts = Vec::with_capacity(6);

    for (table, delays) in tables {
        let tolerance_ms = table.tolerance_ms;
        let perf = report::write_perf_table(
            &layout.perf_table_path(algorithm, dataset, tolerance_ms),
            &table,
        )?;
        let delay_log =
            report::write_delay_log(&layout.delay_log_path(algorithm, dataset, tolerance_ms), &delays)?;

        if let Some(ledger) = ledger {
            ledger.record_artifact(ArtifactKind::PerfTable, tolerance_ms, &perf)?;
            ledger.record_artifact(ArtifactKind::DelayLog, tolerance_ms, &delay_log)?;
        }

        artifacts.push(perf.path);
        artifacts.push(delay_log.path);
        reports.push(table);
    }

    Ok((reports, artifacts))
}

fn run_evaluation(
    config: &EvaluationConfig,
    inputs: &[RecordInput],
    ledger: Option<&Ledger>,
) -> CommandResult<EvaluationSummary> {
    let total = inputs.len();
    let matcher = ledger.map_or_else(|| config.matcher(), Ledger::matcher);
    let mut aggregator = MultiToleranceAggregator::new(config.tolerances_ms(), total);

    let resumed = match ledger {
        Some(ledger) => {
            let stored = state::load_record_evaluations(&ledger.db, &ledger.run.id)?;
            checkpoint_prefix(stored, inputs)
        }
        None => Vec::new(),
    };
    let resumed_records = resumed.len();
    for evaluation in &resumed {
        aggregator.push(evaluation)?;
    }
    if resumed_records > 0 {
        log::info!("Restored {}/{} records from checkpoint", resumed_records, total);
    }

    // Chunks keep checkpoints frequent while still feeding every worker
    let chunk_size = config.workers.max(1);
    let mut done = resumed_records;
    for chunk in inputs[resumed_records..].chunks(chunk_size) {
        let evaluations = evaluate_records(chunk, config.tolerance_ms, &matcher, config.workers)?;
        for evaluation in evaluations {
            if let Some(ledger) = ledger {
                state::save_record_evaluation(&ledger.db, &ledger.run.id, done, &evaluation)?;
            }
            aggregator.push(&evaluation)?;
            done += 1;
            log::info!("{}/{}", done, total);
        }
    }

    let tables = aggregator.finish_complete()?;
    let (reports, artifacts) = persist_reports(&config.layout(), config, tables, ledger)?;

    Ok(EvaluationSummary {
        algorithm: config.algorithm.name().to_string(),
        dataset: config.dataset.name().to_string(),
        run_id: ledger.map(|l| l.run.id),
        resumed_records,
        reports,
        artifacts,
    })
}

/// Evaluate an algorithm's persisted detections against a dataset's annotations
/// and write one performance table and one delay log per tolerance
pub fn evaluate(config: &EvaluationConfig) -> CommandResult<EvaluationSummary> {
    config.validate()?;
    let inputs = load_inputs(config)?;

    log::info!(
        "Evaluation of {} on {} at {:?} ms is running ({} policy, {} workers)",
        config.algorithm,
        config.dataset,
        config.tolerances_ms(),
        config.policy,
        config.workers
    );

    let ledger = match &config.checkpoint_db {
        Some(path) => Some(Ledger::open(config, path, inputs.len())?),
        None => None,
    };

    match run_evaluation(config, &inputs, ledger.as_ref()) {
        Ok(summary) => {
            if let Some(ledger) = &ledger {
                state::update_run_status(&ledger.db, &ledger.run.id, RunStatus::Complete)?;
            }
            log::info!(
                "Evaluation of {} on {} finished",
                config.algorithm,
                config.dataset
            );
            Ok(summary)
        }
        Err(e) => {
            if let Some(ledger) = &ledger {
                if let Err(status_err) =
                    state::update_run_status(&ledger.db, &ledger.run.id, RunStatus::Failed)
                {
                    log::error!("Failed to mark run {} as failed: {}", ledger.run.id, status_err);
                }
            }
            log::error!("Evaluation failed: {}", e.message());
            Err(e)
        }
    }
}

// ==================== COMPARISONS ====================

fn algorithm_names(algorithms: &[Algorithm]) -> Vec<&'static str> {
    if algorithms.is_empty() {
        Algorithm::ALL.iter().map(|a| a.name()).collect()
    } else {
        algorithms.iter().map(|a| a.name()).collect()
    }
}

/// Pick the tolerance to compare at: the requested one, else the single
/// operator tolerance on disk. The fixed 25 and 50 ms tables accompany every
/// evaluation, so they only count when nothing else was evaluated.
fn resolve_tolerance(layout: &OutputLayout, dataset: Dataset, tolerance_ms: Option<u32>) -> CommandResult<u32> {
    if let Some(tolerance_ms) = tolerance_ms {
        return Ok(tolerance_ms);
    }

    let available = report::available_tolerances(layout, dataset.name())?;
    let operator: Vec<u32> = available
        .iter()
        .copied()
        .filter(|t| !SUPPLEMENTARY_TOLERANCES_MS.contains(t))
        .collect();
    let candidates = if operator.is_empty() { &available } else { &operator };

    match candidates.as_slice() {
        [only] => Ok(*only),
        [] => Err(CommandError {
            message: format!(
                "No evaluation found for {}. Run: {}",
                dataset,
                report::evaluation_command(dataset.name(), "<algorithm>", 150)
            ),
        }),
        many => Err(CommandError {
            message: format!(
                "Several tolerances are available for {} ({:?} ms); choose one with --tolerance",
                dataset, many
            ),
        }),
    }
}

pub fn compare(
    output_root: &Path,
    dataset: Dataset,
    tolerance_ms: Option<u32>,
    algorithms: &[Algorithm],
) -> CommandResult<AlgorithmComparison> {
    let layout = OutputLayout::new(output_root);
    let tolerance_ms = resolve_tolerance(&layout, dataset, tolerance_ms)?;
    Ok(report::compare_algorithms(
        &layout,
        dataset.name(),
        tolerance_ms,
        &algorithm_names(algorithms),
    )?)
}

pub fn overview(output_root: &Path, tolerance_ms: u32) -> CommandResult<Vec<AlgorithmSummary>> {
    let layout = OutputLayout::new(output_root);
    let datasets: Vec<&str> = Dataset::REFERENCE.iter().map(|d| d.name()).collect();
    Ok(report::overview(
        &layout,
        &datasets,
        &algorithm_names(&[]),
        tolerance_ms,
    )?)
}

#[derive(Debug, Serialize)]
pub struct NoiseReport {
    pub algorithm: String,
    pub tolerance_ms: u32,

    /// Rows of the clean source records (118 and 119), when evaluated
    pub baseline: Vec<RecordReport>,
    pub levels: Vec<NoiseLevelResult>,
}

pub fn noise(output_root: &Path, algorithm: Algorithm, tolerance_ms: u32) -> CommandResult<NoiseReport> {
    let layout = OutputLayout::new(output_root);
    let levels: Vec<(i32, &str)> = Dataset::NOISE_STRESS
        .iter()
        .filter_map(|d| d.snr_db().map(|snr| (snr, d.name())))
        .collect();
    let levels = report::noise_robustness(&layout, algorithm.name(), &levels, tolerance_ms)?;

    let clean = Dataset::MitBihArrhythmia;
    let path = layout.perf_table_path(algorithm.name(), clean.name(), tolerance_ms);
    let baseline = match report::read_perf_table(
        &path,
        tolerance_ms,
        &report::evaluation_command(clean.name(), algorithm.name(), tolerance_ms),
    ) {
        Ok(table) => table
            .records
            .into_iter()
            .filter(|r| r.record_id == "118" || r.record_id == "119")
            .collect(),
        Err(report::ReportError::EvaluationNotPerformed { .. }) => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    Ok(NoiseReport {
        algorithm: algorithm.name().to_string(),
        tolerance_ms,
        baseline,
        levels,
    })
}

// ==================== DELAYS ====================

#[derive(Debug, Serialize)]
pub struct DelayReport {
    pub algorithm: String,
    pub dataset: String,
    pub tolerance_ms: u32,
    pub sampling_frequency_hz: u32,

    /// `None` when pooled over all records
    pub record_id: Option<String>,
    pub stats: Option<DelayStats>,
    pub histogram: DelayHistogram,
}

pub fn delays(
    output_root: &Path,
    dataset: Dataset,
    algorithm: Algorithm,
    tolerance_ms: u32,
    record_id: Option<&str>,
) -> CommandResult<DelayReport> {
    let layout = OutputLayout::new(output_root);
    let path = layout.delay_log_path(algorithm.name(), dataset.name(), tolerance_ms);
    let delay_log = report::read_delay_log(
        &path,
        &report::evaluation_command(dataset.name(), algorithm.name(), tolerance_ms),
    )?;

    let values = match record_id {
        Some(id) => delay_log
            .get(id)
            .map(<[_]>::to_vec)
            .ok_or_else(|| CommandError {
                message: format!("Record {} is not part of {}", id, path.display()),
            })?,
        None => delay_log.pooled(),
    };

    let sampling_frequency_hz = dataset.sampling_frequency();
    let window = ToleranceWindow::from_ms(tolerance_ms, sampling_frequency_hz);

    Ok(DelayReport {
        algorithm: algorithm.name().to_string(),
        dataset: dataset.name().to_string(),
        tolerance_ms,
        sampling_frequency_hz,
        record_id: record_id.map(str::to_string),
        stats: DelayStats::from_delays(&values),
        histogram: DelayHistogram::build(&values, window.radius),
    })
}

// ==================== RUN LEDGER ====================

pub fn list_runs(db_path: Option<&Path>) -> CommandResult<Vec<EvaluationRun>> {
    let db = open_ledger(db_path)?;
    Ok(state::list_runs(&db)?)
}

pub fn get_run_with_artifacts(db_path: Option<&Path>, id: &str) -> CommandResult<RunWithArtifacts> {
    let run_id = Uuid::parse_str(id)?;
    let db = open_ledger(db_path)?;
    state::get_run_with_artifacts(&db, &run_id)?.ok_or_else(|| CommandError {
        message: format!("Run {} not found", run_id),
    })
}

/// Artifacts of a run whose file no longer matches the recorded checksum
pub fn verify_run_artifacts(db_path: Option<&Path>, id: &str) -> CommandResult<Vec<String>> {
    let details = get_run_with_artifacts(db_path, id)?;
    let mut mismatched = Vec::new();
    for artifact in &details.artifacts {
        match state::storage::file_sha256(Path::new(&artifact.path)) {
            Ok(hash) if hash == artifact.sha256 => {}
            Ok(_) => mismatched.push(artifact.path.clone()),
            Err(e) => {
                log::warn!("Cannot read {}: {}", artifact.path, e);
                mismatched.push(artifact.path.clone());
            }
        }
    }
    Ok(mismatched)
}

// ==================== CATALOG ====================

#[derive(Debug, Serialize)]
pub struct DatasetInfo {
    pub name: &'static str,
    pub sampling_frequency_hz: u32,
    pub records: usize,
    pub snr_db: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct Catalog {
    pub datasets: Vec<DatasetInfo>,
    pub algorithms: Vec<&'static str>,
}

pub fn list() -> Catalog {
    Catalog {
        datasets: Dataset::ALL
            .iter()
            .map(|d| DatasetInfo {
                name: d.name(),
                sampling_frequency_hz: d.sampling_frequency(),
                records: d.record_count(),
                snr_db: d.snr_db(),
            })
            .collect(),
        algorithms: algorithm_names(&[]),
    }
}
