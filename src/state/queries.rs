// Database CRUD operations
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::db::{DbConnection, DbError, DbResult};
use super::models::{Artifact, ArtifactKind, EvaluationRun, RunStatus, RunWithArtifacts};
use crate::events::{ConfusionCounts, EventMatcher, MatchPolicy, SampleIndex, ToleranceWindow};
use crate::metrics::{RecordEvaluation, ToleranceResult};
use crate::report::RecordReport;

fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn uuid_at(row: &Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(index)?;
    Uuid::parse_str(&text).map_err(|e| conversion_error(index, e))
}

fn timestamp_at(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(index)?;
    text.parse().map_err(|e| conversion_error(index, e))
}

// ==================== RUN QUERIES ====================

const RUN_COLUMNS: &str =
    "id, created_at, algorithm, dataset, tolerance_ms, policy, channel, expected_records, status";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<EvaluationRun> {
    Ok(EvaluationRun {
        id: uuid_at(row, 0)?,
        created_at: timestamp_at(row, 1)?,
        algorithm: row.get(2)?,
        dataset: row.get(3)?,
        tolerance_ms: row.get(4)?,
        policy: row.get(5)?,
        channel: row.get(6)?,
        expected_records: row.get(7)?,
        status: RunStatus::from_string(&row.get::<_, String>(8)?),
    })
}

/// Create a new run
pub fn create_run(
    db: &DbConnection,
    algorithm: &str,
    dataset: &str,
    tolerance_ms: u32,
    policy: MatchPolicy,
    channel: Option<String>,
    expected_records: i64,
) -> DbResult<EvaluationRun> {
    let run = EvaluationRun {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        algorithm: algorithm.to_string(),
        dataset: dataset.to_string(),
        tolerance_ms,
        policy: policy.as_str().to_string(),
        channel,
        expected_records,
        status: RunStatus::Pending,
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO evaluation_runs (id, created_at, algorithm, dataset, tolerance_ms, policy, channel, expected_records, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            run.id.to_string(),
            run.created_at.to_rfc3339(),
            run.algorithm,
            run.dataset,
            run.tolerance_ms,
            run.policy,
            run.channel,
            run.expected_records,
            run.status.as_str(),
        ],
    )?;

    Ok(run)
}

/// Get a run by ID
pub fn get_run(db: &DbConnection, id: &Uuid) -> DbResult<Option<EvaluationRun>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM evaluation_runs WHERE id = ?1",
        RUN_COLUMNS
    ))?;

    Ok(stmt
        .query_row([id.to_string()], run_from_row)
        .optional()?)
}

/// All runs, newest first
pub fn list_runs(db: &DbConnection) -> DbResult<Vec<EvaluationRun>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM evaluation_runs ORDER BY created_at DESC",
        RUN_COLUMNS
    ))?;

    let runs = stmt
        .query_map([], run_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

/// Latest unfinished run with exactly these settings
pub fn find_resumable_run(
    db: &DbConnection,
    algorithm: &str,
    dataset: &str,
    tolerance_ms: u32,
    policy: MatchPolicy,
    channel: Option<&str>,
) -> DbResult<Option<EvaluationRun>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM evaluation_runs
         WHERE algorithm = ?1 AND dataset = ?2 AND tolerance_ms = ?3 AND policy = ?4
           AND channel IS ?5 AND status != 'complete'
         ORDER BY created_at DESC
         LIMIT 1",
        RUN_COLUMNS
    ))?;

    Ok(stmt
        .query_row(
            params![algorithm, dataset, tolerance_ms, policy.as_str(), channel],
            run_from_row,
        )
        .optional()?)
}

/// Update run status
pub fn update_run_status(db: &DbConnection, run_id: &Uuid, status: RunStatus) -> DbResult<()> {
    let conn = db.lock();
    let updated = conn.execute(
        "UPDATE evaluation_runs SET status = ?1 WHERE id = ?2",
        params![status.as_str(), run_id.to_string()],
    )?;
    if updated == 0 {
        return Err(DbError::RunNotFound(*run_id));
    }
    Ok(())
}

// ==================== RECORD RESULT QUERIES ====================

/// Checkpoint one record's three tolerance results atomically
pub fn save_record_evaluation(
    db: &DbConnection,
    run_id: &Uuid,
    position: usize,
    evaluation: &RecordEvaluation,
) -> DbResult<()> {
    let mut conn = db.lock();
    let tx = conn.transaction()?;

    for (slot, result) in evaluation.results.iter().enumerate() {
        tx.execute(
            "INSERT OR REPLACE INTO record_results
             (run_id, position, record_id, slot, tolerance_ms, radius, beat_count,
              true_positive, false_positive, false_negative, delays_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                run_id.to_string(),
                position as i64,
                evaluation.record_id,
                slot as i64,
                result.window.tolerance_ms,
                result.window.radius,
                result.report.beat_count,
                result.true_positive,
                result.report.false_positive,
                result.report.false_negative,
                serde_json::to_string(&result.delays)?,
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

struct StoredSlot {
    position: i64,
    record_id: String,
    slot: i64,
    window: ToleranceWindow,
    beat_count: i64,
    counts: ConfusionCounts,
    delays: Vec<SampleIndex>,
}

/// Checkpointed records of a run, in the order they were evaluated.
/// Rows are rebuilt from the stored counts, so they equal the originals.
pub fn load_record_evaluations(
    db: &DbConnection,
    run_id: &Uuid,
) -> DbResult<Vec<RecordEvaluation>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT position, record_id, slot, tolerance_ms, radius, beat_count,
                true_positive, false_positive, false_negative, delays_json
         FROM record_results WHERE run_id = ?1
         ORDER BY position, slot",
    )?;

    let slots = stmt
        .query_map([run_id.to_string()], |row| {
            let delays_json: String = row.get(9)?;
            Ok(StoredSlot {
                position: row.get(0)?,
                record_id: row.get(1)?,
                slot: row.get(2)?,
                window: ToleranceWindow {
                    tolerance_ms: row.get(3)?,
                    radius: row.get(4)?,
                },
                beat_count: row.get(5)?,
                counts: ConfusionCounts::new(row.get(6)?, row.get(7)?, row.get(8)?),
                delays: serde_json::from_str(&delays_json).map_err(|e| conversion_error(9, e))?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut evaluations = Vec::new();
    let mut pending: Vec<ToleranceResult> = Vec::with_capacity(3);
    for stored in slots {
        if stored.slot as usize != pending.len() {
            log::warn!(
                "Skipping out-of-order checkpoint slot {} of record {} (position {})",
                stored.slot,
                stored.record_id,
                stored.position
            );
            continue;
        }

        pending.push(ToleranceResult {
            window: stored.window,
            report: RecordReport::from_counts(stored.record_id.clone(), stored.beat_count, &stored.counts),
            delays: stored.delays,
            true_positive: stored.counts.true_positive,
        });

        if pending.len() == 3 {
            let results: [ToleranceResult; 3] = match std::mem::take(&mut pending).try_into() {
                Ok(results) => results,
                Err(_) => continue,
            };
            evaluations.push(RecordEvaluation {
                record_id: stored.record_id,
                results,
            });
        }
    }

    Ok(evaluations)
}

/// Number of checkpointed records of a run
pub fn count_completed_records(db: &DbConnection, run_id: &Uuid) -> DbResult<i64> {
    let conn = db.lock();
    Ok(conn.query_row(
        "SELECT COUNT(DISTINCT record_id) FROM record_results WHERE run_id = ?1",
        [run_id.to_string()],
        |row| row.get(0),
    )?)
}

// ==================== ARTIFACT QUERIES ====================

/// Record an artifact, replacing an earlier one of the same kind and tolerance
pub fn create_artifact(
    db: &DbConnection,
    run_id: Uuid,
    kind: ArtifactKind,
    tolerance_ms: Option<u32>,
    path: String,
    sha256: String,
    bytes: i64,
) -> DbResult<Artifact> {
    let artifact = Artifact {
        id: Uuid::new_v4(),
        run_id,
        kind,
        tolerance_ms,
        path,
        sha256,
        bytes,
    };

    let mut conn = db.lock();
    let tx = conn.transaction()?;

    // A resumed run rewrites its files; keep one row per (run, kind, tolerance)
    tx.execute(
        "DELETE FROM artifacts WHERE run_id = ?1 AND kind = ?2 AND tolerance_ms IS ?3",
        params![
            artifact.run_id.to_string(),
            artifact.kind.as_str(),
            artifact.tolerance_ms,
        ],
    )?;
    tx.execute(
        "INSERT INTO artifacts (id, run_id, kind, tolerance_ms, path, sha256, bytes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            artifact.id.to_string(),
            artifact.run_id.to_string(),
            artifact.kind.as_str(),
            artifact.tolerance_ms,
            artifact.path,
            artifact.sha256,
            artifact.bytes,
        ],
    )?;
    tx.commit()?;

    Ok(artifact)
}

/// Get all artifacts for a run
pub fn get_artifacts_for_run(db: &DbConnection, run_id: &Uuid) -> DbResult<Vec<Artifact>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, run_id, kind, tolerance_ms, path, sha256, bytes
         FROM artifacts WHERE run_id = ?1 ORDER BY kind, tolerance_ms",
    )?;

    let artifacts = stmt
        .query_map([run_id.to_string()], |row| {
            Ok(Artifact {
                id: uuid_at(row, 0)?,
                run_id: uuid_at(row, 1)?,
                kind: ArtifactKind::from_string(&row.get::<_, String>(2)?),
                tolerance_ms: row.get(3)?,
                path: row.get(4)?,
                sha256: row.get(5)?,
                bytes: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(artifacts)
}

/// Get a run with its progress and artifacts
pub fn get_run_with_artifacts(
    db: &DbConnection,
    run_id: &Uuid,
) -> DbResult<Option<RunWithArtifacts>> {
    let Some(run) = get_run(db, run_id)? else {
        return Ok(None);
    };
    let completed_records = count_completed_records(db, run_id)?;
    let artifacts = get_artifacts_for_run(db, run_id)?;

    Ok(Some(RunWithArtifacts {
        run,
        completed_records,
        artifacts,
    }))
}

/// Matcher configured the way a stored run was
pub fn matcher_for_run(run: &EvaluationRun) -> EventMatcher {
    match run.policy.parse::<MatchPolicy>() {
        Ok(policy) => EventMatcher::new(policy),
        Err(e) => {
            log::warn!("Run {}: {}; using the default policy", run.id, e);
            EventMatcher::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{evaluate_record, Tolerances};
    use crate::state::db::open_in_memory;

    fn sample_evaluation(record_id: &str, offset: i64) -> RecordEvaluation {
        evaluate_record(
            record_id,
            &[100 + offset, 500, 950],
            &[100, 500, 900],
            &Tolerances::for_record(150, 360),
            &EventMatcher::default(),
        )
    }

    #[test]
    fn test_run_lifecycle() {
        let db = open_in_memory().unwrap();
        let run = create_run(&db, "heartpy", "european-stt", 150, MatchPolicy::Shared, None, 90).unwrap();
        assert_eq!(run.status, RunStatus::Pending);

        update_run_status(&db, &run.id, RunStatus::Processing).unwrap();
        let loaded = get_run(&db, &run.id).unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Processing);
        assert_eq!(loaded.algorithm, "heartpy");
        assert_eq!(loaded.expected_records, 90);

        assert!(get_run(&db, &Uuid::new_v4()).unwrap().is_none());
        assert!(matches!(
            update_run_status(&db, &Uuid::new_v4(), RunStatus::Failed),
            Err(DbError::RunNotFound(_))
        ));
        assert_eq!(list_runs(&db).unwrap().len(), 1);
    }

    #[test]
    fn test_find_resumable_run() {
        let db = open_in_memory().unwrap();
        let run = create_run(&db, "heartpy", "european-stt", 150, MatchPolicy::Shared, None, 90).unwrap();

        let found = find_resumable_run(&db, "heartpy", "european-stt", 150, MatchPolicy::Shared, None)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, run.id);

        // Different settings never resume this run
        assert!(find_resumable_run(&db, "heartpy", "european-stt", 100, MatchPolicy::Shared, None)
            .unwrap()
            .is_none());
        assert!(
            find_resumable_run(&db, "heartpy", "european-stt", 150, MatchPolicy::OneToOne, None)
                .unwrap()
                .is_none()
        );
        assert!(
            find_resumable_run(&db, "heartpy", "european-stt", 150, MatchPolicy::Shared, Some("V4"))
                .unwrap()
                .is_none()
        );

        update_run_status(&db, &run.id, RunStatus::Complete).unwrap();
        assert!(find_resumable_run(&db, "heartpy", "european-stt", 150, MatchPolicy::Shared, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let db = open_in_memory().unwrap();
        let run = create_run(&db, "xqrs-wfdb", "mit-bih-arrhythmia", 150, MatchPolicy::Shared, None, 48)
            .unwrap();

        let first = sample_evaluation("100", 3);
        let second = sample_evaluation("101", -20);
        save_record_evaluation(&db, &run.id, 1, &second).unwrap();
        save_record_evaluation(&db, &run.id, 0, &first).unwrap();

        let loaded = load_record_evaluations(&db, &run.id).unwrap();
        assert_eq!(loaded, vec![first, second]);
        assert_eq!(count_completed_records(&db, &run.id).unwrap(), 2);
    }

    #[test]
    fn test_artifacts() {
        let db = open_in_memory().unwrap();
        let run = create_run(&db, "heartpy", "european-stt", 150, MatchPolicy::Shared, None, 90).unwrap();

        create_artifact(
            &db,
            run.id,
            ArtifactKind::PerfTable,
            Some(150),
            "output/perf/heartpy_european-stt_150.csv".to_string(),
            "ab".repeat(32),
            512,
        )
        .unwrap();
        create_artifact(
            &db,
            run.id,
            ArtifactKind::DelayLog,
            Some(25),
            "output/perf/heartpy_european-stt_25.json".to_string(),
            "cd".repeat(32),
            64,
        )
        .unwrap();

        let details = get_run_with_artifacts(&db, &run.id).unwrap().unwrap();
        assert_eq!(details.artifacts.len(), 2);
        assert_eq!(details.artifacts[0].kind, ArtifactKind::DelayLog);
        assert_eq!(details.completed_records, 0);
        assert!(get_run_with_artifacts(&db, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_artifact_rewrite_replaces_row() {
        let db = open_in_memory().unwrap();
        let run = create_run(&db, "heartpy", "european-stt", 150, MatchPolicy::Shared, None, 90).unwrap();
        let path = "output/perf/heartpy_european-stt_150.csv".to_string();

        for hash in ["ab", "cd"] {
            create_artifact(&db, run.id, ArtifactKind::PerfTable, Some(150), path.clone(), hash.repeat(32), 512)
                .unwrap();
        }
        create_artifact(&db, run.id, ArtifactKind::PerfTable, Some(25), path.clone(), "ef".repeat(32), 512)
            .unwrap();

        let artifacts = get_artifacts_for_run(&db, &run.id).unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].tolerance_ms, Some(25));
        assert_eq!(artifacts[1].sha256, "cd".repeat(32));
    }

    #[test]
    fn test_matcher_for_run() {
        let db = open_in_memory().unwrap();
        let run = create_run(&db, "heartpy", "european-stt", 150, MatchPolicy::OneToOne, None, 90).unwrap();
        assert_eq!(matcher_for_run(&run).policy(), MatchPolicy::OneToOne);
    }
}
