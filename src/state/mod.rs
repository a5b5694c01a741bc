// State management module
// SQLite run ledger, checkpoints and file system locations

pub mod db;
pub mod models;
pub mod queries;
pub mod storage;

pub use db::{init_db, open_in_memory, DbConnection, DbError, DbResult};
pub use models::{Artifact, ArtifactKind, EvaluationRun, RunStatus, RunWithArtifacts};
pub use queries::{
    count_completed_records, create_artifact, create_run, find_resumable_run,
    get_artifacts_for_run, get_run, get_run_with_artifacts, list_runs, load_record_evaluations,
    matcher_for_run, save_record_evaluation, update_run_status,
};
