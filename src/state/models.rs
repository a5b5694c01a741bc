// Data models for the evaluation run ledger
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One evaluation of an algorithm on a dataset at an operator tolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub algorithm: String,
    pub dataset: String,
    pub tolerance_ms: u32,
    pub policy: String,
    pub channel: Option<String>,

    /// Registry size when the run started
    pub expected_records: i64,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Complete => "complete",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pending" => RunStatus::Pending,
            "processing" => RunStatus::Processing,
            "complete" => RunStatus::Complete,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Pending,
        }
    }

    /// Whether a run in this state can be picked up again
    pub fn is_resumable(&self) -> bool {
        !matches!(self, RunStatus::Complete)
    }
}

/// A file written for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub run_id: Uuid,
    pub kind: ArtifactKind,
    pub tolerance_ms: Option<u32>,
    pub path: String,
    pub sha256: String,
    pub bytes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    PerfTable,
    DelayLog,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::PerfTable => "perf_table",
            ArtifactKind::DelayLog => "delay_log",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "delay_log" => ArtifactKind::DelayLog,
            _ => ArtifactKind::PerfTable,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWithArtifacts {
    pub run: EvaluationRun,
    pub completed_records: i64,
    pub artifacts: Vec<Artifact>,
}
