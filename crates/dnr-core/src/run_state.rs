//! Pipeline run state for resuming a failed full run
//!
//! A full pipeline run is a fixed sequence of stages. The state file records
//! which stages finished so `dnr pipeline --resume` can pick up at the first
//! stage that did not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::error::CoreResult;

/// State of a pipeline run in progress or completed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique identifier for this run (also used as the ingestion batch id)
    pub run_id: String,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the state was last updated
    pub last_updated_at: DateTime<Utc>,

    /// Current status of the run
    pub status: RunStatus,

    /// Stages that finished successfully
    pub completed_stages: Vec<CompletedStage>,

    /// Stage that failed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<FailedStage>,

    /// Stages not yet run
    pub pending_stages: Vec<String>,
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// A stage that completed successfully
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedStage {
    pub name: String,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// A stage that failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedStage {
    pub name: String,
    pub failed_at: DateTime<Utc>,
    pub error: String,
}

impl RunState {
    /// Create a new run state with every stage pending
    pub fn new(stages: &[&str]) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            last_updated_at: Utc::now(),
            status: RunStatus::Running,
            completed_stages: Vec::new(),
            failed_stage: None,
            pending_stages: stages.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Load run state from a file path
    pub fn load(path: &Path) -> CoreResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Save run state atomically (write to temp, then rename)
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, serde_json::to_string_pretty(self)?)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Mark a stage as completed
    pub fn mark_completed(&mut self, name: &str, duration_ms: u64) {
        self.pending_stages.retain(|n| n != name);
        self.completed_stages.push(CompletedStage {
            name: name.to_string(),
            completed_at: Utc::now(),
            duration_ms,
        });
        self.last_updated_at = Utc::now();
    }

    /// Mark a stage as failed; the run stops here
    pub fn mark_failed(&mut self, name: &str, error: &str) {
        self.failed_stage = Some(FailedStage {
            name: name.to_string(),
            failed_at: Utc::now(),
            error: error.to_string(),
        });
        self.status = RunStatus::Failed;
        self.last_updated_at = Utc::now();
    }

    /// Mark the run as completed
    pub fn mark_run_completed(&mut self) {
        self.status = RunStatus::Completed;
        self.last_updated_at = Utc::now();
    }

    /// Check if a stage already completed in this run
    pub fn is_completed(&self, name: &str) -> bool {
        self.completed_stages.iter().any(|s| s.name == name)
    }

    /// Prepare a failed run for resumption: clear the failure, keep progress
    pub fn resume(&mut self) {
        if let Some(failed) = self.failed_stage.take() {
            if !self.pending_stages.contains(&failed.name) {
                self.pending_stages.insert(0, failed.name);
            }
        }
        self.status = RunStatus::Running;
        self.last_updated_at = Utc::now();
    }
}

#[cfg(test)]
#[path = "run_state_test.rs"]
mod tests;
