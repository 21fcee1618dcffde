//! Pipeline stage history in `meta.pipeline_run`.

use crate::error::MetaResult;
use dnr_db::{Database, SqlValue};
use std::sync::Arc;

/// One stage of one pipeline run
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub run_id: String,
    pub stage: String,
    pub status: String,
    pub summary: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// Appends stage outcomes for `dnr status`
#[derive(Clone)]
pub struct PipelineRunLog {
    db: Arc<dyn Database>,
}

impl PipelineRunLog {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Mark a stage as running; a resumed run restarts the stage row
    pub async fn stage_started(&self, run_id: &str, stage: &str) -> MetaResult<()> {
        self.db
            .execute(
                "INSERT INTO meta.pipeline_run (run_id, stage, status, started_at) \
                 VALUES (?, ?, 'running', now()) \
                 ON CONFLICT (run_id, stage) DO UPDATE SET \
                 status = 'running', summary = NULL, started_at = EXCLUDED.started_at, finished_at = NULL",
                &[SqlValue::from(run_id), SqlValue::from(stage)],
            )
            .await?;
        Ok(())
    }

    /// Record how a stage ended
    pub async fn stage_finished(
        &self,
        run_id: &str,
        stage: &str,
        succeeded: bool,
        summary: &str,
    ) -> MetaResult<()> {
        let status = if succeeded { "completed" } else { "failed" };
        self.db
            .execute(
                "UPDATE meta.pipeline_run SET status = ?, summary = ?, finished_at = now() \
                 WHERE run_id = ? AND stage = ?",
                &[
                    SqlValue::from(status),
                    SqlValue::from(summary),
                    SqlValue::from(run_id),
                    SqlValue::from(stage),
                ],
            )
            .await?;
        Ok(())
    }

    /// Stages of the most recent runs, newest first
    pub async fn recent(&self, limit: usize) -> MetaResult<Vec<StageRecord>> {
        let result = self
            .db
            .query(
                &format!(
                    "SELECT run_id, stage, status, summary, CAST(started_at AS VARCHAR), \
                     CAST(finished_at AS VARCHAR) FROM meta.pipeline_run \
                     ORDER BY started_at DESC LIMIT {limit}"
                ),
                &[],
            )
            .await?;
        Ok(result
            .rows
            .iter()
            .map(|row| StageRecord {
                run_id: row[0].to_text().unwrap_or_default(),
                stage: row[1].to_text().unwrap_or_default(),
                status: row[2].to_text().unwrap_or_default(),
                summary: row[3].to_text(),
                started_at: row[4].to_text().unwrap_or_default(),
                finished_at: row[5].to_text(),
            })
            .collect())
    }
}
