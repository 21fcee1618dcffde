//! View materializer.
//!
//! Turns a serving view into an indexed table in four persisted steps:
//! `view_only -> copying -> table_no_index -> table_indexed`. The copy lands
//! in a scratch table and replaces the view in one transaction, so readers
//! see either the old view or the complete table. Index failures are logged
//! and leave the view at `table_no_index`; the next run retries only the
//! indexes.

use crate::catalog::{Catalog, ViewDef};
use crate::error::{ServingError, ServingResult};
use dnr_core::sql_utils::{quote_ident, quote_qualified, truncate_message};
use dnr_db::{Database, RelationKind, SqlStatement};
use dnr_meta::{MaterializationState, Warehouse};
use std::time::Duration;

/// Pause before retrying a failed index build
const INDEX_RETRY_DELAY: Duration = Duration::from_millis(200);

/// What materializing one view did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeOutcome {
    pub view: String,
    pub state: MaterializationState,
    pub row_count: Option<i64>,
    /// The view was already a table; no data was copied
    pub already_materialized: bool,
}

/// Materializes catalog views one at a time
pub struct Materializer<'a> {
    warehouse: &'a Warehouse,
    catalog: &'a Catalog,
    index_retries: u32,
}

impl<'a> Materializer<'a> {
    pub fn new(warehouse: &'a Warehouse, catalog: &'a Catalog, index_retries: u32) -> Self {
        Self {
            warehouse,
            catalog,
            index_retries,
        }
    }

    /// Materialize every catalog view in dependency order, stopping at the
    /// first error
    pub async fn materialize_all(&self) -> ServingResult<Vec<MaterializeOutcome>> {
        let mut outcomes = Vec::new();
        for view in self.catalog.ordered()? {
            outcomes.push(self.materialize(&view.name).await?);
        }
        Ok(outcomes)
    }

    /// Materialize one view whose serving dependencies are already tables
    pub async fn materialize(&self, name: &str) -> ServingResult<MaterializeOutcome> {
        let view = self.catalog.get(name)?;
        let db = self.warehouse.db().as_ref();
        let store = self.warehouse.materializations();
        let qualified = view.qualified();

        for dependency in view.serving_dependencies() {
            let dep = format!("serving.{dependency}");
            if db.relation_kind(&dep).await? != Some(RelationKind::Table) {
                return Err(ServingError::DependencyNotMaterialized {
                    view: view.name.clone(),
                    dependency: dependency.to_string(),
                });
            }
        }

        let record = store.get(&view.name).await?;
        match db.relation_kind(&qualified).await? {
            None => {
                return Err(ServingError::InvariantViolation {
                    view: view.name.clone(),
                    message: format!("{qualified} does not exist; define the views first"),
                })
            }
            Some(RelationKind::Table) => {
                let row_count = match record.as_ref().and_then(|r| r.row_count) {
                    Some(count) => count,
                    None => count_rows(db, &qualified).await?,
                };
                let state = match record.map(|r| r.state) {
                    Some(MaterializationState::TableIndexed) => MaterializationState::TableIndexed,
                    _ => {
                        // Table without a completed index step, possibly left
                        // by a run that stopped right after the swap
                        store
                            .set(&view.name, MaterializationState::TableNoIndex, Some(row_count), None)
                            .await?;
                        self.build_indexes(db, view, row_count).await?
                    }
                };
                log::info!("{qualified} is already materialized ({state})");
                return Ok(MaterializeOutcome {
                    view: view.name.clone(),
                    state,
                    row_count: Some(row_count),
                    already_materialized: true,
                });
            }
            Some(RelationKind::View) => {}
        }

        let temp = view.temp_table();
        match db.relation_kind(&temp).await? {
            Some(RelationKind::View) => {
                return Err(ServingError::InvariantViolation {
                    view: view.name.clone(),
                    message: format!("scratch relation {temp} is a view"),
                })
            }
            Some(RelationKind::Table) => {
                log::warn!("Dropping stale scratch table {temp} from an interrupted copy");
                db.drop_if_exists(&temp).await?;
            }
            None => {}
        }

        store
            .set(&view.name, MaterializationState::Copying, None, None)
            .await?;

        let copy = format!(
            "CREATE TABLE {} AS SELECT * FROM {}",
            quote_qualified(&temp),
            quote_qualified(&qualified)
        );
        if let Err(e) = db.execute_batch(&copy).await {
            store
                .set(
                    &view.name,
                    MaterializationState::Copying,
                    None,
                    Some(&truncate_message(&e.to_string(), 500)),
                )
                .await?;
            return Err(e.into());
        }

        let row_count = count_rows(db, &temp).await?;

        let swap = vec![
            SqlStatement::plain(format!("DROP VIEW {}", quote_qualified(&qualified))),
            SqlStatement::plain(format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_qualified(&temp),
                quote_ident(&view.name)
            )),
        ];
        if let Err(e) = db.transaction(swap).await {
            store
                .set(
                    &view.name,
                    MaterializationState::Copying,
                    Some(row_count),
                    Some(&truncate_message(&e.to_string(), 500)),
                )
                .await?;
            return Err(e.into());
        }

        store
            .set(&view.name, MaterializationState::TableNoIndex, Some(row_count), None)
            .await?;
        log::info!("Materialized {qualified} ({row_count} rows)");

        let state = self.build_indexes(db, view, row_count).await?;
        Ok(MaterializeOutcome {
            view: view.name.clone(),
            state,
            row_count: Some(row_count),
            already_materialized: false,
        })
    }

    /// Build every declared index; `TableIndexed` only when all succeed
    async fn build_indexes(
        &self,
        db: &dyn Database,
        view: &ViewDef,
        row_count: i64,
    ) -> ServingResult<MaterializationState> {
        let mut failures = Vec::new();
        for columns in &view.indexes {
            let name = view.index_name(columns);
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&name),
                quote_qualified(&view.qualified()),
                columns
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let mut attempt = 0;
            loop {
                match db.execute_batch(&sql).await {
                    Ok(()) => break,
                    Err(e) if attempt < self.index_retries => {
                        attempt += 1;
                        log::debug!("Index {name} failed (attempt {attempt}): {e}");
                        tokio::time::sleep(INDEX_RETRY_DELAY * attempt).await;
                    }
                    Err(e) => {
                        log::warn!("Index {name} on {} not built: {e}", view.qualified());
                        failures.push(format!("{name}: {}", truncate_message(&e.to_string(), 200)));
                        break;
                    }
                }
            }
        }

        let store = self.warehouse.materializations();
        if failures.is_empty() {
            store
                .set(&view.name, MaterializationState::TableIndexed, Some(row_count), None)
                .await?;
            Ok(MaterializationState::TableIndexed)
        } else {
            store
                .set(
                    &view.name,
                    MaterializationState::TableNoIndex,
                    Some(row_count),
                    Some(&failures.join("; ")),
                )
                .await?;
            Ok(MaterializationState::TableNoIndex)
        }
    }
}

async fn count_rows(db: &dyn Database, relation: &str) -> ServingResult<i64> {
    let result = db
        .query_bulk(&format!("SELECT COUNT(*) FROM {}", quote_qualified(relation)), &[])
        .await?;
    Ok(result.scalar().as_i64().unwrap_or(0))
}

#[cfg(test)]
#[path = "materialize_test.rs"]
mod tests;
