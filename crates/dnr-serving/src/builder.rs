//! Serving view builder.
//!
//! Creates the catalog's views in dependency order with
//! `CREATE OR REPLACE VIEW`. A view that was materialized into a table is
//! dropped first, so defining views is also the refresh path back to
//! `view_only`.

use crate::catalog::{Catalog, ViewDef};
use crate::error::ServingResult;
use dnr_core::sql_utils::quote_qualified;
use dnr_db::{Database, RelationKind};
use dnr_meta::{MaterializationState, Warehouse};
use std::time::Instant;

/// Result of defining one view
#[derive(Debug, Clone)]
pub struct DefineResult {
    pub view: String,
    /// A physical table was dropped to make room for the view
    pub replaced_table: bool,
    pub duration_secs: f64,
}

/// Defines serving views from a [`Catalog`]
pub struct ViewBuilder<'a> {
    warehouse: &'a Warehouse,
    catalog: &'a Catalog,
}

impl<'a> ViewBuilder<'a> {
    pub fn new(warehouse: &'a Warehouse, catalog: &'a Catalog) -> Self {
        Self { warehouse, catalog }
    }

    /// Define `only` and its dependencies, or the whole catalog.
    ///
    /// Stops at the first view that fails; views already defined stay.
    pub async fn define_views(&self, only: Option<&str>) -> ServingResult<Vec<DefineResult>> {
        let db = self.warehouse.db();
        db.create_schema_if_not_exists(crate::catalog::SERVING_SCHEMA)
            .await?;

        let mut results = Vec::new();
        for view in self.catalog.selection(only)? {
            results.push(self.define(db.as_ref(), view).await?);
        }
        Ok(results)
    }

    async fn define(&self, db: &dyn Database, view: &ViewDef) -> ServingResult<DefineResult> {
        let start = Instant::now();
        let qualified = view.qualified();

        let replaced_table = db.relation_kind(&qualified).await? == Some(RelationKind::Table);
        if replaced_table {
            log::info!("Dropping materialized table {qualified} before redefining it");
            db.drop_if_exists(&qualified).await?;
        }

        db.execute(
            &format!(
                "CREATE OR REPLACE VIEW {} AS {}",
                quote_qualified(&qualified),
                view.sql
            ),
            &[],
        )
        .await?;

        self.warehouse
            .materializations()
            .set(&view.name, MaterializationState::ViewOnly, None, None)
            .await?;
        log::debug!("Defined view {qualified}");

        Ok(DefineResult {
            view: view.name.clone(),
            replaced_table,
            duration_secs: start.elapsed().as_secs_f64(),
        })
    }
}
