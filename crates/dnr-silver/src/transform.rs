//! Raw records to typed silver rows.
//!
//! For one source and entity kind, every loaded raw record of every table
//! mapped to that kind is read in load order, coerced field by field, and
//! upserted on `(source_id, source_record_id)`. When the same natural key
//! appears more than once, the latest loaded file wins, then the later row.

use crate::coerce::coerce;
use crate::error::{TransformError, TransformResult};
use dnr_core::entity::{CONTACT_SOURCE_ID, SOURCE_RECORD_ID};
use dnr_core::{EntityKind, EntityMapping, FieldType, SourceFile};
use dnr_db::SqlValue;
use dnr_meta::Warehouse;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Row accounting for one transform call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformCounts {
    /// Raw records read
    pub read: usize,
    /// Silver rows inserted or updated
    pub written: usize,
    /// Records without a natural key value
    pub skipped_missing_key: usize,
    /// Values that failed coercion and were stored as NULL
    pub coerced_nulls: usize,
    /// Rows of this source referencing a contact id with no silver contact
    pub orphans: usize,
}

impl fmt::Display for TransformCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} read, {} written, {} missing key, {} nulled, {} orphans",
            self.read, self.written, self.skipped_missing_key, self.coerced_nulls, self.orphans
        )
    }
}

/// Writes silver entity tables
#[derive(Clone)]
pub struct Transformer {
    warehouse: Warehouse,
    batch_size: usize,
}

impl Transformer {
    pub fn new(warehouse: Warehouse, batch_size: usize) -> Self {
        Self {
            warehouse,
            batch_size: batch_size.max(1),
        }
    }

    /// Transform every entity kind the source maps, contacts first
    pub async fn transform_source(
        &self,
        source: &SourceFile,
    ) -> TransformResult<Vec<(EntityKind, TransformCounts)>> {
        let mut results = Vec::new();
        for kind in source.entity_kinds() {
            results.push((kind, self.transform(source, kind).await?));
        }
        Ok(results)
    }

    /// Transform one entity kind of one source
    pub async fn transform(
        &self,
        source: &SourceFile,
        kind: EntityKind,
    ) -> TransformResult<TransformCounts> {
        let source_id = self
            .warehouse
            .source_id(source.name.as_str())
            .await?
            .ok_or_else(|| TransformError::UnknownSource {
                name: source.name.to_string(),
            })?;

        let mappings: HashMap<&str, &EntityMapping> = source
            .mappings_for(kind)
            .into_iter()
            .map(|(table, mapping)| (table.name.as_str(), mapping))
            .collect();
        let mut counts = TransformCounts::default();
        if mappings.is_empty() {
            log::debug!("Source {} maps no tables to {kind}", source.name);
            return Ok(counts);
        }

        let mut tables: Vec<&str> = mappings.keys().copied().collect();
        tables.sort_unstable();
        let placeholders = vec!["?"; tables.len()].join(", ");
        let mut params = vec![SqlValue::from(source_id)];
        params.extend(tables.iter().map(|t| SqlValue::from(*t)));

        let raw = self
            .warehouse
            .db()
            .query_bulk(
                &format!(
                    "SELECT r.table_name, r.lineage_id, r.row_number, r.payload \
                     FROM raw.record r \
                     JOIN meta.file_lineage l ON l.lineage_id = r.lineage_id \
                     WHERE l.status = 'loaded' AND r.source_id = ? AND r.table_name IN ({placeholders}) \
                     ORDER BY l.loaded_at, l.started_at, r.lineage_id, r.row_number"
                ),
                &params,
            )
            .await?;

        let fields = kind.fields();
        let mut rows: Vec<Vec<SqlValue>> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();

        for record in &raw.rows {
            let table = record[0].as_str().unwrap_or_default();
            let lineage_id = record[1].to_text().unwrap_or_default();
            let row_number = record[2].as_i64().unwrap_or_default();
            let Some(mapping) = mappings.get(table) else {
                continue;
            };
            counts.read += 1;

            let payload: BTreeMap<String, String> =
                serde_json::from_str(record[3].as_str().unwrap_or_default()).map_err(|e| {
                    TransformError::CorruptPayload {
                        lineage_id: lineage_id.clone(),
                        row_number,
                        message: e.to_string(),
                    }
                })?;

            let Some(key) = mapping
                .columns
                .get(SOURCE_RECORD_ID)
                .and_then(|c| c.resolve(&payload))
            else {
                counts.skipped_missing_key += 1;
                log::debug!("{table} row {row_number} of lineage {lineage_id} has no {SOURCE_RECORD_ID}");
                continue;
            };

            let mut values = Vec::with_capacity(fields.len() + 3);
            values.push(SqlValue::from(source_id));
            for field in fields {
                if field.name == SOURCE_RECORD_ID {
                    values.push(SqlValue::from(key.as_str()));
                    continue;
                }
                let raw_value = mapping
                    .columns
                    .get(field.name)
                    .and_then(|c| c.resolve(&payload));
                let value = match raw_value {
                    None => SqlValue::Null,
                    Some(text) => coerce(field.ty, &text).unwrap_or_else(|| {
                        counts.coerced_nulls += 1;
                        log::debug!(
                            "{} {key}: invalid {} value {text:?} for {}, stored NULL",
                            source.name,
                            type_name(field.ty),
                            field.name
                        );
                        SqlValue::Null
                    }),
                };
                values.push(value);
            }
            if kind == EntityKind::Contact {
                values.push(SqlValue::Text(format!("{}:{key}", source.name)));
            }
            values.push(SqlValue::Text(lineage_id));

            match position.get(&key) {
                Some(&idx) => rows[idx] = values,
                None => {
                    position.insert(key, rows.len());
                    rows.push(values);
                }
            }
        }

        let sql = upsert_sql(kind);
        for chunk in rows.chunks(self.batch_size) {
            counts.written += self
                .warehouse
                .db()
                .execute_many(&sql, chunk.to_vec())
                .await?;
        }

        if kind.references_contact() {
            counts.orphans = self.count_orphans(kind, source_id).await?;
            if counts.orphans > 0 {
                log::warn!(
                    "{} {kind}: {} row(s) reference a contact missing from silver.contact",
                    source.name,
                    counts.orphans
                );
            }
        }

        log::info!("Transformed {} {kind}: {counts}", source.name);
        Ok(counts)
    }

    async fn count_orphans(&self, kind: EntityKind, source_id: i32) -> TransformResult<usize> {
        let result = self
            .warehouse
            .db()
            .query(
                &format!(
                    "SELECT COUNT(*) FROM {table} t WHERE t.source_id = ? AND NOT EXISTS ( \
                     SELECT 1 FROM silver.contact c \
                     WHERE c.source_id = t.source_id AND c.source_record_id = t.{CONTACT_SOURCE_ID})",
                    table = kind.table()
                ),
                &[SqlValue::from(source_id)],
            )
            .await?;
        Ok(result.scalar().as_i64().unwrap_or(0).max(0) as usize)
    }
}

fn type_name(ty: FieldType) -> &'static str {
    match ty {
        FieldType::Text => "text",
        FieldType::Email => "email",
        FieldType::Phone => "phone",
        FieldType::Date => "date",
        FieldType::Timestamp => "timestamp",
        FieldType::Amount => "amount",
        FieldType::Bool => "boolean",
    }
}

fn placeholder(ty: FieldType) -> String {
    match ty {
        FieldType::Date | FieldType::Timestamp | FieldType::Amount => {
            format!("CAST(? AS {})", ty.sql_type())
        }
        _ => "?".to_string(),
    }
}

/// `INSERT ... ON CONFLICT DO UPDATE` for one entity table
pub fn upsert_sql(kind: EntityKind) -> String {
    let mut columns = vec!["source_id".to_string()];
    let mut values = vec!["?".to_string()];
    for field in kind.fields() {
        columns.push(field.name.to_string());
        values.push(placeholder(field.ty));
    }
    if kind == EntityKind::Contact {
        columns.push("contact_id".to_string());
        values.push("?".to_string());
    }
    columns.push("lineage_id".to_string());
    values.push("?".to_string());

    let updates: Vec<String> = columns
        .iter()
        .filter(|c| *c != "source_id" && *c != SOURCE_RECORD_ID)
        .map(|c| format!("{c} = excluded.{c}"))
        .chain(std::iter::once("transformed_at = now()".to_string()))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT (source_id, {SOURCE_RECORD_ID}) DO UPDATE SET {}",
        kind.table(),
        columns.join(", "),
        values.join(", "),
        updates.join(", ")
    )
}

#[cfg(test)]
#[path = "transform_test.rs"]
mod tests;
