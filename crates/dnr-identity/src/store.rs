//! Silver contact reads and identity map writes

use crate::error::{IdentityError, IdentityResult};
use crate::resolver::{ContactRecord, IdentityRow};
use dnr_core::entity::PROFILE_FIELDS;
use dnr_db::{Database, SqlStatement, SqlValue};
use std::collections::HashMap;

/// Every silver contact with its match values and primary-selection inputs
pub async fn load_contacts(db: &dyn Database) -> IdentityResult<Vec<ContactRecord>> {
    let profile: Vec<String> = PROFILE_FIELDS
        .iter()
        .map(|f| format!("CAST(c.{f} AS VARCHAR)"))
        .collect();
    let sql = format!(
        "SELECT c.contact_id, c.source_id, s.name, c.source_record_id, \
         c.email, c.alt_email, c.phone, c.alt_phone, \
         CAST(COALESCE(c.updated_at, c.created_at) AS VARCHAR), {} \
         FROM silver.contact c JOIN meta.source_system s ON s.source_id = c.source_id \
         ORDER BY c.contact_id",
        profile.join(", ")
    );
    let result = db.query_bulk(&sql, &[]).await?;

    Ok(result
        .rows
        .iter()
        .map(|row| ContactRecord {
            contact_id: row[0].to_text().unwrap_or_default(),
            source_id: row[1].as_i64().unwrap_or_default() as i32,
            source_name: row[2].to_text().unwrap_or_default(),
            source_record_id: row[3].to_text().unwrap_or_default(),
            emails: [&row[4], &row[5]]
                .iter()
                .filter_map(|v| v.to_text())
                .collect(),
            phones: [&row[6], &row[7]]
                .iter()
                .filter_map(|v| v.to_text())
                .collect(),
            updated_at: row[8].to_text(),
            completeness: row[9..]
                .iter()
                .filter(|v| v.as_str().is_some_and(|s| !s.trim().is_empty()))
                .count(),
        })
        .collect())
}

/// Contact id to master id from the current map
pub async fn load_previous(db: &dyn Database) -> IdentityResult<HashMap<String, String>> {
    let result = db
        .query_bulk("SELECT contact_id, master_id FROM silver.identity_map", &[])
        .await?;
    Ok(result
        .rows
        .iter()
        .filter_map(|row| Some((row[0].to_text()?, row[1].to_text()?)))
        .collect())
}

/// Replace the identity map with `rows` in one transaction
pub async fn save_identity_map(
    db: &dyn Database,
    rows: &[IdentityRow],
    batch_size: usize,
) -> IdentityResult<()> {
    check_primaries(rows)?;

    let mut statements = vec![SqlStatement::plain("DELETE FROM silver.identity_map")];
    for chunk in rows.chunks(batch_size.max(1)) {
        let placeholders = vec!["(?, ?, ?, ?, ?)"; chunk.len()].join(", ");
        let params = chunk
            .iter()
            .flat_map(|r| {
                [
                    SqlValue::from(r.contact_id.as_str()),
                    SqlValue::from(r.source_id),
                    SqlValue::from(r.source_record_id.as_str()),
                    SqlValue::from(r.master_id.as_str()),
                    SqlValue::Bool(r.is_primary),
                ]
            })
            .collect();
        statements.push(SqlStatement::new(
            format!(
                "INSERT INTO silver.identity_map \
                 (contact_id, source_id, source_record_id, master_id, is_primary) VALUES {placeholders}"
            ),
            params,
        ));
    }
    db.transaction(statements).await?;
    Ok(())
}

fn check_primaries(rows: &[IdentityRow]) -> IdentityResult<()> {
    let mut primaries: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        *primaries.entry(row.master_id.as_str()).or_default() += usize::from(row.is_primary);
    }
    match primaries.into_iter().find(|(_, n)| *n != 1) {
        Some((master_id, primaries)) => Err(IdentityError::PrimaryCount {
            master_id: master_id.to_string(),
            primaries,
        }),
        None => Ok(()),
    }
}
