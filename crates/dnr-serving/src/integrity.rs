//! Integrity summary over the silver layer, the identity map and the serving
//! relations.
//!
//! Data-quality figures (unlinked transactions, contacts without keys) are
//! reported but never fail a check; the checks fail only on states the
//! pipeline itself should never produce.

use crate::catalog::Catalog;
use crate::error::ServingResult;
use dnr_core::config::IdentityConfig;
use dnr_core::sql_utils::quote_qualified;
use dnr_core::EntityKind;
use dnr_db::{Database, SqlValue};
use dnr_identity::{store, KeyNormalizer};
use dnr_meta::Warehouse;
use std::fmt;

/// Linked share of one transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linkage {
    pub kind: EntityKind,
    pub total: i64,
    /// Rows whose contact resolved to a master identity
    pub linked: i64,
}

impl Linkage {
    pub fn unlinked(&self) -> i64 {
        self.total - self.linked
    }

    /// Linked percentage; 100 when there are no rows
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.linked as f64 * 100.0 / self.total as f64
        }
    }
}

/// One pass/fail check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "{mark} {}: {}", self.name, self.detail)
    }
}

/// Everything `dnr pipeline` prints at the end of a run
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    /// Row count per serving relation, `None` when it does not exist
    pub row_counts: Vec<(String, Option<i64>)>,
    pub linkage: Vec<Linkage>,
    /// Normalized emails held by more than one master id
    pub duplicate_identity_keys: i64,
    /// Contacts with no usable email and no usable phone, as the resolver
    /// sees them
    pub unlinked_contacts: i64,
    pub checks: Vec<CheckResult>,
}

impl IntegrityReport {
    pub fn unlinked_transactions(&self) -> i64 {
        self.linkage.iter().map(Linkage::unlinked).sum()
    }

    /// Linked percentage over all transaction kinds
    pub fn overall_linked_percent(&self) -> f64 {
        let total: i64 = self.linkage.iter().map(|l| l.total).sum();
        let linked: i64 = self.linkage.iter().map(|l| l.linked).sum();
        if total == 0 {
            100.0
        } else {
            linked as f64 * 100.0 / total as f64
        }
    }

    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

/// Computes an [`IntegrityReport`]
pub struct IntegrityChecker<'a> {
    warehouse: &'a Warehouse,
    catalog: &'a Catalog,
    ignored_emails: Vec<String>,
    normalizer: KeyNormalizer,
}

impl<'a> IntegrityChecker<'a> {
    pub fn new(warehouse: &'a Warehouse, catalog: &'a Catalog, identity: &IdentityConfig) -> Self {
        Self {
            warehouse,
            catalog,
            ignored_emails: identity
                .ignored_emails
                .iter()
                .map(|e| e.trim().to_lowercase())
                .collect(),
            normalizer: KeyNormalizer::new(identity),
        }
    }

    pub async fn run(&self) -> ServingResult<IntegrityReport> {
        let db = self.warehouse.db().as_ref();
        let mut report = IntegrityReport::default();

        for view in self.catalog.ordered()? {
            let qualified = view.qualified();
            let count = if db.relation_exists(&qualified).await? {
                let sql = format!("SELECT COUNT(*) FROM {}", quote_qualified(&qualified));
                Some(scalar(db, &sql, &[]).await?)
            } else {
                None
            };
            report.row_counts.push((qualified, count));
        }

        for kind in EntityKind::transactional() {
            let result = db
                .query(
                    &format!(
                        "SELECT COUNT(*), COUNT(im.contact_id) FROM {} AS t \
                         LEFT JOIN silver.identity_map AS im \
                           ON im.source_id = t.source_id AND im.source_record_id = t.contact_source_id",
                        kind.table()
                    ),
                    &[],
                )
                .await?;
            let row = result.rows.first();
            report.linkage.push(Linkage {
                kind,
                total: row.and_then(|r| r[0].as_i64()).unwrap_or(0),
                linked: row.and_then(|r| r[1].as_i64()).unwrap_or(0),
            });
        }

        report.duplicate_identity_keys = self.duplicate_identity_keys(db).await?;
        report.unlinked_contacts = store::load_contacts(db)
            .await?
            .iter()
            .filter(|c| c.match_keys(&self.normalizer).is_empty())
            .count() as i64;

        let missing: Vec<&str> = report
            .row_counts
            .iter()
            .filter(|(_, count)| count.is_none())
            .map(|(name, _)| name.as_str())
            .collect();
        report.checks.push(CheckResult {
            name: "serving_relations_exist",
            passed: missing.is_empty(),
            detail: if missing.is_empty() {
                format!("{} relations", report.row_counts.len())
            } else {
                format!("missing {}", missing.join(", "))
            },
        });

        let unmapped = scalar(
            db,
            "SELECT COUNT(*) FROM silver.contact AS c \
             WHERE NOT EXISTS (SELECT 1 FROM silver.identity_map AS im WHERE im.contact_id = c.contact_id)",
            &[],
        )
        .await?;
        report.checks.push(CheckResult {
            name: "contacts_resolved",
            passed: unmapped == 0,
            detail: format!("{unmapped} contacts without an identity"),
        });

        let bad_primaries = scalar(
            db,
            "SELECT COUNT(*) FROM ( \
               SELECT master_id FROM silver.identity_map GROUP BY master_id \
               HAVING COUNT(*) FILTER (WHERE is_primary) <> 1 \
             )",
            &[],
        )
        .await?;
        report.checks.push(CheckResult {
            name: "single_primary_per_master",
            passed: bad_primaries == 0,
            detail: format!("{bad_primaries} masters without exactly one primary"),
        });

        report.checks.push(CheckResult {
            name: "identity_keys_unique",
            passed: report.duplicate_identity_keys == 0,
            detail: format!(
                "{} emails under more than one master",
                report.duplicate_identity_keys
            ),
        });

        if let Some(Some(detail_rows)) = report
            .row_counts
            .iter()
            .find(|(name, _)| name == "serving.donation_detail")
            .map(|(_, count)| *count)
        {
            let linked = report
                .linkage
                .iter()
                .find(|l| l.kind == EntityKind::Donation)
                .map(|l| l.linked)
                .unwrap_or(0);
            report.checks.push(CheckResult {
                name: "donation_detail_matches_linked",
                passed: detail_rows == linked,
                detail: format!("{detail_rows} detail rows, {linked} linked donations"),
            });
        }

        for check in &report.checks {
            if check.passed {
                log::debug!("{check}");
            } else {
                log::warn!("{check}");
            }
        }
        Ok(report)
    }

    async fn duplicate_identity_keys(&self, db: &dyn Database) -> ServingResult<i64> {
        let placeholders = vec!["?"; self.ignored_emails.len()].join(", ");
        let ignored = if self.ignored_emails.is_empty() {
            String::new()
        } else {
            format!("AND k.email NOT IN ({placeholders})")
        };
        let params: Vec<SqlValue> = self
            .ignored_emails
            .iter()
            .map(|e| SqlValue::from(e.as_str()))
            .collect();
        scalar(
            db,
            &format!(
                "SELECT COUNT(*) FROM ( \
                   SELECT k.email FROM ( \
                     SELECT contact_id, lower(trim(email)) AS email FROM silver.contact WHERE email IS NOT NULL \
                     UNION ALL \
                     SELECT contact_id, lower(trim(alt_email)) AS email FROM silver.contact WHERE alt_email IS NOT NULL \
                   ) AS k \
                   JOIN silver.identity_map AS im ON im.contact_id = k.contact_id \
                   WHERE k.email <> '' {ignored} \
                   GROUP BY k.email \
                   HAVING COUNT(DISTINCT im.master_id) > 1 \
                 )"
            ),
            &params,
        )
        .await
    }
}

async fn scalar(db: &dyn Database, sql: &str, params: &[SqlValue]) -> ServingResult<i64> {
    Ok(db.query(sql, params).await?.scalar().as_i64().unwrap_or(0))
}

#[cfg(test)]
#[path = "integrity_test.rs"]
mod tests;
