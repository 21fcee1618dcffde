//! Declarative catalog of serving views.
//!
//! Each view is a name, a SELECT body and the index columns it gets once
//! materialized. Dependencies are not declared by hand: they are read from
//! the SQL with the parser, so a view that selects from another serving view
//! is always ordered after it.

use crate::error::{ServingError, ServingResult};
use dnr_core::ViewDag;
use dnr_sql::{extract_cte_names, extract_dependencies, SqlParser};
use std::collections::BTreeMap;

/// Schema holding the serving views
pub const SERVING_SCHEMA: &str = "serving";

/// Schemas a serving view may read from besides `serving`
const SOURCE_SCHEMAS: &[&str] = &["silver", "meta"];

/// One serving view
#[derive(Debug, Clone)]
pub struct ViewDef {
    pub name: String,
    pub sql: String,
    /// Column lists of the secondary indexes built after materialization
    pub indexes: Vec<Vec<String>>,
    /// Relations the SQL reads, schema-qualified, CTE names excluded
    pub relations: Vec<String>,
}

impl ViewDef {
    /// `serving.<name>`
    pub fn qualified(&self) -> String {
        format!("{SERVING_SCHEMA}.{}", self.name)
    }

    /// Serving views this view selects from, unqualified
    pub fn serving_dependencies(&self) -> Vec<&str> {
        self.relations
            .iter()
            .filter_map(|r| r.strip_prefix("serving."))
            .collect()
    }

    /// Name of the scratch table used while copying
    pub fn temp_table(&self) -> String {
        format!("{SERVING_SCHEMA}.__mat_{}", self.name)
    }

    /// Index name for one column list
    pub fn index_name(&self, columns: &[String]) -> String {
        format!("idx_{}_{}", self.name, columns.join("_"))
    }
}

/// Ordered set of serving views
#[derive(Debug)]
pub struct Catalog {
    views: BTreeMap<String, ViewDef>,
    dag: ViewDag,
}

impl Catalog {
    /// The catalog shipped with Donorflow
    pub fn standard() -> ServingResult<Self> {
        Self::from_definitions(standard_definitions())
    }

    /// Build a catalog from `(name, sql, indexes)` entries.
    ///
    /// Every relation a view reads must be a silver/meta table or another
    /// view of the same catalog; cycles are rejected.
    pub fn from_definitions(
        definitions: Vec<(String, String, Vec<Vec<String>>)>,
    ) -> ServingResult<Self> {
        let parser = SqlParser::duckdb();
        let mut parsed = Vec::with_capacity(definitions.len());
        for (name, sql, indexes) in definitions {
            let statement = parser.parse_single(&sql)?;
            let statements = std::slice::from_ref(&statement);
            let ctes = extract_cte_names(statements);
            let relations: Vec<String> = extract_dependencies(statements)
                .into_iter()
                .filter(|r| !ctes.contains(r))
                .map(|r| r.to_lowercase())
                .collect();
            parsed.push(ViewDef {
                name,
                sql,
                indexes,
                relations,
            });
        }

        let names: Vec<String> = parsed.iter().map(|v| v.name.clone()).collect();
        let mut views = BTreeMap::new();
        for view in parsed {
            for relation in &view.relations {
                let (schema, table) = relation.split_once('.').unwrap_or(("", relation));
                let known = if schema == SERVING_SCHEMA {
                    names.iter().any(|n| n == table)
                } else {
                    SOURCE_SCHEMAS.contains(&schema)
                };
                if !known {
                    return Err(ServingError::Catalog {
                        view: view.name.clone(),
                        message: format!("reads unknown relation '{relation}'"),
                    });
                }
            }
            if views.contains_key(&view.name) {
                return Err(ServingError::Catalog {
                    view: view.name.clone(),
                    message: "defined twice".to_string(),
                });
            }
            views.insert(view.name.clone(), view);
        }

        let dependencies: BTreeMap<String, Vec<String>> = views
            .values()
            .map(|v| {
                let deps = v
                    .serving_dependencies()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                (v.name.clone(), deps)
            })
            .collect();
        let dag = ViewDag::build(&dependencies)?;

        Ok(Self { views, dag })
    }

    pub fn get(&self, name: &str) -> ServingResult<&ViewDef> {
        let bare = name.strip_prefix("serving.").unwrap_or(name);
        self.views.get(bare).ok_or_else(|| ServingError::ViewNotFound {
            name: name.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// All views, dependencies first
    pub fn ordered(&self) -> ServingResult<Vec<&ViewDef>> {
        self.dag
            .topological_order()?
            .iter()
            .map(|name| self.get(name.as_str()))
            .collect()
    }

    /// `only` and everything it selects from, dependencies first; the whole
    /// catalog when `only` is `None`
    pub fn selection(&self, only: Option<&str>) -> ServingResult<Vec<&ViewDef>> {
        match only {
            None => self.ordered(),
            Some(name) => {
                let view = self.get(name)?;
                self.dag
                    .with_ancestors(&view.name)?
                    .iter()
                    .map(|name| self.get(name.as_str()))
                    .collect()
            }
        }
    }
}

fn index(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

/// Display name of each master: the primary contact's name, falling back to
/// its organization and email
const PRIMARY_NAME: &str = "SELECT p.master_id, \
     COALESCE(NULLIF(TRIM(c.full_name), ''), \
              NULLIF(TRIM(concat_ws(' ', c.first_name, c.last_name)), ''), \
              c.organization, c.email) AS display_name \
     FROM silver.identity_map AS p \
     JOIN silver.contact AS c ON c.source_id = p.source_id AND c.source_record_id = p.source_record_id \
     WHERE p.is_primary";

/// Transaction rows of one silver table joined to their master identity.
/// The inner join drops transactions whose contact was never resolved.
fn detail_sql(table: &str, columns: &[&str]) -> String {
    let projected: Vec<String> = columns.iter().map(|c| format!("t.{c}")).collect();
    format!(
        "SELECT im.master_id, pn.display_name, t.source_id, ss.name AS source_name, \
         t.source_record_id, t.contact_source_id, {} \
         FROM {table} AS t \
         JOIN silver.identity_map AS im \
           ON im.source_id = t.source_id AND im.source_record_id = t.contact_source_id \
         JOIN meta.source_system AS ss ON ss.source_id = t.source_id \
         LEFT JOIN ({PRIMARY_NAME}) AS pn ON pn.master_id = im.master_id",
        projected.join(", ")
    )
}

fn standard_definitions() -> Vec<(String, String, Vec<Vec<String>>)> {
    vec![
        (
            "donation_detail".to_string(),
            detail_sql(
                "silver.donation",
                &[
                    "amount",
                    "currency",
                    "donated_at",
                    "campaign",
                    "fund",
                    "payment_method",
                    "is_recurring",
                    "status",
                ],
            ),
            vec![index(&["master_id"]), index(&["donated_at"])],
        ),
        (
            "order_detail".to_string(),
            detail_sql(
                "silver.store_order",
                &[
                    "order_number",
                    "total_amount",
                    "currency",
                    "ordered_at",
                    "status",
                    "channel",
                ],
            ),
            vec![index(&["master_id"])],
        ),
        (
            "subscription_detail".to_string(),
            detail_sql(
                "silver.subscription",
                &[
                    "plan_name",
                    "amount",
                    "billing_interval",
                    "status",
                    "started_at",
                    "canceled_at",
                ],
            ),
            vec![index(&["master_id"])],
        ),
        (
            "tag_detail".to_string(),
            detail_sql("silver.tag", &["tag_name", "category", "tagged_at"]),
            vec![index(&["master_id"]), index(&["tag_name"])],
        ),
        (
            "communication_detail".to_string(),
            detail_sql(
                "silver.communication",
                &["channel", "direction", "subject", "status", "sent_at"],
            ),
            vec![index(&["master_id"])],
        ),
        (
            "donor_summary".to_string(),
            "SELECT master_id, MAX(display_name) AS display_name, \
             COUNT(*) AS donation_count, \
             SUM(amount) AS total_given, \
             AVG(amount) AS average_gift, \
             MAX(amount) AS largest_gift, \
             MIN(donated_at) AS first_gift_at, \
             MAX(donated_at) AS last_gift_at, \
             COUNT(DISTINCT source_id) AS source_count \
             FROM serving.donation_detail \
             GROUP BY master_id"
                .to_string(),
            vec![index(&["master_id"])],
        ),
        (
            "donor_summary_monthly".to_string(),
            "SELECT master_id, CAST(date_trunc('month', donated_at) AS DATE) AS gift_month, \
             COUNT(*) AS donation_count, \
             SUM(amount) AS total_given \
             FROM serving.donation_detail \
             WHERE donated_at IS NOT NULL \
             GROUP BY master_id, CAST(date_trunc('month', donated_at) AS DATE)"
                .to_string(),
            vec![index(&["master_id", "gift_month"])],
        ),
        (
            "tag_summary".to_string(),
            "SELECT tag_name, category, \
             COUNT(DISTINCT master_id) AS people, \
             COUNT(*) AS assignments, \
             MAX(tagged_at) AS last_tagged_at \
             FROM serving.tag_detail \
             GROUP BY tag_name, category"
                .to_string(),
            vec![index(&["tag_name"])],
        ),
        (
            "person_360".to_string(),
            format!(
                "SELECT ids.master_id, pn.display_name, ids.contact_count, ids.source_count, \
                 ids.sources, \
                 COALESCE(ds.donation_count, 0) AS donation_count, \
                 COALESCE(ds.total_given, 0) AS total_given, \
                 ds.first_gift_at, ds.last_gift_at, \
                 COALESCE(os.order_count, 0) AS order_count, \
                 COALESCE(os.order_total, 0) AS order_total, \
                 COALESCE(ss.active_subscriptions, 0) AS active_subscriptions, \
                 ts.tags, \
                 COALESCE(cs.communication_count, 0) AS communication_count, \
                 cs.last_contacted_at \
                 FROM ( \
                   SELECT im.master_id, COUNT(*) AS contact_count, \
                   COUNT(DISTINCT im.source_id) AS source_count, \
                   array_to_string(list_sort(list_distinct(list(src.name))), ', ') AS sources \
                   FROM silver.identity_map AS im \
                   JOIN meta.source_system AS src ON src.source_id = im.source_id \
                   GROUP BY im.master_id \
                 ) AS ids \
                 LEFT JOIN ({PRIMARY_NAME}) AS pn ON pn.master_id = ids.master_id \
                 LEFT JOIN serving.donor_summary AS ds ON ds.master_id = ids.master_id \
                 LEFT JOIN ( \
                   SELECT master_id, COUNT(*) AS order_count, SUM(total_amount) AS order_total \
                   FROM serving.order_detail GROUP BY master_id \
                 ) AS os ON os.master_id = ids.master_id \
                 LEFT JOIN ( \
                   SELECT master_id, COUNT(*) AS active_subscriptions \
                   FROM serving.subscription_detail \
                   WHERE canceled_at IS NULL AND COALESCE(lower(status), 'active') = 'active' \
                   GROUP BY master_id \
                 ) AS ss ON ss.master_id = ids.master_id \
                 LEFT JOIN ( \
                   SELECT master_id, array_to_string(list_sort(list_distinct(list(tag_name))), ', ') AS tags \
                   FROM serving.tag_detail WHERE tag_name IS NOT NULL GROUP BY master_id \
                 ) AS ts ON ts.master_id = ids.master_id \
                 LEFT JOIN ( \
                   SELECT master_id, COUNT(*) AS communication_count, MAX(sent_at) AS last_contacted_at \
                   FROM serving.communication_detail GROUP BY master_id \
                 ) AS cs ON cs.master_id = ids.master_id"
            ),
            vec![index(&["master_id"])],
        ),
    ]
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
