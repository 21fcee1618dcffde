//! Embedded DDL migrations for the warehouse.
//!
//! Migrations are numbered and applied in order by
//! [`crate::migration::run_migrations`]. The silver tables are rendered from
//! the entity field lists so the table shapes and the transformer's column
//! mappings cannot drift apart.

use dnr_core::entity::{EntityKind, FieldSpec, SOURCE_RECORD_ID};
use std::borrow::Cow;

/// SQL body of a migration
pub enum MigrationSql {
    /// Raw SQL embedded with `include_str!`
    Embedded(&'static str),
    /// SQL rendered at startup
    Rendered(fn() -> String),
}

impl MigrationSql {
    pub fn render(&self) -> Cow<'static, str> {
        match self {
            MigrationSql::Embedded(sql) => Cow::Borrowed(sql),
            MigrationSql::Rendered(render) => Cow::Owned(render()),
        }
    }
}

/// A single DDL migration.
pub struct Migration {
    /// Sequential version number (1-based).
    pub version: i32,
    pub sql: MigrationSql,
}

/// All known migrations, in order.
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: MigrationSql::Embedded(include_str!("v001_meta_raw.sql")),
    },
    Migration {
        version: 2,
        sql: MigrationSql::Rendered(silver_ddl),
    },
    Migration {
        version: 3,
        sql: MigrationSql::Embedded(include_str!("v003_state.sql")),
    },
];

fn column_ddl(field: &FieldSpec) -> String {
    if field.name == SOURCE_RECORD_ID {
        format!("    {} VARCHAR NOT NULL", field.name)
    } else {
        format!("    {} {}", field.name, field.ty.sql_type())
    }
}

/// `CREATE TABLE` for one silver entity
pub fn silver_table_ddl(kind: EntityKind) -> String {
    let mut columns = vec!["    source_id INTEGER NOT NULL".to_string()];
    columns.extend(kind.fields().iter().map(column_ddl));
    if kind == EntityKind::Contact {
        columns.push("    contact_id VARCHAR NOT NULL".to_string());
    }
    columns.push("    lineage_id VARCHAR NOT NULL".to_string());
    columns.push("    transformed_at TIMESTAMP NOT NULL DEFAULT now()".to_string());
    columns.push("    PRIMARY KEY (source_id, source_record_id)".to_string());

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
        kind.table(),
        columns.join(",\n")
    )
}

fn silver_ddl() -> String {
    EntityKind::ALL
        .into_iter()
        .map(silver_table_ddl)
        .collect::<Vec<_>>()
        .join("\n")
}
