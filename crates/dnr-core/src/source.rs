//! Source system definitions
//!
//! Each source system (Keap, Givebutter, Stripe, ...) is described by one
//! YAML file with `kind: source`. The file says how its exports are laid out
//! in blob storage, which file names to ignore, where the header row sits,
//! and how each export's columns map onto silver entities.

use crate::entity::{EntityKind, SOURCE_RECORD_ID};
use crate::error::{CoreError, CoreResult};
use crate::names::SourceName;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A source definition file (from .yml with kind: source)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceFile {
    /// Must be "source" - enforced during parsing
    pub kind: SourceKind,

    /// Stable numeric id, registered once in `meta.source_system`
    pub id: i32,

    /// Source system name; also the blob key prefix
    pub name: SourceName,

    /// Description of the source system
    #[serde(default)]
    pub description: Option<String>,

    /// Export file format
    #[serde(default)]
    pub format: SourceFormat,

    /// Field delimiter for CSV exports
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// File name prefixes to skip (redundant export passes, temp files)
    #[serde(default)]
    pub exclude_prefixes: Vec<String>,

    /// Export tables produced by this source
    pub tables: Vec<SourceTable>,

    /// Path the definition was loaded from
    #[serde(skip)]
    pub path: PathBuf,
}

/// Enforces kind: source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Source,
}

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Delimited text with a header row
    #[default]
    Csv,
    /// `<row><field name="...">value</field></row>` tag dump
    Xml,
}

impl SourceFormat {
    /// File extensions treated as data files for this format
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            SourceFormat::Csv => &["csv", "txt", "tsv"],
            SourceFormat::Xml => &["xml"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Xml => "xml",
        }
    }
}

fn default_delimiter() -> char {
    ','
}

/// One export table within a source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceTable {
    /// Logical table name (recorded on lineage rows)
    pub name: String,

    /// Blob file names starting with this prefix belong to the table
    pub file_prefix: String,

    /// Number of non-blank records before the header (instructional preamble)
    #[serde(default)]
    pub header_row: usize,

    /// Silver entities populated from this table
    #[serde(default)]
    pub entities: Vec<EntityMapping>,
}

/// Mapping of one export table onto one silver entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityMapping {
    /// Target entity kind
    pub kind: EntityKind,

    /// Silver column -> source column(s)
    pub columns: BTreeMap<String, ColumnSource>,
}

/// Source column(s) feeding one silver column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ColumnSource {
    /// A single source column
    Single(String),
    /// Several source columns joined with `|` (composite natural keys)
    Composite(Vec<String>),
}

impl ColumnSource {
    /// Resolve the value from a raw payload; `None` when every part is blank
    pub fn resolve(&self, payload: &BTreeMap<String, String>) -> Option<String> {
        match self {
            ColumnSource::Single(col) => payload
                .get(col)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            ColumnSource::Composite(cols) => {
                let parts: Vec<&str> = cols
                    .iter()
                    .map(|c| payload.get(c).map(|v| v.trim()).unwrap_or(""))
                    .collect();
                if parts.iter().all(|p| p.is_empty()) {
                    None
                } else {
                    Some(parts.join("|"))
                }
            }
        }
    }
}

impl SourceFile {
    /// Load and validate a source file from a path
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut source = Self::from_yaml(&content, path)?;
        source.path = path.to_path_buf();
        Ok(source)
    }

    /// Parse and validate a source definition from YAML text
    pub fn from_yaml(content: &str, path: &Path) -> CoreResult<Self> {
        let raw: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| CoreError::SourceParseError {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;
        if raw.get("kind").is_none() {
            return Err(CoreError::SourceMissingKind {
                path: path.display().to_string(),
            });
        }

        let source: SourceFile =
            serde_yaml::from_value(raw).map_err(|e| CoreError::SourceParseError {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;
        source.validate(path)?;
        Ok(source)
    }

    fn validate(&self, path: &Path) -> CoreResult<()> {
        if self.tables.is_empty() {
            return Err(CoreError::SourceEmptyTables {
                name: self.name.to_string(),
                path: path.display().to_string(),
            });
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(CoreError::SourceDuplicateTable {
                    table: table.name.clone(),
                    source_name: self.name.to_string(),
                });
            }
            for mapping in &table.entities {
                if !mapping.columns.contains_key(SOURCE_RECORD_ID) {
                    return Err(CoreError::SourceMissingMapping {
                        source_name: self.name.to_string(),
                        table: table.name.clone(),
                        entity: mapping.kind.to_string(),
                        column: SOURCE_RECORD_ID.to_string(),
                    });
                }
                for column in mapping.columns.keys() {
                    if mapping.kind.field(column).is_none() {
                        return Err(CoreError::SourceUnknownColumn {
                            source_name: self.name.to_string(),
                            table: table.name.clone(),
                            entity: mapping.kind.to_string(),
                            column: column.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Find the table a blob file belongs to (longest matching prefix wins)
    pub fn table_for_file(&self, file_name: &str) -> Option<&SourceTable> {
        let lower = file_name.to_lowercase();
        self.tables
            .iter()
            .filter(|t| lower.starts_with(&t.file_prefix.to_lowercase()))
            .max_by_key(|t| t.file_prefix.len())
    }

    /// Find a table by logical name
    pub fn table(&self, name: &str) -> Option<&SourceTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Tables (with the relevant mapping) that feed a given entity kind
    pub fn mappings_for(&self, kind: EntityKind) -> Vec<(&SourceTable, &EntityMapping)> {
        self.tables
            .iter()
            .flat_map(|t| {
                t.entities
                    .iter()
                    .filter(move |m| m.kind == kind)
                    .map(move |m| (t, m))
            })
            .collect()
    }

    /// Entity kinds this source populates, in canonical order
    pub fn entity_kinds(&self) -> Vec<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .filter(|k| !self.mappings_for(*k).is_empty())
            .collect()
    }
}

/// Discover all source files in the given directories
pub fn discover_sources(source_paths: &[PathBuf]) -> CoreResult<Vec<SourceFile>> {
    let mut sources: Vec<SourceFile> = Vec::new();
    let mut by_name: HashMap<String, PathBuf> = HashMap::new();
    let mut by_id: HashMap<i32, PathBuf> = HashMap::new();

    for dir in source_paths {
        if !dir.exists() {
            log::debug!("Source path {} does not exist, skipping", dir.display());
            continue;
        }
        let mut paths = Vec::new();
        collect_yaml_files(dir, &mut paths)?;
        paths.sort();

        for path in paths {
            let source = SourceFile::load(&path)?;
            if let Some(prev) = by_name.insert(source.name.to_string(), path.clone()) {
                return Err(CoreError::SourceDuplicate {
                    name: source.name.to_string(),
                    path1: prev.display().to_string(),
                    path2: path.display().to_string(),
                });
            }
            if let Some(prev) = by_id.insert(source.id, path.clone()) {
                return Err(CoreError::SourceDuplicate {
                    name: format!("id {}", source.id),
                    path1: prev.display().to_string(),
                    path2: path.display().to_string(),
                });
            }
            sources.push(source);
        }
    }

    sources.sort_by_key(|s| s.id);
    Ok(sources)
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> CoreResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|e| e == "yml" || e == "yaml")
        {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "source_test.rs"]
mod tests;
