//! Configuration types and parsing for donorflow.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main pipeline configuration from donorflow.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Directories containing source system definitions (`kind: source`)
    #[serde(default = "default_source_paths")]
    pub source_paths: Vec<String>,

    /// Output directory for run state
    #[serde(default = "default_target_path")]
    pub target_path: String,

    /// Warehouse connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Blob storage location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Raw ingestion throttling and retry settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Identity resolution settings
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Guarded query interface limits
    #[serde(default)]
    pub query: QueryConfig,

    /// View materialization settings
    #[serde(default)]
    pub materialize: MaterializeConfig,
}

/// Warehouse connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database path (DuckDB file or :memory:)
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Number of pooled connections shared by all workers
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Timeout for point lookups and small statements
    #[serde(default = "default_point_timeout_secs")]
    pub point_timeout_secs: u64,

    /// Timeout for bulk copies, batch inserts, and DDL swaps
    #[serde(default = "default_bulk_timeout_secs")]
    pub bulk_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
            point_timeout_secs: default_point_timeout_secs(),
            bulk_timeout_secs: default_bulk_timeout_secs(),
        }
    }
}

impl DatabaseConfig {
    /// Point operation timeout as a [`Duration`]
    pub fn point_timeout(&self) -> Duration {
        Duration::from_secs(self.point_timeout_secs)
    }

    /// Bulk operation timeout as a [`Duration`]
    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_timeout_secs)
    }
}

/// Blob storage location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory holding `{source}/{filename}` blobs
    #[serde(default = "default_storage_root")]
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

/// What to do with a lineage row left in `loading` by a crashed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InconclusivePolicy {
    /// Discard the partial load and ingest the file again
    #[default]
    Reingest,
    /// Leave it alone and report the file for manual review
    Review,
}

/// Raw ingestion throttling and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Rows per insert batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between insert batches, in milliseconds
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Files ingested concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Attempts per batch before the file is marked failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff, in milliseconds
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Handling of lineage rows left in `loading`
    #[serde(default)]
    pub on_inconclusive: InconclusivePolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            workers: default_workers(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            on_inconclusive: InconclusivePolicy::default(),
        }
    }
}

impl IngestConfig {
    /// Delay between consecutive insert batches
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Backoff before retry number `attempt` (0-based): base * 2^attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.retry_base_ms.saturating_mul(factor))
    }
}

/// Identity resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// Phones with fewer digits are not used as match keys
    #[serde(default = "default_min_phone_digits")]
    pub min_phone_digits: usize,

    /// Placeholder emails that must never link two people
    #[serde(default)]
    pub ignored_emails: Vec<String>,

    /// Placeholder phones (digits only) that must never link two people
    #[serde(default)]
    pub ignored_phones: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            min_phone_digits: default_min_phone_digits(),
            ignored_emails: Vec::new(),
            ignored_phones: Vec::new(),
        }
    }
}

/// Guarded query interface limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Maximum rows returned by a guarded query
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Guarded query timeout in seconds
    #[serde(default = "default_query_timeout_secs")]
    pub timeout_secs: u64,

    /// Schemas a guarded query may read from
    #[serde(default = "default_allowed_schemas")]
    pub allowed_schemas: Vec<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            timeout_secs: default_query_timeout_secs(),
            allowed_schemas: default_allowed_schemas(),
        }
    }
}

/// View materialization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterializeConfig {
    /// Extra attempts per secondary index before giving up
    #[serde(default = "default_index_retries")]
    pub index_retries: u32,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            index_retries: default_index_retries(),
        }
    }
}

const DEFAULT_DB_PATH: &str = ":memory:";

fn default_source_paths() -> Vec<String> {
    vec!["sources".to_string()]
}

fn default_target_path() -> String {
    "target".to_string()
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_pool_size() -> usize {
    2
}

fn default_point_timeout_secs() -> u64 {
    30
}

fn default_bulk_timeout_secs() -> u64 {
    900
}

fn default_storage_root() -> String {
    "blobs".to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_batch_delay_ms() -> u64 {
    25
}

fn default_workers() -> usize {
    2
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_ms() -> u64 {
    250
}

fn default_min_phone_digits() -> usize {
    7
}

fn default_max_rows() -> usize {
    1000
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_allowed_schemas() -> Vec<String> {
    vec!["serving".to_string(), "gold".to_string()]
}

fn default_index_retries() -> u32 {
    2
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> CoreResult<Self> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| CoreError::ConfigParseError {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for donorflow.yml or donorflow.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("donorflow.yml");
        let yaml_path = dir.join("donorflow.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }
        if self.source_paths.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "At least one source_paths entry must be specified".to_string(),
            });
        }
        if self.database.pool_size == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "database.pool_size must be at least 1".to_string(),
            });
        }
        if self.ingest.batch_size == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "ingest.batch_size must be at least 1".to_string(),
            });
        }
        if self.ingest.workers == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "ingest.workers must be at least 1".to_string(),
            });
        }
        if self.query.max_rows == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "query.max_rows must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Get absolute source paths relative to a project root
    pub fn source_paths_absolute(&self, root: &Path) -> Vec<PathBuf> {
        self.source_paths.iter().map(|p| root.join(p)).collect()
    }

    /// Get the absolute storage root relative to a project root
    pub fn storage_root_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.storage.root)
    }

    /// Get absolute target path relative to a project root
    pub fn target_path_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.target_path)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
