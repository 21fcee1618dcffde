//! Project discovery: configuration plus source definitions.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::names::SourceName;
use crate::source::{discover_sources, SourceFile};
use std::path::{Path, PathBuf};

/// A loaded Donorflow project
#[derive(Debug, Clone)]
pub struct Project {
    /// Project root directory
    pub root: PathBuf,

    /// Parsed donorflow.yml
    pub config: Config,

    /// Source system definitions, ordered by id
    pub sources: Vec<SourceFile>,
}

impl Project {
    /// Load a project from a directory containing donorflow.yml
    pub fn load(root: &Path) -> CoreResult<Self> {
        if !root.is_dir() {
            return Err(CoreError::ProjectNotFound {
                path: root.display().to_string(),
            });
        }
        let config = Config::load_from_dir(root)?;
        Self::with_config(root, config)
    }

    /// Load source definitions for an already-parsed configuration
    pub fn with_config(root: &Path, config: Config) -> CoreResult<Self> {
        let sources = discover_sources(&config.source_paths_absolute(root))?;
        if sources.is_empty() {
            log::warn!("No source definitions found under {:?}", config.source_paths);
        }
        Ok(Self {
            root: root.to_path_buf(),
            config,
            sources,
        })
    }

    /// Look up a source by name
    pub fn source(&self, name: &str) -> Option<&SourceFile> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Look up a source by its registered id
    pub fn source_by_id(&self, id: i32) -> Option<&SourceFile> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Source names in id order
    pub fn source_names(&self) -> Vec<&SourceName> {
        self.sources.iter().map(|s| &s.name).collect()
    }

    /// Absolute blob storage root
    pub fn storage_root(&self) -> PathBuf {
        self.config.storage_root_absolute(&self.root)
    }

    /// Absolute target directory (run state)
    pub fn target_dir(&self) -> PathBuf {
        self.config.target_path_absolute(&self.root)
    }
}
