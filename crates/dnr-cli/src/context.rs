//! Runtime context for CLI commands

use anyhow::{Context, Result};
use dnr_core::{Config, Project, SourceFile};
use dnr_db::Timeouts;
use dnr_meta::Warehouse;
use std::path::Path;

use crate::cli::GlobalArgs;

/// Loaded project plus an open, migrated warehouse
pub struct RuntimeContext {
    /// The loaded project
    pub project: Project,

    /// Warehouse shared by every stage
    pub warehouse: Warehouse,
}

impl RuntimeContext {
    /// Load the project and open its warehouse from global arguments
    pub async fn new(args: &GlobalArgs) -> Result<Self> {
        let project = load_project(args)?;
        let db = &project.config.database;
        log::debug!("Opening warehouse {} ({} connections)", db.path, db.pool_size);
        let warehouse = Warehouse::open(
            &db.path,
            db.pool_size,
            Timeouts {
                point: db.point_timeout(),
                bulk: db.bulk_timeout(),
            },
        )
        .await
        .context("Failed to open warehouse")?;

        Ok(Self { project, warehouse })
    }

    /// Sources selected by `--source`, in id order
    pub fn sources(&self, only: Option<&str>) -> Result<Vec<&SourceFile>> {
        match only {
            Some(name) => match self.project.source(name) {
                Some(source) => Ok(vec![source]),
                None => anyhow::bail!(
                    "Unknown source '{}'. Known sources: {}",
                    name,
                    self.project
                        .source_names()
                        .iter()
                        .map(|n| n.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            },
            None => Ok(self.project.sources.iter().collect()),
        }
    }
}

/// Load the project, applying `--config` and `--database` overrides
pub fn load_project(args: &GlobalArgs) -> Result<Project> {
    let project_path = Path::new(&args.project_dir);

    let mut config = if let Some(config_path) = &args.config {
        Config::load(Path::new(config_path)).context("Failed to load configuration file")?
    } else {
        Config::load_from_dir(project_path).context("Failed to load project configuration")?
    };
    if let Some(database) = &args.database {
        config.database.path = database.clone();
    }

    Project::with_config(project_path, config).context("Failed to load project")
}
