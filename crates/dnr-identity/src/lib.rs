//! dnr-identity - Identity resolver for Donorflow
//!
//! Clusters silver contacts from every source system into master identities
//! and persists the result as `silver.identity_map`.

pub mod error;
pub mod keys;
pub mod resolver;
pub mod store;

pub use error::{IdentityError, IdentityResult};
pub use keys::{KeyNormalizer, MatchKey};
pub use resolver::{resolve, ContactRecord, IdentityMap, IdentityReport, IdentityRow};

use dnr_core::config::IdentityConfig;
use dnr_meta::Warehouse;

/// Rows per INSERT statement when writing the identity map
const WRITE_BATCH: usize = 500;

/// Full-recompute identity resolution against the warehouse
pub struct IdentityResolver {
    warehouse: Warehouse,
    normalizer: KeyNormalizer,
}

impl IdentityResolver {
    pub fn new(warehouse: Warehouse, config: &IdentityConfig) -> Self {
        Self {
            warehouse,
            normalizer: KeyNormalizer::new(config),
        }
    }

    /// Read all silver contacts, resolve them in memory, and replace the
    /// identity map. Master ids of the previous map are carried over where
    /// the evidence still supports them.
    pub async fn resolve_identities(&self) -> IdentityResult<IdentityMap> {
        let db = self.warehouse.db().as_ref();
        let contacts = store::load_contacts(db).await?;
        let previous = store::load_previous(db).await?;
        log::info!(
            "Resolving {} contacts ({} previously mapped)",
            contacts.len(),
            previous.len()
        );

        let map = resolve(&contacts, &previous, &self.normalizer);
        store::save_identity_map(db, &map.rows, WRITE_BATCH).await?;

        let report = &map.report;
        log::info!(
            "Identity map: {} contacts -> {} masters ({} multi-source, {} unlinked, {} carried over)",
            report.contacts,
            report.masters,
            report.multi_source_masters,
            report.unlinked,
            report.carried_over
        );
        Ok(map)
    }
}
