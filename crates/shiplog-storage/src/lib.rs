//! Storage for shiplog.
//!
//! - [`CatalogStore`]: persisted device catalog on redb, the store-backed
//!   [`CatalogProvider`](shiplog_core::CatalogProvider).
//! - [`CsvSink`]: append-only, date-partitioned CSV output of readings.

pub mod catalog_store;
pub mod error;
pub mod timeseries;

pub use catalog_store::{CatalogCounts, CatalogStore};
pub use error::{Error, Result};
pub use timeseries::CsvSink;

use std::sync::Arc;

use shiplog_core::catalog::{DynCatalog, StaticCatalog};
use shiplog_core::config::AppConfig;
use tracing::info;

/// Open the catalog backend selected by `ShipSettings.DBsource`.
///
/// Failing to open the persisted store is a startup error.
pub fn open_catalog(config: &AppConfig) -> Result<DynCatalog> {
    if config.ship.db_source {
        let store = CatalogStore::open(&config.storage.catalog_path)?;
        info!(path = %config.storage.catalog_path.display(), "using persisted catalog");
        Ok(Arc::new(store))
    } else {
        info!(
            sources = config.equipment.data_sources.len(),
            equipment = config.equipment.equipment.len(),
            variables = config.equipment.variables.len(),
            "using static catalog"
        );
        Ok(Arc::new(StaticCatalog::new(config.equipment.clone())))
    }
}
