//! Catalog abstraction over the device hierarchy.
//!
//! The scheduler walks sources, then equipment per source, then variables
//! per equipment, re-reading the catalog every cycle. Two backends exist:
//! [`StaticCatalog`] (configuration file) and the persisted store in
//! `shiplog-storage`. Which one runs is decided once at startup.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EquipmentSettings;
use crate::error::CatalogError;
use crate::model::{Equipment, Source, Variable};

/// Result type for catalog listings.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Shared catalog handle.
pub type DynCatalog = Arc<dyn CatalogProvider>;

/// Read access to the three-level device hierarchy.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Backend name for logging.
    fn kind(&self) -> &'static str;

    /// All sources, in listing order.
    async fn list_sources(&self) -> CatalogResult<Vec<Source>>;

    /// Equipment units hosted behind a source.
    async fn list_equipment(&self, source_id: u32) -> CatalogResult<Vec<Equipment>>;

    /// Variables of an equipment unit.
    async fn list_variables(&self, equipment_id: u32) -> CatalogResult<Vec<Variable>>;
}

/// Catalog backed by the `EquipmentSettings` section of the configuration.
///
/// Listings are deliberately unscoped: `list_equipment` returns every
/// declared equipment unit and `list_variables` every declared variable,
/// whatever parent id is asked for. The requested parent id is written into
/// each returned record so downstream code sees a consistent hierarchy.
/// Callers must not rely on filtering in this mode.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    settings: EquipmentSettings,
}

impl StaticCatalog {
    /// Create a catalog from configured settings.
    pub fn new(settings: EquipmentSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl CatalogProvider for StaticCatalog {
    fn kind(&self) -> &'static str {
        "static"
    }

    async fn list_sources(&self) -> CatalogResult<Vec<Source>> {
        Ok(self.settings.data_sources.clone())
    }

    async fn list_equipment(&self, source_id: u32) -> CatalogResult<Vec<Equipment>> {
        Ok(self
            .settings
            .equipment
            .iter()
            .map(|equipment| Equipment {
                source_id,
                ..equipment.clone()
            })
            .collect())
    }

    async fn list_variables(&self, equipment_id: u32) -> CatalogResult<Vec<Variable>> {
        Ok(self
            .settings
            .variables
            .iter()
            .map(|variable| Variable {
                equipment_id,
                ..variable.clone()
            })
            .collect())
    }
}
