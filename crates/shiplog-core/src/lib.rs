//! Core types and abstractions for shiplog.
//!
//! This crate defines the device hierarchy, the catalog abstraction both
//! catalog backends implement, the register decoding convention and the
//! configuration file model shared by every other crate.

pub mod catalog;
pub mod config;
pub mod decode;
pub mod error;
pub mod model;

pub use catalog::{CatalogProvider, CatalogResult, DynCatalog, StaticCatalog};
pub use config::{AppConfig, EquipmentSettings, ShipIdentity};
pub use decode::decode_f32;
pub use error::{CatalogError, ConfigError, DecodeError};
pub use model::{Equipment, Source, Variable};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::catalog::{CatalogProvider, CatalogResult, DynCatalog, StaticCatalog};
    pub use crate::config::{
        AppConfig, EquipmentSettings, ProtocolSettings, ShipIdentity, ShipSettings,
        StorageSettings, defaults, env_vars,
    };
    pub use crate::decode::{decode_f32, pair_to_f32};
    pub use crate::error::{CatalogError, ConfigError, DecodeError};
    pub use crate::model::{Equipment, Source, Variable};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
