//! Configuration loading.
//!
//! The configuration file is TOML with four tables:
//!
//! ```toml
//! [ShipSettings]
//! ClientID = "ACME"
//! ShipID = "SHIP01"
//! DBsource = false          # true: read the hierarchy from the catalog store
//! ReadingInterval = "30s"
//!
//! [EquipmentSettings]
//! DataSources  = [{ Id = 1, Name = "PLC-1", Address = "10.0.0.5", Port = 502 }]
//! Equipamentos = [{ Id = 1, Name = "Engine", Alias = "ENG" }]
//! Variaveis    = [{ Id = 1, Name = "RPM", Alias = "rpm", StartAddress = 0, RegisterCount = 2 }]
//!
//! [ProtocolSettings]
//! UnitId = 1
//! Timeout = "5s"
//!
//! [StorageSettings]
//! CatalogPath = "data/catalog.redb"
//! OutputDir = "."
//! ```
//!
//! Values are layered: file, then environment overrides (see [`env_vars`]),
//! then [`AppConfig::validate`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::IntoDeserializer;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::model::{Equipment, Source, Variable};

/// Default values.
pub mod defaults {
    /// Default configuration file name.
    pub const CONFIG_FILE: &str = "shiplog.toml";
    /// Default cycle interval in seconds.
    pub const READING_INTERVAL_SECS: u64 = 60;
    /// Default Modbus unit identifier.
    pub const UNIT_ID: u8 = 1;
    /// Default session timeout in seconds (connect + read + close).
    pub const TIMEOUT_SECS: u64 = 5;
    /// Default catalog database path.
    pub const CATALOG_PATH: &str = "data/catalog.redb";
    /// Default root for the `vars/` output tree.
    pub const OUTPUT_DIR: &str = ".";
}

/// Environment variable names.
pub mod env_vars {
    /// Configuration file path.
    pub const CONFIG: &str = "SHIPLOG_CONFIG";
    /// Emit JSON logs when `true`.
    pub const LOG_JSON: &str = "SHIPLOG_LOG_JSON";
    /// Overrides `ShipSettings.DBsource`.
    pub const DB_SOURCE: &str = "SHIPLOG_DB_SOURCE";
    /// Overrides `ShipSettings.ReadingInterval` (humantime, e.g. `30s`).
    pub const READING_INTERVAL: &str = "SHIPLOG_READING_INTERVAL";
    /// Overrides `StorageSettings.OutputDir`.
    pub const OUTPUT_DIR: &str = "SHIPLOG_OUTPUT_DIR";
    /// Overrides `StorageSettings.CatalogPath`.
    pub const CATALOG_PATH: &str = "SHIPLOG_CATALOG_PATH";
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "ShipSettings")]
    pub ship: ShipSettings,

    #[serde(rename = "EquipmentSettings", default)]
    pub equipment: EquipmentSettings,

    #[serde(rename = "ProtocolSettings", default)]
    pub protocol: ProtocolSettings,

    #[serde(rename = "StorageSettings", default)]
    pub storage: StorageSettings,
}

/// Vessel identity and polling mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipSettings {
    #[serde(rename = "ClientID")]
    pub client_id: String,

    #[serde(rename = "ShipID")]
    pub ship_id: String,

    /// Read the hierarchy from the persisted catalog instead of this file.
    #[serde(rename = "DBsource", default)]
    pub db_source: bool,

    /// Pause between the end of one cycle and the start of the next.
    #[serde(
        rename = "ReadingInterval",
        with = "humantime_serde",
        default = "default_reading_interval"
    )]
    pub reading_interval: Duration,
}

/// Statically declared device hierarchy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquipmentSettings {
    #[serde(rename = "DataSources", default)]
    pub data_sources: Vec<Source>,

    #[serde(rename = "Equipamentos", default)]
    pub equipment: Vec<Equipment>,

    #[serde(rename = "Variaveis", default)]
    pub variables: Vec<Variable>,
}

/// Field protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolSettings {
    /// Unit identifier sent with every request.
    #[serde(rename = "UnitId", default = "default_unit_id")]
    pub unit_id: u8,

    /// Upper bound for one session (connect, read and close).
    #[serde(rename = "Timeout", with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            unit_id: default_unit_id(),
            timeout: default_timeout(),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// redb catalog database, used when `DBsource` is set and by the
    /// `catalog` commands.
    #[serde(rename = "CatalogPath", default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Directory under which the `vars/` tree is written.
    #[serde(rename = "OutputDir", default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_reading_interval() -> Duration {
    Duration::from_secs(defaults::READING_INTERVAL_SECS)
}

fn default_unit_id() -> u8 {
    defaults::UNIT_ID
}

fn default_timeout() -> Duration {
    Duration::from_secs(defaults::TIMEOUT_SECS)
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(defaults::CATALOG_PATH)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(defaults::OUTPUT_DIR)
}

/// Client and ship identifiers stamped on every output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipIdentity {
    pub client_id: String,
    pub ship_id: String,
}

impl ShipIdentity {
    pub fn new(client_id: impl Into<String>, ship_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ship_id: ship_id.into(),
        }
    }
}

impl AppConfig {
    /// Load, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without overrides or validation.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from a variable lookup, normally `std::env::var`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(env_vars::DB_SOURCE) {
            self.ship.db_source = parse_bool(&value).ok_or_else(|| ConfigError::Env {
                var: env_vars::DB_SOURCE,
                reason: format!("expected true or false, got '{}'", value),
            })?;
        }

        if let Some(value) = lookup(env_vars::READING_INTERVAL) {
            let de: serde::de::value::StrDeserializer<'_, serde::de::value::Error> =
                value.as_str().into_deserializer();
            self.ship.reading_interval =
                humantime_serde::deserialize(de).map_err(|e| ConfigError::Env {
                    var: env_vars::READING_INTERVAL,
                    reason: e.to_string(),
                })?;
        }

        if let Some(value) = lookup(env_vars::OUTPUT_DIR) {
            self.storage.output_dir = PathBuf::from(value);
        }

        if let Some(value) = lookup(env_vars::CATALOG_PATH) {
            self.storage.catalog_path = PathBuf::from(value);
        }

        Ok(())
    }

    /// Check constraints that would otherwise surface mid-cycle.
    ///
    /// Variables whose register count does not pair up are reported as
    /// warnings only; they still get polled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier("ClientID", &self.ship.client_id)?;
        validate_identifier("ShipID", &self.ship.ship_id)?;

        if self.ship.reading_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "ReadingInterval must be greater than zero".to_string(),
            ));
        }
        if self.protocol.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "Timeout must be greater than zero".to_string(),
            ));
        }

        let settings = &self.equipment;
        let source_ids = unique_ids("DataSources", settings.data_sources.iter().map(|s| s.id))?;
        let equipment_ids = unique_ids("Equipamentos", settings.equipment.iter().map(|e| e.id))?;
        unique_ids("Variaveis", settings.variables.iter().map(|v| v.id))?;

        for equipment in &settings.equipment {
            if equipment.source_id != 0 && !source_ids.contains(&equipment.source_id) {
                return Err(ConfigError::Invalid(format!(
                    "equipment {} ({}) references unknown source {}",
                    equipment.id, equipment.name, equipment.source_id
                )));
            }
        }

        for variable in &settings.variables {
            if variable.equipment_id != 0 && !equipment_ids.contains(&variable.equipment_id) {
                return Err(ConfigError::Invalid(format!(
                    "variable {} ({}) references unknown equipment {}",
                    variable.id, variable.name, variable.equipment_id
                )));
            }
            if !variable.is_well_formed() {
                warn!(
                    variable = %variable.name,
                    register_count = variable.register_count,
                    "register count is not an even number >= 2; unpaired registers will not decode"
                );
            }
        }

        Ok(())
    }

    /// Identity stamped on output files.
    pub fn identity(&self) -> ShipIdentity {
        ShipIdentity::new(&self.ship.client_id, &self.ship.ship_id)
    }
}

fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{} must not be empty", field)));
    }
    if value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(ConfigError::Invalid(format!(
            "{} '{}' must not contain path separators",
            field, value
        )));
    }
    Ok(())
}

fn unique_ids(
    table: &str,
    ids: impl Iterator<Item = u32>,
) -> Result<HashSet<u32>, ConfigError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id == 0 {
            return Err(ConfigError::Invalid(format!("{}: Id must be non-zero", table)));
        }
        if !seen.insert(id) {
            return Err(ConfigError::Invalid(format!("{}: duplicate Id {}", table, id)));
        }
    }
    Ok(seen)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[ShipSettings]
ClientID = "ACME"
ShipID = "SHIP01"
DBsource = false
ReadingInterval = "30s"

[EquipmentSettings]
DataSources = [
    { Id = 1, Name = "PLC-1", Address = "10.0.0.5", Port = 502 },
    { Id = 2, Name = "PLC-2", Address = "10.0.0.6", Port = 5020 },
]
Equipamentos = [
    { Id = 10, Name = "Engine", Alias = "ENG", SourceId = 1 },
    { Id = 11, Name = "Generator", Alias = "GEN" },
]
Variaveis = [
    { Id = 100, Name = "RPM", Alias = "rpm", StartAddress = 0, RegisterCount = 2, EquipmentId = 10 },
    { Id = 101, Name = "Load", Alias = "load", StartAddress = 2, RegisterCount = 4 },
]
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.ship.client_id, "ACME");
        assert_eq!(config.ship.ship_id, "SHIP01");
        assert!(!config.ship.db_source);
        assert_eq!(config.ship.reading_interval, Duration::from_secs(30));
        assert_eq!(config.equipment.data_sources.len(), 2);
        assert_eq!(config.equipment.data_sources[1].port, 5020);
        assert_eq!(config.equipment.equipment[1].source_id, 0);
        assert_eq!(config.equipment.variables[1].register_count, 4);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config =
            AppConfig::from_toml_str("[ShipSettings]\nClientID = \"A\"\nShipID = \"B\"\n").unwrap();
        assert_eq!(
            config.ship.reading_interval,
            Duration::from_secs(defaults::READING_INTERVAL_SECS)
        );
        assert_eq!(config.protocol.unit_id, defaults::UNIT_ID);
        assert_eq!(config.protocol.timeout, Duration::from_secs(defaults::TIMEOUT_SECS));
        assert_eq!(config.storage.catalog_path, PathBuf::from(defaults::CATALOG_PATH));
        assert!(config.equipment.data_sources.is_empty());
    }

    #[test]
    fn test_malformed_is_error() {
        assert!(matches!(
            AppConfig::from_toml_str("[ShipSettings\nClientID = "),
            Err(ConfigError::Parse(_))
        ));
        // missing ShipID
        assert!(AppConfig::from_toml_str("[ShipSettings]\nClientID = \"A\"\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config
            .apply_env_overrides(env(&[
                (env_vars::DB_SOURCE, "true"),
                (env_vars::READING_INTERVAL, "2m"),
                (env_vars::OUTPUT_DIR, "/var/lib/shiplog"),
            ]))
            .unwrap();
        assert!(config.ship.db_source);
        assert_eq!(config.ship.reading_interval, Duration::from_secs(120));
        assert_eq!(config.storage.output_dir, PathBuf::from("/var/lib/shiplog"));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        let err = config
            .apply_env_overrides(env(&[(env_vars::DB_SOURCE, "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains(env_vars::DB_SOURCE));

        let err = config
            .apply_env_overrides(env(&[(env_vars::READING_INTERVAL, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_identity() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.ship.client_id = "a/b".to_string();
        assert!(config.validate().is_err());

        config.ship.client_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.ship.reading_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.equipment.variables[1].id = 100;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate Id 100"));
    }

    #[test]
    fn test_validate_rejects_dangling_parent() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.equipment.equipment[0].source_id = 9;
        assert!(config.validate().is_err());

        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.equipment.variables[0].equipment_id = 99;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_odd_register_count_is_not_fatal() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.equipment.variables[0].register_count = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shiplog.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.identity(), ShipIdentity::new("ACME", "SHIP01"));

        let missing = AppConfig::load(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
