//! Error types shared across the workspace.

use thiserror::Error;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or does not match the schema.
    #[error("Malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },

    /// The configuration parsed but violates a constraint.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Catalog errors. A listing failure is fatal to the current source only.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The persisted store could not be reached or queried.
    #[error("Catalog store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be deserialized.
    #[error("Corrupt catalog row {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// A child row references a parent that does not exist.
    #[error("{kind} {id} references missing parent {parent_id}")]
    MissingParent {
        kind: &'static str,
        id: u32,
        parent_id: u32,
    },
}

/// Register decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A trailing register had no partner to form a 32-bit value.
    #[error("Unpaired register at index {index} (0x{word:04X})")]
    UnpairedRegister { index: usize, word: u16 },
}
