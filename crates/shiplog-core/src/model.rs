//! Device hierarchy: sources, equipment units and variables.
//!
//! Entities are snapshots built fresh from a catalog every cycle and never
//! mutated afterwards. Field names serialize in PascalCase to match the
//! `EquipmentSettings` tables of the configuration file.

use serde::{Deserialize, Serialize};

/// A network endpoint speaking the register protocol. Root of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Source {
    pub id: u32,
    pub name: String,
    /// Host name or IP address.
    pub address: String,
    pub port: u16,
}

impl Source {
    /// `address:port` form used for connecting and logging.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// A logical unit hosted behind one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Equipment {
    pub id: u32,
    pub name: String,
    /// Alternate short name.
    #[serde(default)]
    pub alias: String,
    /// Owning source. Optional in static configuration, where the catalog
    /// tags each listed record with the requested source instead.
    #[serde(default)]
    pub source_id: u32,
}

/// A named value backed by a contiguous run of holding registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Variable {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub alias: String,
    pub start_address: u16,
    pub register_count: u16,
    #[serde(default)]
    pub equipment_id: u32,
}

impl Variable {
    /// Whether every register pairs up into a 32-bit value.
    pub fn is_well_formed(&self) -> bool {
        self.register_count >= 2 && self.register_count % 2 == 0
    }

    /// Number of complete values a read of this variable decodes to.
    pub fn value_count(&self) -> usize {
        usize::from(self.register_count / 2)
    }
}
