//! Persisted device catalog using redb.
//!
//! Rows are stored as JSON keyed by id. Two index tables keyed by
//! `(parent_id, child_id)` make equipment and variable listings true scoped
//! queries, returned in ascending id order.
//!
//! redb holds an exclusive lock on the file while a `Database` is open, so
//! the store only keeps the path and opens the database for the duration of
//! each operation. A running scheduler therefore never blocks
//! `shiplog catalog seed` or other writers, and their edits show up on the
//! next listing. Two operations that overlap in time still contend for the
//! lock; the loser fails with a storage error.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use redb::{
    Database, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction,
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use shiplog_core::catalog::{CatalogProvider, CatalogResult};
use shiplog_core::config::EquipmentSettings;
use shiplog_core::model::{Equipment, Source, Variable};

use crate::error::{Error, Result};

type RowTable = TableDefinition<'static, u32, &'static str>;
type IndexTable = TableDefinition<'static, (u32, u32), ()>;

// Rows: key = id, value = entity (JSON)
const SOURCES_TABLE: RowTable = TableDefinition::new("sources");
const EQUIPMENT_TABLE: RowTable = TableDefinition::new("equipment");
const VARIABLES_TABLE: RowTable = TableDefinition::new("variables");

// Indexes: key = (parent_id, child_id)
const EQUIPMENT_BY_SOURCE: IndexTable = TableDefinition::new("equipment_by_source");
const VARIABLES_BY_EQUIPMENT: IndexTable = TableDefinition::new("variables_by_equipment");

/// Row counts per level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub sources: u64,
    pub equipment: u64,
    pub variables: u64,
}

/// Device catalog store using redb.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    /// Create the catalog at the given path if needed and make sure every
    /// table exists. The database is released again before returning.
    ///
    /// Table creation is idempotent, so opening an existing catalog is safe.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // create() opens an existing database file as-is
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _sources = write_txn.open_table(SOURCES_TABLE)?;
            let _equipment = write_txn.open_table(EQUIPMENT_TABLE)?;
            let _variables = write_txn.open_table(VARIABLES_TABLE)?;
            let _by_source = write_txn.open_table(EQUIPMENT_BY_SOURCE)?;
            let _by_equipment = write_txn.open_table(VARIABLES_BY_EQUIPMENT)?;
        }
        write_txn.commit()?;

        debug!(path = %path.display(), "catalog store ready");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // Held only for the current operation; dropping it releases the lock.
    fn database(&self) -> Result<Database> {
        Ok(Database::open(&self.path)?)
    }

    // ========== Writes ==========

    /// Insert or replace a source.
    pub fn insert_source(&self, source: &Source) -> Result<()> {
        let db = self.database()?;
        let write_txn = db.begin_write()?;
        put_source(&write_txn, source)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Insert or replace an equipment unit. Its source must already exist.
    pub fn insert_equipment(&self, equipment: &Equipment) -> Result<()> {
        let db = self.database()?;
        let write_txn = db.begin_write()?;
        put_equipment(&write_txn, equipment)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Insert or replace a variable. Its equipment unit must already exist.
    pub fn insert_variable(&self, variable: &Variable) -> Result<()> {
        let db = self.database()?;
        let write_txn = db.begin_write()?;
        put_variable(&write_txn, variable)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Insert a whole statically declared hierarchy in one transaction.
    ///
    /// Every equipment unit and variable needs an explicit parent id here;
    /// the unscoped tagging of the static catalog has no meaning in a
    /// persisted catalog.
    pub fn seed(&self, settings: &EquipmentSettings) -> Result<CatalogCounts> {
        let db = self.database()?;
        let write_txn = db.begin_write()?;
        for source in &settings.data_sources {
            put_source(&write_txn, source)?;
        }
        for equipment in &settings.equipment {
            if equipment.source_id == 0 {
                return Err(Error::InvalidInput(format!(
                    "equipment {} ({}) has no SourceId",
                    equipment.id, equipment.name
                )));
            }
            put_equipment(&write_txn, equipment)?;
        }
        for variable in &settings.variables {
            if variable.equipment_id == 0 {
                return Err(Error::InvalidInput(format!(
                    "variable {} ({}) has no EquipmentId",
                    variable.id, variable.name
                )));
            }
            put_variable(&write_txn, variable)?;
        }
        write_txn.commit()?;

        Ok(CatalogCounts {
            sources: settings.data_sources.len() as u64,
            equipment: settings.equipment.len() as u64,
            variables: settings.variables.len() as u64,
        })
    }

    // ========== Reads ==========

    /// All sources in id order.
    pub fn sources(&self) -> Result<Vec<Source>> {
        read_rows(&self.database()?, SOURCES_TABLE)
    }

    /// Equipment units belonging to a source.
    pub fn equipment_of(&self, source_id: u32) -> Result<Vec<Equipment>> {
        read_children(&self.database()?, EQUIPMENT_BY_SOURCE, EQUIPMENT_TABLE, source_id)
    }

    /// Variables belonging to an equipment unit.
    pub fn variables_of(&self, equipment_id: u32) -> Result<Vec<Variable>> {
        read_children(&self.database()?, VARIABLES_BY_EQUIPMENT, VARIABLES_TABLE, equipment_id)
    }

    /// Row counts per level.
    pub fn counts(&self) -> Result<CatalogCounts> {
        let db = self.database()?;
        let read_txn = db.begin_read()?;
        Ok(CatalogCounts {
            sources: read_txn.open_table(SOURCES_TABLE)?.len()?,
            equipment: read_txn.open_table(EQUIPMENT_TABLE)?.len()?,
            variables: read_txn.open_table(VARIABLES_TABLE)?.len()?,
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(CatalogStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(store)).await?
    }
}

#[async_trait]
impl CatalogProvider for CatalogStore {
    fn kind(&self) -> &'static str {
        "persisted"
    }

    async fn list_sources(&self) -> CatalogResult<Vec<Source>> {
        Ok(self.blocking(|store| store.sources()).await?)
    }

    async fn list_equipment(&self, source_id: u32) -> CatalogResult<Vec<Equipment>> {
        Ok(self
            .blocking(move |store| store.equipment_of(source_id))
            .await?)
    }

    async fn list_variables(&self, equipment_id: u32) -> CatalogResult<Vec<Variable>> {
        Ok(self
            .blocking(move |store| store.variables_of(equipment_id))
            .await?)
    }
}

fn put_source(txn: &WriteTransaction, source: &Source) -> Result<()> {
    if source.id == 0 {
        return Err(Error::InvalidInput("source id must be non-zero".to_string()));
    }
    let mut table = txn.open_table(SOURCES_TABLE)?;
    let json = serde_json::to_string(source)?;
    table.insert(source.id, json.as_str())?;
    Ok(())
}

fn put_equipment(txn: &WriteTransaction, equipment: &Equipment) -> Result<()> {
    if equipment.id == 0 {
        return Err(Error::InvalidInput("equipment id must be non-zero".to_string()));
    }
    ensure_exists(txn, SOURCES_TABLE, "equipment", equipment.id, equipment.source_id)?;

    let previous: Option<Equipment> = load_row(txn, EQUIPMENT_TABLE, equipment.id)?;
    {
        let mut table = txn.open_table(EQUIPMENT_TABLE)?;
        let json = serde_json::to_string(equipment)?;
        table.insert(equipment.id, json.as_str())?;
    }

    let mut index = txn.open_table(EQUIPMENT_BY_SOURCE)?;
    if let Some(previous) = previous {
        index.remove((previous.source_id, equipment.id))?;
    }
    index.insert((equipment.source_id, equipment.id), ())?;
    Ok(())
}

fn put_variable(txn: &WriteTransaction, variable: &Variable) -> Result<()> {
    if variable.id == 0 {
        return Err(Error::InvalidInput("variable id must be non-zero".to_string()));
    }
    ensure_exists(txn, EQUIPMENT_TABLE, "variable", variable.id, variable.equipment_id)?;

    let previous: Option<Variable> = load_row(txn, VARIABLES_TABLE, variable.id)?;
    {
        let mut table = txn.open_table(VARIABLES_TABLE)?;
        let json = serde_json::to_string(variable)?;
        table.insert(variable.id, json.as_str())?;
    }

    let mut index = txn.open_table(VARIABLES_BY_EQUIPMENT)?;
    if let Some(previous) = previous {
        index.remove((previous.equipment_id, variable.id))?;
    }
    index.insert((variable.equipment_id, variable.id), ())?;
    Ok(())
}

fn ensure_exists(
    txn: &WriteTransaction,
    parents: RowTable,
    kind: &'static str,
    id: u32,
    parent_id: u32,
) -> Result<()> {
    let table = txn.open_table(parents)?;
    if table.get(parent_id)?.is_none() {
        return Err(Error::MissingParent {
            kind,
            id,
            parent_id,
        });
    }
    Ok(())
}

fn load_row<T: DeserializeOwned>(
    txn: &WriteTransaction,
    rows: RowTable,
    id: u32,
) -> Result<Option<T>> {
    let table = txn.open_table(rows)?;
    let row = match table.get(id)? {
        Some(value) => Some(serde_json::from_str(value.value())?),
        None => None,
    };
    Ok(row)
}

fn read_rows<T: DeserializeOwned>(db: &Database, rows: RowTable) -> Result<Vec<T>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(rows)?;

    let mut out = Vec::new();
    for result in table.iter()? {
        let (key, value) = result?;
        match serde_json::from_str::<T>(value.value()) {
            Ok(row) => out.push(row),
            Err(e) => warn!(id = key.value(), error = %e, "skipping unreadable catalog row"),
        }
    }
    Ok(out)
}

fn read_children<T: DeserializeOwned>(
    db: &Database,
    index: IndexTable,
    rows: RowTable,
    parent_id: u32,
) -> Result<Vec<T>> {
    let read_txn = db.begin_read()?;
    let index = read_txn.open_table(index)?;
    let rows = read_txn.open_table(rows)?;

    let mut out = Vec::new();
    for entry in index.range((parent_id, 0)..=(parent_id, u32::MAX))? {
        let (key, _) = entry?;
        let (_, child_id) = key.value();
        if let Some(value) = rows.get(child_id)? {
            match serde_json::from_str::<T>(value.value()) {
                Ok(row) => out.push(row),
                Err(e) => warn!(id = child_id, error = %e, "skipping unreadable catalog row"),
            }
        }
    }
    Ok(out)
}
