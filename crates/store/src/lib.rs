//! # Store
//!
//! Durable record storage behind the `RecordStore` contract, plus the
//! dead-letter log used by the persistence sink.
//!
//! - `MemoryStore`: in-process rows, for local runs and tests
//! - `SqliteStore`: one table, one row per write, blocking calls off the runtime
//! - `AnyStore`: backend chosen from configuration
//! - `FileDeadLetter` / `MemoryDeadLetter`

mod dead_letter;
mod error;
mod memory;
mod sqlite;

pub use dead_letter::{DeadLetterEntry, FileDeadLetter, MemoryDeadLetter};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use contracts::{ContractError, PersistenceConfig, Record, RecordStore, StoreKind, StoredRecord};

/// Store backend selected at startup
pub enum AnyStore {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl AnyStore {
    /// Open the backend named by the persistence configuration.
    pub fn from_config(config: &PersistenceConfig) -> Result<Self, StoreError> {
        match config.store {
            StoreKind::Memory => Ok(Self::Memory(MemoryStore::new())),
            StoreKind::Sqlite => {
                let path = config.sqlite_path.as_ref().ok_or_else(|| {
                    ContractError::config_validation(
                        "persistence.sqlite_path",
                        "sqlite store requires sqlite_path",
                    )
                })?;
                Ok(Self::Sqlite(SqliteStore::open(path)?))
            }
        }
    }
}

impl RecordStore for AnyStore {
    fn kind(&self) -> &'static str {
        match self {
            Self::Memory(store) => store.kind(),
            Self::Sqlite(store) => store.kind(),
        }
    }

    async fn insert(&self, record: &Record) -> Result<(), ContractError> {
        match self {
            Self::Memory(store) => store.insert(record).await,
            Self::Sqlite(store) => store.insert(record).await,
        }
    }

    async fn latest(&self, vehicle_id: &str) -> Result<Option<StoredRecord>, ContractError> {
        match self {
            Self::Memory(store) => store.latest(vehicle_id).await,
            Self::Sqlite(store) => store.latest(vehicle_id).await,
        }
    }
}
