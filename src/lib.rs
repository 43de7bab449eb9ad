//! A flat-file record store.
//!
//! Records are fixed-width rows persisted to a single data file, kept in
//! ascending primary-key order with blank "gap" slots interleaved so that most
//! inserts are a single in-place write. When no gap is left where a record
//! belongs, the whole file is rewritten with one blank slot after every record
//! and atomically swapped in.

use thiserror::Error;

pub mod config;
pub mod encoding;
pub mod fs;
pub mod import;
pub mod record_file;
pub mod registry;
pub mod schema;
pub mod store;

pub use config::StoreConfig;
pub use import::Table;
pub use record_file::RecordFile;
pub use registry::Registry;
pub use schema::{Field, Record, Schema};
pub use store::{Inserted, SortedRecordStore, StoreState};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("record not found: {0}")]
    RecordNotFound(u64),

    #[error("slot {index} out of range (store has {num_slots} slots)")]
    OutOfRange { index: usize, num_slots: usize },

    #[error("value for field {field:?} is {len} bytes, wider than {width}")]
    RecordTooWide {
        field: String,
        width: usize,
        len: usize,
    },

    #[error("field {0:?} is the primary key and cannot be updated")]
    PrimaryKeyImmutable(String),

    #[error("duplicate primary key: {0}")]
    DuplicateKey(u64),

    #[error("invalid primary key: {0:?}")]
    InvalidKey(String),

    #[error("expected {expected} fields, got {got}")]
    FieldCount { expected: usize, got: usize },

    #[error("unknown field: {0:?}")]
    UnknownField(String),

    #[error("value for field {0:?} contains a newline")]
    ReservedCharacter(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("no data and config files found")]
    NoFilesFound,

    #[error("config mismatch: {0}")]
    ConfigMismatch(String),

    #[error("corrupt slot {index}: {reason}")]
    CorruptSlot {
        index: usize,
        reason: encoding::Corruption,
    },

    #[error("store is not open")]
    NotOpen,

    #[error("store is already open")]
    AlreadyOpen,

    #[error("store is already initialized")]
    AlreadyInitialized,

    #[error("store is not initialized")]
    Uninitialized,

    // Raised by the registry and import layers.
    #[error("a store named {0:?} already exists")]
    DuplicateStoreName(String),

    #[error("unknown store: {0:?}")]
    UnknownStore(String),

    #[error("invalid store name: {0:?}")]
    InvalidStoreName(String),

    #[error("invalid import source: {0}")]
    InvalidImportSource(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Fs(#[from] anyhow::Error),
}
