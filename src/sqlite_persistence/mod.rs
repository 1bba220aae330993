mod record_persistence;
mod versioned_schema;

pub use record_persistence::{SqliteRecordPersistence, CATALOG_VERSIONED_SCHEMAS};
pub use versioned_schema::{
    open_versioned, Column, SqlType, Table, VersionedSchema, BASE_DB_VERSION, DEFAULT_TIMESTAMP,
};
