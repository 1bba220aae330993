//! SQLite-backed `RecordPersistence`.
//!
//! One table holds the items, one the retired ids and a small key/value
//! table the id counter. Writes touching more than one table run inside
//! a single `BEGIN IMMEDIATE` transaction.

use super::versioned_schema::{open_versioned, VersionedSchema, DEFAULT_TIMESTAMP};
use super::{Column, SqlType, Table};
use crate::catalog_store::{CatalogItem, IdState, RecordPersistence};
use crate::sqlite_column;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

// =============================================================================
// Schema
// =============================================================================

const CATALOG_ITEMS_TABLE: Table = Table {
    name: "catalog_items",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("genre", &SqlType::Text, non_null = true),
        sqlite_column!("year", &SqlType::Integer, non_null = true),
        sqlite_column!("asset_ref", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_catalog_items_genre", "genre")],
};

const RETIRED_IDS_TABLE: Table = Table {
    name: "retired_ids",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "retired_at",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
};

const CATALOG_META_TABLE: Table = Table {
    name: "catalog_meta",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[CATALOG_ITEMS_TABLE, RETIRED_IDS_TABLE, CATALOG_META_TABLE],
    migration: None,
}];

const NEXT_ID_KEY: &str = "next_id";

// =============================================================================
// Store
// =============================================================================

pub struct SqliteRecordPersistence {
    conn: Mutex<Connection>,
}

impl SqliteRecordPersistence {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        let item_count: i64 = conn.query_row("SELECT COUNT(*) FROM catalog_items", [], |r| {
            r.get(0)
        })?;
        info!(
            "Catalog database {:?} holds {} items",
            db_path.as_ref(),
            item_count
        );
        Ok(SqliteRecordPersistence {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        CATALOG_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(SqliteRecordPersistence {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<CatalogItem> {
        Ok(CatalogItem {
            id: row.get("id")?,
            title: row.get("title")?,
            genre: row.get("genre")?,
            year: row.get("year")?,
            asset_ref: row.get("asset_ref")?,
        })
    }

    /// Runs `f` inside an immediate transaction, rolling back on error.
    fn in_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn();
        conn.execute("BEGIN IMMEDIATE", [])?;
        match f(&conn) {
            Ok(value) => {
                conn.execute("COMMIT", [])?;
                Ok(value)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }
}

fn store_next_id(conn: &Connection, next_id: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO catalog_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![NEXT_ID_KEY, next_id.to_string()],
    )?;
    Ok(())
}

impl RecordPersistence for SqliteRecordPersistence {
    fn put(&self, item: &CatalogItem) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO catalog_items (id, title, genre, year, asset_ref)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    genre = excluded.genre,
                    year = excluded.year,
                    asset_ref = excluded.asset_ref",
                params![item.id, item.title, item.genre, item.year, item.asset_ref],
            )
            .with_context(|| format!("Failed to write item {}", item.id))?;
        Ok(())
    }

    fn insert(&self, item: &CatalogItem, next_id: u64) -> Result<()> {
        self.in_transaction(|conn| {
            conn.execute(
                "INSERT INTO catalog_items (id, title, genre, year, asset_ref)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![item.id, item.title, item.genre, item.year, item.asset_ref],
            )
            .with_context(|| format!("Failed to insert item {}", item.id))?;
            store_next_id(conn, next_id)
        })?;
        debug!("Inserted item {} (next id {})", item.id, next_id);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<CatalogItem>> {
        let item = self
            .conn()
            .query_row(
                "SELECT id, title, genre, year, asset_ref FROM catalog_items WHERE id = ?1",
                params![id],
                Self::row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        self.in_transaction(|conn| {
            let deleted = conn.execute("DELETE FROM catalog_items WHERE id = ?1", params![id])?;
            conn.execute(
                "INSERT OR IGNORE INTO retired_ids (id) VALUES (?1)",
                params![id],
            )?;
            Ok(deleted > 0)
        })
        .with_context(|| format!("Failed to delete item {}", id))
    }

    fn query_all(&self) -> Result<Vec<CatalogItem>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, title, genre, year, asset_ref FROM catalog_items")?;
        let items = stmt
            .query_map([], Self::row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn load_id_state(&self) -> Result<IdState> {
        let conn = self.conn();
        let next_id = conn
            .query_row(
                "SELECT value FROM catalog_meta WHERE key = ?1",
                params![NEXT_ID_KEY],
                |r| r.get::<_, String>(0),
            )
            .optional()?
            .map(|value| {
                value
                    .parse::<u64>()
                    .with_context(|| format!("Corrupted next_id value {:?}", value))
            })
            .transpose()?
            .unwrap_or(1);

        let mut stmt = conn.prepare("SELECT id FROM retired_ids")?;
        let retired = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(IdState { next_id, retired })
    }
}
