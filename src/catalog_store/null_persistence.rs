//! Null persistence implementation.
//!
//! A no-op implementation of RecordPersistence for running the catalog
//! purely in memory (no `db_dir` configured, tests).

use super::models::CatalogItem;
use super::trait_def::{IdState, RecordPersistence};
use anyhow::Result;

/// Persistence that stores nothing and always loads an empty catalog.
pub struct NoPersistence;

impl RecordPersistence for NoPersistence {
    fn put(&self, _item: &CatalogItem) -> Result<()> {
        Ok(())
    }

    fn insert(&self, _item: &CatalogItem, _next_id: u64) -> Result<()> {
        Ok(())
    }

    fn get(&self, _id: &str) -> Result<Option<CatalogItem>> {
        Ok(None)
    }

    fn delete(&self, _id: &str) -> Result<bool> {
        Ok(true)
    }

    fn query_all(&self) -> Result<Vec<CatalogItem>> {
        Ok(Vec::new())
    }

    fn load_id_state(&self) -> Result<IdState> {
        Ok(IdState {
            next_id: 1,
            retired: Vec::new(),
        })
    }
}
