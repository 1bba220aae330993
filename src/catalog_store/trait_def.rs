//! RecordPersistence trait definition.
//!
//! The record store keeps the canonical items in memory and writes every
//! mutation through this trait before committing it, so durable backends
//! can be swapped without touching the store.

use super::models::CatalogItem;
use anyhow::Result;

/// Id bookkeeping that must survive restarts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdState {
    /// Ordinal of the next generated id (`m<next_id>`).
    pub next_id: u64,
    /// Ids of deleted items, never handed out again.
    pub retired: Vec<String>,
}

/// Trait for durable record storage backends.
///
/// Each method is atomic: it either fully applies or leaves the backend untouched.
pub trait RecordPersistence: Send + Sync {
    /// Insert or overwrite an item.
    fn put(&self, item: &CatalogItem) -> Result<()>;

    /// Insert a new item and advance the id counter in one step.
    fn insert(&self, item: &CatalogItem, next_id: u64) -> Result<()>;

    /// Get an item by id.
    fn get(&self, id: &str) -> Result<Option<CatalogItem>>;

    /// Delete an item and retire its id. Returns false if the item did not exist.
    fn delete(&self, id: &str) -> Result<bool>;

    /// All stored items, in no particular order.
    fn query_all(&self) -> Result<Vec<CatalogItem>>;

    /// Load the id counter and the retired ids.
    fn load_id_state(&self) -> Result<IdState>;
}
