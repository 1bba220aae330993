//! Record store: the single owner of every `CatalogItem`.
//!
//! Items live in memory, ordered by id. Each mutation is built on a copy,
//! validated and written through the `RecordPersistence` collaborator before
//! it is committed to memory, so readers never see a partial change and a
//! failed write leaves the store as it was.

use super::error::{CatalogError, CatalogResult};
use super::models::*;
use super::null_persistence::NoPersistence;
use super::trait_def::RecordPersistence;
use super::validation::{validate_id, validate_item, ValidationError};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};

const PERSISTENCE: &str = "record persistence";

struct StoreInner {
    items: BTreeMap<ItemKey, CatalogItem>,
    /// Asset key -> id of the item referencing it.
    asset_owners: HashMap<String, String>,
    retired: HashSet<String>,
    next_id: u64,
    generation: u64,
    snapshot: Option<Snapshot>,
}

impl StoreInner {
    fn new(next_id: u64) -> Self {
        StoreInner {
            items: BTreeMap::new(),
            asset_owners: HashMap::new(),
            retired: HashSet::new(),
            next_id: next_id.max(1),
            generation: 0,
            snapshot: None,
        }
    }

    fn is_taken(&self, id: &str) -> bool {
        self.items.contains_key(&ItemKey::from(id)) || self.retired.contains(id)
    }

    fn bump_past(&mut self, id: &str) {
        if let Some(ordinal) = generated_ordinal(id) {
            self.next_id = self.next_id.max(ordinal.saturating_add(1));
        }
    }

    fn committed(&mut self) {
        self.generation += 1;
        self.snapshot = None;
    }
}

pub struct RecordStore {
    persistence: Arc<dyn RecordPersistence>,
    inner: RwLock<StoreInner>,
}

impl RecordStore {
    /// Opens the store, loading every item and the id bookkeeping from `persistence`.
    pub fn open(persistence: Arc<dyn RecordPersistence>) -> Result<Self> {
        let items = persistence
            .query_all()
            .context("Failed to load catalog items")?;
        let id_state = persistence
            .load_id_state()
            .context("Failed to load catalog id state")?;

        let mut inner = StoreInner::new(id_state.next_id);
        for id in id_state.retired {
            inner.bump_past(&id);
            inner.retired.insert(id);
        }
        for item in items {
            inner.bump_past(&item.id);
            if let Some(key) = &item.asset_ref {
                inner.asset_owners.insert(key.clone(), item.id.clone());
            }
            inner.items.insert(ItemKey::from(item.id.as_str()), item);
        }

        info!(
            "Opened catalog: {} items, {} retired ids, next id {}",
            inner.items.len(),
            inner.retired.len(),
            generated_id(inner.next_id)
        );

        Ok(RecordStore {
            persistence,
            inner: RwLock::new(inner),
        })
    }

    /// A store that keeps nothing across restarts.
    pub fn in_memory() -> Self {
        RecordStore {
            persistence: Arc::new(NoPersistence),
            inner: RwLock::new(StoreInner::new(1)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a new item. A missing id is generated, a supplied one must be unused.
    pub fn create(&self, new_item: NewCatalogItem) -> CatalogResult<CatalogItem> {
        const OP: &str = "create";
        let exhausted = || CatalogError::invalid(OP, ValidationError::IdSpaceExhausted);
        let mut inner = self.write();

        let (id, next_id) = match new_item.id {
            Some(id) => {
                validate_id(&id).map_err(|e| CatalogError::invalid(OP, e))?;
                if inner.is_taken(&id) {
                    return Err(CatalogError::DuplicateId { operation: OP, id });
                }
                let next_id = match generated_ordinal(&id) {
                    Some(ordinal) => inner
                        .next_id
                        .max(ordinal.checked_add(1).ok_or_else(exhausted)?),
                    None => inner.next_id,
                };
                (id, next_id)
            }
            None => {
                let mut ordinal = inner.next_id;
                while inner.is_taken(&generated_id(ordinal)) {
                    ordinal = ordinal.checked_add(1).ok_or_else(exhausted)?;
                }
                let next_id = ordinal.checked_add(1).ok_or_else(exhausted)?;
                (generated_id(ordinal), next_id)
            }
        };

        let item = CatalogItem {
            id,
            title: new_item.title,
            genre: new_item.genre,
            year: new_item.year,
            asset_ref: None,
        };
        validate_item(&item).map_err(|e| CatalogError::invalid(OP, e))?;

        self.persistence.insert(&item, next_id).map_err(|e| {
            error!("Failed to persist new item {}: {:#}", item.id, e);
            CatalogError::collaborator(OP, PERSISTENCE, e)
        })?;

        inner.next_id = next_id;
        inner
            .items
            .insert(ItemKey::from(item.id.as_str()), item.clone());
        inner.committed();

        info!("Created item {} {:?} ({})", item.id, item.title, item.year);
        Ok(item)
    }

    /// Apply a partial update. The whole updated item is validated before commit.
    pub fn update(&self, id: &str, patch: CatalogItemPatch) -> CatalogResult<CatalogItem> {
        self.apply_update(id, patch).map(|(item, _)| item)
    }

    /// Commits `patch` and returns the updated item with the asset key it held before.
    fn apply_update(
        &self,
        id: &str,
        patch: CatalogItemPatch,
    ) -> CatalogResult<(CatalogItem, Option<String>)> {
        const OP: &str = "update";
        let key = ItemKey::from(id);
        let mut inner = self.write();

        let current = inner
            .items
            .get(&key)
            .ok_or_else(|| CatalogError::item_not_found(OP, id))?;
        let previous_asset = current.asset_ref.clone();

        let mut updated = current.clone();
        if let Some(title) = patch.title {
            updated.title = title;
        }
        if let Some(genre) = patch.genre {
            updated.genre = genre;
        }
        if let Some(year) = patch.year {
            updated.year = year;
        }

        if let Some(change) = patch.asset {
            let asset_key = match change {
                AssetChange::Attach(asset_key) => {
                    if let Some(existing) = &previous_asset {
                        return Err(CatalogError::AlreadyLinked {
                            operation: OP,
                            key: existing.clone(),
                            id: id.to_owned(),
                        });
                    }
                    asset_key
                }
                AssetChange::Replace(asset_key) => asset_key,
            };
            if let Some(owner) = inner.asset_owners.get(&asset_key) {
                if owner != id {
                    return Err(CatalogError::AlreadyLinked {
                        operation: OP,
                        key: asset_key,
                        id: owner.clone(),
                    });
                }
            }
            updated.asset_ref = Some(asset_key);
        }

        validate_item(&updated).map_err(|e| CatalogError::invalid(OP, e))?;
        if inner.items.get(&key) == Some(&updated) {
            return Ok((updated, previous_asset));
        }

        self.persistence.put(&updated).map_err(|e| {
            error!("Failed to persist update of item {}: {:#}", id, e);
            CatalogError::collaborator(OP, PERSISTENCE, e)
        })?;

        if previous_asset != updated.asset_ref {
            if let Some(old) = &previous_asset {
                inner.asset_owners.remove(old);
            }
            if let Some(new) = &updated.asset_ref {
                inner.asset_owners.insert(new.clone(), id.to_owned());
            }
        }
        inner.items.insert(key, updated.clone());
        inner.committed();

        debug!("Updated item {}", id);
        Ok((updated, previous_asset))
    }

    /// Explicitly re-associate an item with another asset.
    ///
    /// Returns the updated item and the key it referenced until now, read
    /// under the same lock as the write.
    pub fn replace_asset(
        &self,
        id: &str,
        asset_key: &str,
    ) -> CatalogResult<(CatalogItem, Option<String>)> {
        self.apply_update(id, CatalogItemPatch::replace_asset(asset_key))
            .map_err(|e| e.in_operation("replace_asset"))
    }

    /// Remove an item. Its id is retired and never handed out again.
    pub fn delete(&self, id: &str) -> CatalogResult<CatalogItem> {
        const OP: &str = "delete";
        let key = ItemKey::from(id);
        let mut inner = self.write();

        let removed = inner
            .items
            .get(&key)
            .cloned()
            .ok_or_else(|| CatalogError::item_not_found(OP, id))?;

        let existed = self.persistence.delete(id).map_err(|e| {
            error!("Failed to persist deletion of item {}: {:#}", id, e);
            CatalogError::collaborator(OP, PERSISTENCE, e)
        })?;
        if !existed {
            debug!("Item {} was not in persistence when deleted", id);
        }

        inner.items.remove(&key);
        if let Some(asset_key) = &removed.asset_ref {
            inner.asset_owners.remove(asset_key);
        }
        inner.retired.insert(id.to_owned());
        inner.committed();

        info!("Deleted item {}", id);
        Ok(removed)
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, id: &str) -> CatalogResult<CatalogItem> {
        self.read()
            .items
            .get(&ItemKey::from(id))
            .cloned()
            .ok_or_else(|| CatalogError::item_not_found("get", id))
    }

    /// Point-in-time view ordered by id, shared until the next mutation.
    pub fn snapshot(&self) -> Snapshot {
        if let Some(snapshot) = &self.read().snapshot {
            return snapshot.clone();
        }
        let mut inner = self.write();
        if let Some(snapshot) = &inner.snapshot {
            return snapshot.clone();
        }
        let snapshot = Snapshot::new(inner.generation, inner.items.values().cloned().collect());
        inner.snapshot = Some(snapshot.clone());
        snapshot
    }

    /// The item currently referencing `asset_key`, if any.
    pub fn find_by_asset(&self, asset_key: &str) -> Option<CatalogItem> {
        let inner = self.read();
        let owner = inner.asset_owners.get(asset_key)?;
        inner.items.get(&ItemKey::from(owner.as_str())).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().items.is_empty()
    }
}
