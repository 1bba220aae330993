//! Asset linker: joins stored files and catalog items.
//!
//! A file upload and the request linking it to an item can arrive in either
//! order. Each asset key carries a small state machine, and whichever event
//! comes second performs the single `update` that attaches the key to the item.
//! Transitions are serialized per key; unrelated keys never wait on each other.

use crate::catalog_store::validation::validate_asset_key;
use crate::catalog_store::{CatalogError, CatalogItem, CatalogItemPatch, CatalogResult, RecordStore};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkState {
    /// Neither the file nor a link request has been seen.
    Unlinked,
    /// The file is stored, no item asked for it yet.
    FilePending,
    /// An item asked for the file before it was stored.
    RecordPending { item_id: String },
    Linked { item_id: String },
}

type Slot = Arc<Mutex<LinkState>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct AssetLinker {
    store: Arc<RecordStore>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl AssetLinker {
    pub fn new(store: Arc<RecordStore>) -> Self {
        AssetLinker {
            store,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &str) -> Slot {
        lock(&self.slots)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(LinkState::Unlinked)))
            .clone()
    }

    /// Drops the slot of a key that went back to `Unlinked`, unless someone else holds it.
    fn release_slot(&self, key: &str, slot: Slot) {
        let mut slots = lock(&self.slots);
        if Arc::strong_count(&slot) == 2 && *lock(&slot) == LinkState::Unlinked {
            slots.remove(key);
        }
    }

    /// Runs one transition on `key` with its slot locked.
    fn transition<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut LinkState) -> CatalogResult<T>,
    ) -> CatalogResult<T> {
        let slot = self.slot(key);
        let result = {
            let mut state = lock(&slot);
            f(&mut *state)
        };
        self.release_slot(key, slot);
        result
    }

    /// Attaches `key` to `item_id` and works out the state that follows.
    fn attach(
        &self,
        operation: &'static str,
        state: &mut LinkState,
        key: &str,
        item_id: &str,
    ) -> CatalogResult<LinkState> {
        match self.store.update(item_id, CatalogItemPatch::attach_asset(key)) {
            Ok(_) => {
                *state = LinkState::Linked {
                    item_id: item_id.to_string(),
                };
                info!("Linked asset {} to item {}", key, item_id);
                Ok(state.clone())
            }
            Err(CatalogError::NotFound { .. }) => {
                *state = LinkState::Unlinked;
                warn!(
                    "Dropping link of asset {}: item {} no longer exists",
                    key, item_id
                );
                Err(CatalogError::StaleAssetLink {
                    operation,
                    key: key.to_string(),
                    id: item_id.to_string(),
                })
            }
            Err(e) => {
                *state = LinkState::FilePending;
                Err(e.in_operation(operation))
            }
        }
    }

    /// The blob store finished writing `key`.
    pub fn file_stored(&self, key: &str) -> CatalogResult<LinkState> {
        const OP: &str = "file_stored";
        validate_asset_key(key).map_err(|e| CatalogError::invalid(OP, e))?;

        self.transition(key, |state| match state.clone() {
            LinkState::Unlinked => {
                *state = LinkState::FilePending;
                debug!("Asset {} is waiting for an item", key);
                Ok(state.clone())
            }
            LinkState::RecordPending { item_id } => self.attach(OP, state, key, &item_id),
            LinkState::FilePending | LinkState::Linked { .. } => Ok(state.clone()),
        })
    }

    /// Item `item_id` asks to be linked to the file stored as `key`.
    pub fn record_requests_asset(&self, item_id: &str, key: &str) -> CatalogResult<LinkState> {
        const OP: &str = "record_requests_asset";
        validate_asset_key(key).map_err(|e| CatalogError::invalid(OP, e))?;

        let item = self.store.get(item_id).map_err(|e| e.in_operation(OP))?;
        if let Some(existing) = item.asset_ref {
            return Err(CatalogError::AlreadyLinked {
                operation: OP,
                key: existing,
                id: item_id.to_string(),
            });
        }

        self.transition(key, |state| match state.clone() {
            LinkState::Unlinked => {
                *state = LinkState::RecordPending {
                    item_id: item_id.to_string(),
                };
                debug!("Item {} is waiting for asset {}", item_id, key);
                Ok(state.clone())
            }
            LinkState::FilePending => self.attach(OP, state, key, item_id),
            LinkState::RecordPending { item_id: pending } if pending == item_id => {
                Ok(state.clone())
            }
            LinkState::RecordPending { item_id: holder }
            | LinkState::Linked { item_id: holder } => Err(CatalogError::AlreadyLinked {
                operation: OP,
                key: key.to_string(),
                id: holder,
            }),
        })
    }

    pub fn state(&self, key: &str) -> LinkState {
        let slot = lock(&self.slots).get(key).cloned();
        match slot {
            Some(slot) => lock(&slot).clone(),
            None => LinkState::Unlinked,
        }
    }

    /// Explicitly re-associates item `item_id` with the stored file `key`.
    ///
    /// The item's previous file, if any, goes back to waiting for an item.
    pub fn replace(&self, item_id: &str, key: &str) -> CatalogResult<CatalogItem> {
        const OP: &str = "replace_asset";
        validate_asset_key(key).map_err(|e| CatalogError::invalid(OP, e))?;
        let previous = self.store.get(item_id).map_err(|e| e.in_operation(OP))?;

        let replaced = self.transition(key, |state| match state.clone() {
            LinkState::FilePending => {
                let replaced = self.store.replace_asset(item_id, key)?;
                *state = LinkState::Linked {
                    item_id: item_id.to_string(),
                };
                Ok(Some(replaced))
            }
            LinkState::Linked { item_id: holder } if holder == item_id => Ok(None),
            LinkState::Unlinked => Err(CatalogError::asset_not_found(OP, key)),
            LinkState::RecordPending { item_id: holder }
            | LinkState::Linked { item_id: holder } => Err(CatalogError::AlreadyLinked {
                operation: OP,
                key: key.to_string(),
                id: holder,
            }),
        })?;

        let Some((updated, old_key)) = replaced else {
            return Ok(previous);
        };
        // The key the store swapped out, not the one read before locking.
        if let Some(old_key) = old_key.filter(|old| old != key) {
            self.release_key(&old_key, item_id);
        }
        info!("Replaced asset of item {} with {}", item_id, key);
        Ok(updated)
    }

    /// A deleted item gives its file back and drops the requests it left waiting.
    pub fn release_record(&self, item: &CatalogItem) {
        if let Some(key) = &item.asset_ref {
            self.release_key(key, &item.id);
        }
        for key in self.keys_awaited_by(&item.id) {
            let dropped = self.transition(&key, |state| {
                let waiting = matches!(&*state, LinkState::RecordPending { item_id } if item_id.as_str() == item.id);
                if waiting {
                    *state = LinkState::Unlinked;
                }
                Ok(waiting)
            });
            if let Ok(true) = dropped {
                debug!("Dropped request of item {} for asset {}", item.id, key);
            }
        }
    }

    fn keys_awaited_by(&self, item_id: &str) -> Vec<String> {
        lock(&self.slots)
            .iter()
            .filter(|(_, slot)| {
                matches!(&*lock(slot), LinkState::RecordPending { item_id: pending } if pending.as_str() == item_id)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn release_key(&self, key: &str, item_id: &str) {
        let released = self.transition(key, |state| {
            let owned = matches!(&*state, LinkState::Linked { item_id: holder } if holder.as_str() == item_id);
            if owned {
                *state = LinkState::FilePending;
            }
            Ok(owned)
        });
        if let Ok(true) = released {
            debug!("Asset {} released by item {}", key, item_id);
        }
    }

    /// Rebuilds the key states at startup from the items and the stored files.
    pub fn restore<'a>(
        &self,
        items: impl IntoIterator<Item = &'a CatalogItem>,
        blob_keys: impl IntoIterator<Item = String>,
    ) {
        let mut slots = lock(&self.slots);
        let mut linked = HashSet::new();
        for item in items {
            if let Some(key) = &item.asset_ref {
                linked.insert(key.clone());
                slots.insert(
                    key.clone(),
                    Arc::new(Mutex::new(LinkState::Linked {
                        item_id: item.id.clone(),
                    })),
                );
            }
        }
        let mut pending = 0;
        for key in blob_keys {
            if !linked.contains(&key) {
                slots.insert(key, Arc::new(Mutex::new(LinkState::FilePending)));
                pending += 1;
            }
        }
        info!(
            "Restored asset links: {} linked, {} waiting for an item",
            linked.len(),
            pending
        );
    }

    /// Number of keys in a state other than `Unlinked`.
    pub fn tracked_keys(&self) -> usize {
        lock(&self.slots).len()
    }
}
