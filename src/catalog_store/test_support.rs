//! In-memory persistence double shared by unit tests.

use super::models::CatalogItem;
use super::trait_def::{IdState, RecordPersistence};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Keeps everything in maps, counts writes and can be switched to failing.
#[derive(Default)]
pub struct RecordingPersistence {
    items: Mutex<HashMap<String, CatalogItem>>,
    id_state: Mutex<IdState>,
    failing: AtomicBool,
    puts: AtomicUsize,
}

impl RecordingPersistence {
    pub fn with_items(items: Vec<CatalogItem>, id_state: IdState) -> Self {
        let persistence = Self::default();
        {
            let mut map = persistence.items.lock().unwrap();
            for item in items {
                map.insert(item.id.clone(), item);
            }
        }
        *persistence.id_state.lock().unwrap() = id_state;
        persistence
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful `put` calls (updates).
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn stored(&self, id: &str) -> Option<CatalogItem> {
        self.items.lock().unwrap().get(id).cloned()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("simulated persistence outage");
        }
        Ok(())
    }
}

impl RecordPersistence for RecordingPersistence {
    fn put(&self, item: &CatalogItem) -> Result<()> {
        self.check()?;
        self.items
            .lock()
            .unwrap()
            .insert(item.id.clone(), item.clone());
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn insert(&self, item: &CatalogItem, next_id: u64) -> Result<()> {
        self.check()?;
        self.items
            .lock()
            .unwrap()
            .insert(item.id.clone(), item.clone());
        self.id_state.lock().unwrap().next_id = next_id;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<CatalogItem>> {
        self.check()?;
        Ok(self.items.lock().unwrap().get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        self.check()?;
        let removed = self.items.lock().unwrap().remove(id).is_some();
        if removed {
            self.id_state.lock().unwrap().retired.push(id.to_string());
        }
        Ok(removed)
    }

    fn query_all(&self) -> Result<Vec<CatalogItem>> {
        self.check()?;
        Ok(self.items.lock().unwrap().values().cloned().collect())
    }

    fn load_id_state(&self) -> Result<IdState> {
        self.check()?;
        Ok(self.id_state.lock().unwrap().clone())
    }
}
