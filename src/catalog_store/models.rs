//! Catalog models.
//!
//! `CatalogItem` is the canonical record owned by the `RecordStore`.
//! `NewCatalogItem` and `CatalogItemPatch` are the inputs of the create and
//! update operations.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

// =============================================================================
// Catalog Item
// =============================================================================

/// One cataloged movie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    pub genre: String,
    pub year: i32,
    /// Key of the stored file linked to this item, `None` until linked.
    pub asset_ref: Option<String>,
}

/// Fields accepted when creating an item.
///
/// The id is optional, the store generates one when it is missing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewCatalogItem {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub genre: String,
    pub year: i32,
}

impl NewCatalogItem {
    pub fn new(title: impl Into<String>, genre: impl Into<String>, year: i32) -> Self {
        Self {
            id: None,
            title: title.into(),
            genre: genre.into(),
            year,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// How an update touches the item's asset reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetChange {
    /// Set the reference, only allowed while the item has none.
    Attach(String),
    /// Overwrite whatever reference the item has.
    Replace(String),
}

/// Partial update of an item. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CatalogItemPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    /// Never read from request bodies, assets are linked through the linker.
    #[serde(skip)]
    pub asset: Option<AssetChange>,
}

impl CatalogItemPatch {
    pub fn attach_asset(key: impl Into<String>) -> Self {
        Self {
            asset: Some(AssetChange::Attach(key.into())),
            ..Default::default()
        }
    }

    pub fn replace_asset(key: impl Into<String>) -> Self {
        Self {
            asset: Some(AssetChange::Replace(key.into())),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.genre.is_none() && self.year.is_none() && self.asset.is_none()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of every item, ordered by id.
///
/// Cloning is cheap, the items are shared until the store mutates again.
#[derive(Clone, Debug)]
pub struct Snapshot {
    generation: u64,
    items: Arc<[CatalogItem]>,
}

impl Snapshot {
    pub(super) fn new(generation: u64, items: Vec<CatalogItem>) -> Self {
        Self {
            generation,
            items: items.into(),
        }
    }

    /// Number of mutations the store had committed when this view was taken.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CatalogItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Id ordering
// =============================================================================

/// Map key giving ids their natural order (`m2` sorts before `m10`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemKey {
    fn from(id: &str) -> Self {
        ItemKey(id.to_owned())
    }
}

impl From<String> for ItemKey {
    fn from(id: String) -> Self {
        ItemKey(id)
    }
}

impl Ord for ItemKey {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0)
    }
}

impl PartialOrd for ItemKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn chunks(s: &str) -> impl Iterator<Item = &str> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        Some(chunk)
    })
}

fn is_digit_run(chunk: &str) -> bool {
    chunk.starts_with(|c: char| c.is_ascii_digit())
}

/// Compares digit runs numerically and everything else as text.
/// Falls back to plain string order so only equal strings compare equal.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a);
    let mut right = chunks(b);
    loop {
        let ordering = match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if is_digit_run(x) && is_digit_run(y) => {
                let x = x.trim_start_matches('0');
                let y = y.trim_start_matches('0');
                x.len().cmp(&y.len()).then_with(|| x.cmp(y))
            }
            (Some(x), Some(y)) => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

/// Prefix of the ids generated by the store.
pub const GENERATED_ID_PREFIX: &str = "m";

/// Returns `N` when `id` has the generated form `m<N>`.
pub fn generated_ordinal(id: &str) -> Option<u64> {
    let digits = id.strip_prefix(GENERATED_ID_PREFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn generated_id(ordinal: u64) -> String {
    format!("{}{}", GENERATED_ID_PREFIX, ordinal)
}
