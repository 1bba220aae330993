use super::predicates::{self, CatalogQuery, GenreMatch};
use crate::catalog_store::{CatalogError, CatalogItem, CatalogResult, RecordStore};
use std::sync::Arc;
use tracing::debug;

/// Read-only view over the record store's current snapshot.
///
/// Results are always in ascending id order, an empty result is not an error.
pub struct QueryEngine {
    store: Arc<RecordStore>,
    genre_match: GenreMatch,
}

impl QueryEngine {
    pub fn new(store: Arc<RecordStore>, genre_match: GenreMatch) -> Self {
        QueryEngine { store, genre_match }
    }

    pub fn genre_match(&self) -> GenreMatch {
        self.genre_match
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<CatalogItem>
    where
        P: Fn(&CatalogItem) -> bool,
    {
        let snapshot = self.store.snapshot();
        snapshot
            .iter()
            .filter(|item| predicate(*item))
            .cloned()
            .collect()
    }

    pub fn filter_by_genre(&self, genre: &str) -> Vec<CatalogItem> {
        let items = self.filter(predicates::genre(genre, self.genre_match));
        debug!("Genre {:?} matched {} items", genre, items.len());
        items
    }

    pub fn list_all(&self) -> Vec<CatalogItem> {
        self.store.snapshot().items().to_vec()
    }

    /// Listing narrowed by the optional query parameters.
    pub fn query(&self, query: CatalogQuery) -> CatalogResult<Vec<CatalogItem>> {
        query
            .validate()
            .map_err(|e| CatalogError::invalid("list", e))?;
        if query.is_empty() {
            return Ok(self.list_all());
        }
        Ok(self.filter(query.into_predicate()))
    }
}
