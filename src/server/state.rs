use axum::extract::FromRef;

use crate::assets::{AssetLinker, BlobStore};
use crate::catalog_store::RecordStore;
use crate::query::{GenreMatch, QueryEngine};
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedRecordStore = Arc<RecordStore>;
pub type GuardedQueryEngine = Arc<QueryEngine>;
pub type GuardedAssetLinker = Arc<AssetLinker>;
pub type GuardedBlobStore = Arc<dyn BlobStore>;

/// The catalog components, wired to each other and shared by every request.
#[derive(Clone)]
pub struct CatalogServices {
    pub record_store: GuardedRecordStore,
    pub query_engine: GuardedQueryEngine,
    pub asset_linker: GuardedAssetLinker,
    pub blob_store: GuardedBlobStore,
}

impl CatalogServices {
    pub fn new(
        record_store: Arc<RecordStore>,
        blob_store: Arc<dyn BlobStore>,
        genre_match: GenreMatch,
    ) -> Self {
        CatalogServices {
            query_engine: Arc::new(QueryEngine::new(record_store.clone(), genre_match)),
            asset_linker: Arc::new(AssetLinker::new(record_store.clone())),
            record_store,
            blob_store,
        }
    }
}

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub record_store: GuardedRecordStore,
    pub query_engine: GuardedQueryEngine,
    pub asset_linker: GuardedAssetLinker,
    pub blob_store: GuardedBlobStore,
    pub hash: String,
}

impl ServerState {
    pub fn new(config: ServerConfig, services: CatalogServices) -> Self {
        ServerState {
            config,
            start_time: Instant::now(),
            record_store: services.record_store,
            query_engine: services.query_engine,
            asset_linker: services.asset_linker,
            blob_store: services.blob_store,
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

impl FromRef<ServerState> for GuardedRecordStore {
    fn from_ref(input: &ServerState) -> Self {
        input.record_store.clone()
    }
}

impl FromRef<ServerState> for GuardedQueryEngine {
    fn from_ref(input: &ServerState) -> Self {
        input.query_engine.clone()
    }
}

impl FromRef<ServerState> for GuardedAssetLinker {
    fn from_ref(input: &ServerState) -> Self {
        input.asset_linker.clone()
    }
}

impl FromRef<ServerState> for GuardedBlobStore {
    fn from_ref(input: &ServerState) -> Self {
        input.blob_store.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
