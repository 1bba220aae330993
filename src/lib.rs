//! Movie Catalog Server Library
//!
//! A catalog of movies with uploaded files linked to them, served over HTTP.
//! This library exposes the internal modules for testing and potential reuse.

pub mod assets;
pub mod catalog_store;
pub mod config;
pub mod query;
pub mod server;
pub mod sqlite_persistence;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use assets::{BlobStore, FsBlobStore};
use catalog_store::{NoPersistence, RecordPersistence, RecordStore};
use config::AppConfig;
use sqlite_persistence::SqliteRecordPersistence;

// Re-export commonly used types for convenience
pub use server::{make_app, run_server, CatalogServices, RequestsLoggingLevel, ServerConfig};

/// Opens the record store and the blob store described by `config` and
/// rebuilds the asset links from what they contain.
pub async fn build_services(config: &AppConfig) -> Result<CatalogServices> {
    let persistence: Arc<dyn RecordPersistence> = match config.catalog_db_path() {
        Some(db_path) => {
            info!("Opening SQLite catalog database at {:?}...", db_path);
            Arc::new(SqliteRecordPersistence::new(&db_path)?)
        }
        None => {
            info!("No db_dir configured, the catalog is kept in memory only");
            Arc::new(NoPersistence)
        }
    };
    let record_store = Arc::new(RecordStore::open(persistence)?);

    let blob_store = FsBlobStore::new(&config.blob_dir, config.max_upload_bytes);
    blob_store
        .init()
        .await
        .with_context(|| format!("Failed to create blob directory {:?}", config.blob_dir))?;
    let blob_keys = blob_store
        .list_keys()
        .await
        .context("Failed to list stored blobs")?;
    info!(
        "Blob store at {:?} holds {} files",
        blob_store.root(),
        blob_keys.len()
    );
    let blob_store: Arc<dyn BlobStore> = Arc::new(blob_store);

    let services = CatalogServices::new(record_store, blob_store, config.genre_match);
    services
        .asset_linker
        .restore(services.record_store.snapshot().iter(), blob_keys);
    Ok(services)
}
