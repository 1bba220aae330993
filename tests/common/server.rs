//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own database and blob directory.

use super::constants::*;
use movie_catalog_server::catalog_store::{NewCatalogItem, RecordStore};
use movie_catalog_server::config::{AppConfig, CliConfig};
use movie_catalog_server::{build_services, make_app, RequestsLoggingLevel};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with an isolated catalog database and blob directory
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Record store for direct access in tests
    pub record_store: Arc<RecordStore>,

    api_key: Option<String>,

    // Private fields - keep resources alive until drop
    temp_db_dir: Option<TempDir>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    server_task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port, with writes open to everyone
    ///
    /// # Panics
    ///
    /// Panics if the database can't be created, the port can't be bound
    /// or the server doesn't become ready within timeout.
    pub async fn spawn() -> Self {
        Self::spawn_seeded(None).await
    }

    /// Spawns a new test server whose mutating routes require `api_key`
    pub async fn spawn_with_api_key(api_key: &str) -> Self {
        Self::spawn_seeded(Some(api_key.to_string())).await
    }

    async fn spawn_seeded(api_key: Option<String>) -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let server = Self::start(temp_db_dir, api_key).await;

        for (id, title, genre, year) in [
            (MOVIE_1_ID, MOVIE_1_TITLE, MOVIE_1_GENRE, MOVIE_1_YEAR),
            (MOVIE_2_ID, MOVIE_2_TITLE, MOVIE_2_GENRE, MOVIE_2_YEAR),
            (MOVIE_3_ID, MOVIE_3_TITLE, MOVIE_3_GENRE, MOVIE_3_YEAR),
        ] {
            server
                .record_store
                .create(NewCatalogItem::new(title, genre, year).with_id(id))
                .expect("Failed to seed catalog");
        }

        server
    }

    /// Stops this server and starts a new one on the same database and blob directory
    ///
    /// Use this to check what survives a restart.
    pub async fn restart(mut self) -> Self {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.server_task.take() {
            task.await.expect("Server task panicked");
        }

        let temp_db_dir = self.temp_db_dir.take().expect("Server has no database dir");
        let api_key = self.api_key.take();
        drop(self);
        Self::start(temp_db_dir, api_key).await
    }

    async fn start(temp_db_dir: TempDir, api_key: Option<String>) -> Self {
        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let cli = CliConfig {
            db_dir: Some(temp_db_dir.path().to_path_buf()),
            port,
            logging_level: RequestsLoggingLevel::None,
            content_cache_age_sec: 0, // Disable caching in tests
            api_key: api_key.clone(),
            max_upload_bytes: TEST_MAX_UPLOAD_BYTES,
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).expect("Failed to resolve config");
        let services = build_services(&config)
            .await
            .expect("Failed to build services");
        let record_store = services.record_store.clone();

        let app = make_app(config.server_config(), services);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        // Spawn server in background task with graceful shutdown
        let server_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            record_store,
            api_key,
            temp_db_dir: Some(temp_db_dir),
            shutdown_tx: Some(shutdown_tx),
            server_task: Some(server_task),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    // Server is ready
                    return;
                }
                _ => {
                    // Server not ready yet, wait and retry
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir will be cleaned up automatically
    }
}
