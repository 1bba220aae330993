use anyhow::{Context, Result};
use std::time::Duration;

use tracing::{info, warn};

use axum::{
    body::Bytes,
    extract::{multipart::Multipart, rejection::JsonRejection, DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;

use super::capability::WriteCapability;
use super::{http_cache, log_requests, state::*, ServerConfig};
#[cfg(feature = "slowdown")]
use super::slowdown_request;
use crate::assets::{LinkState, StoredBlob};
use crate::catalog_store::validation::ValidationError;
use crate::catalog_store::{
    CatalogError, CatalogItem, CatalogItemPatch, CatalogResult, NewCatalogItem,
};
use crate::query::CatalogQuery;

/// Room left for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;
const MULTIPART_FILE_FIELD: &str = "file";

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
    pub hash: String,
    pub items: usize,
    pub tracked_assets: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Serialize)]
struct UploadResponse {
    #[serde(flatten)]
    blob: StoredBlob,
    link: LinkState,
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        hash: state.hash.clone(),
        items: state.record_store.len(),
        tracked_assets: state.asset_linker.tracked_keys(),
    };
    Json(stats)
}

// =============================================================================
// Catalog routes
// =============================================================================

async fn post_item(
    _capability: WriteCapability,
    State(store): State<GuardedRecordStore>,
    payload: Result<Json<NewCatalogItem>, JsonRejection>,
) -> CatalogResult<(StatusCode, Json<CatalogItem>)> {
    let Json(new_item) = payload.map_err(|e| malformed_body("create", e))?;
    let item = store.create(new_item)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn list_items(
    State(query_engine): State<GuardedQueryEngine>,
    Query(query): Query<CatalogQuery>,
) -> CatalogResult<Json<Vec<CatalogItem>>> {
    Ok(Json(query_engine.query(query)?))
}

async fn list_genre(
    State(query_engine): State<GuardedQueryEngine>,
    Path(genre): Path<String>,
) -> Json<Vec<CatalogItem>> {
    Json(query_engine.filter_by_genre(&genre))
}

async fn get_item(
    State(store): State<GuardedRecordStore>,
    Path(id): Path<String>,
) -> CatalogResult<Json<CatalogItem>> {
    Ok(Json(store.get(&id)?))
}

async fn patch_item(
    _capability: WriteCapability,
    State(store): State<GuardedRecordStore>,
    Path(id): Path<String>,
    payload: Result<Json<CatalogItemPatch>, JsonRejection>,
) -> CatalogResult<Json<CatalogItem>> {
    let Json(patch) = payload.map_err(|e| malformed_body("update", e))?;
    Ok(Json(store.update(&id, patch)?))
}

async fn delete_item(
    _capability: WriteCapability,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> CatalogResult<Json<CatalogItem>> {
    let removed = state.record_store.delete(&id)?;
    state.asset_linker.release_record(&removed);
    Ok(Json(removed))
}

async fn put_item_asset(
    _capability: WriteCapability,
    State(linker): State<GuardedAssetLinker>,
    Path((id, key)): Path<(String, String)>,
) -> CatalogResult<Json<CatalogItem>> {
    Ok(Json(linker.replace(&id, &key)?))
}

fn malformed_body(operation: &'static str, rejection: JsonRejection) -> CatalogError {
    CatalogError::invalid(
        operation,
        ValidationError::Malformed {
            field: "body",
            reason: rejection.body_text(),
        },
    )
}

// =============================================================================
// Asset routes
// =============================================================================

/// Stores the file, then lets the linker know it arrived.
async fn store_upload(
    state: &ServerState,
    name: &str,
    data: &[u8],
) -> CatalogResult<(StatusCode, Json<UploadResponse>)> {
    let blob = state
        .blob_store
        .store(name, data)
        .await
        .map_err(|e| e.into_catalog_error("upload"))?;

    let link = match state.asset_linker.file_stored(&blob.key) {
        Ok(link) => link,
        Err(CatalogError::StaleAssetLink { id, .. }) => {
            warn!(
                "Upload {} was requested by deleted item {}, leaving it unlinked",
                blob.key, id
            );
            LinkState::Unlinked
        }
        Err(e) => return Err(e),
    };
    info!("Uploaded {} ({} bytes)", blob.key, blob.size);
    Ok((StatusCode::CREATED, Json(UploadResponse { blob, link })))
}

async fn put_asset(
    _capability: WriteCapability,
    State(state): State<ServerState>,
    Path(key): Path<String>,
    body: Bytes,
) -> CatalogResult<(StatusCode, Json<UploadResponse>)> {
    store_upload(&state, &key, &body).await
}

async fn post_asset(
    _capability: WriteCapability,
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> CatalogResult<(StatusCode, Json<UploadResponse>)> {
    const OP: &str = "upload";
    let malformed = |reason: String| {
        CatalogError::invalid(
            OP,
            ValidationError::Malformed {
                field: "multipart",
                reason,
            },
        )
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| malformed(e.body_text()))?
    {
        if field.name() != Some(MULTIPART_FILE_FIELD) {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_owned)
            .ok_or_else(|| malformed("the file field has no file name".to_string()))?;
        let data = field.bytes().await.map_err(|e| malformed(e.body_text()))?;
        return store_upload(&state, &name, &data).await;
    }
    Err(malformed(format!(
        "missing the '{}' field",
        MULTIPART_FILE_FIELD
    )))
}

async fn link_asset(
    _capability: WriteCapability,
    State(linker): State<GuardedAssetLinker>,
    Path((key, id)): Path<(String, String)>,
) -> CatalogResult<Json<LinkState>> {
    Ok(Json(linker.record_requests_asset(&id, &key)?))
}

async fn get_asset_state(
    State(linker): State<GuardedAssetLinker>,
    Path(key): Path<String>,
) -> Json<LinkState> {
    Json(linker.state(&key))
}

async fn get_asset_content(
    State(blob_store): State<GuardedBlobStore>,
    Path(key): Path<String>,
) -> CatalogResult<Response> {
    let data = blob_store
        .fetch(&key)
        .await
        .map_err(|e| e.into_catalog_error("fetch"))?;
    let content_type = infer::get(&data)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");
    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}

// =============================================================================
// App
// =============================================================================

pub fn make_app(config: ServerConfig, services: CatalogServices) -> Router {
    let body_limit = usize::try_from(config.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let state = ServerState::new(config.clone(), services);

    let catalog_routes: Router = Router::new()
        .route("/catalog", get(list_items).post(post_item))
        .route("/catalog/{genre}", get(list_genre))
        .route(
            "/catalog/item/{id}",
            get(get_item).patch(patch_item).delete(delete_item),
        )
        .route("/catalog/item/{id}/asset/{key}", put(put_item_asset))
        .with_state(state.clone());

    let asset_routes: Router = Router::new()
        .route("/assets", post(post_asset))
        .route("/assets/{key}", get(get_asset_state).put(put_asset))
        .route("/assets/{key}/link/{id}", post(link_asset))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state.clone());

    let content_routes: Router = Router::new()
        .route("/assets/{key}/content", get(get_asset_content))
        .layer(middleware::from_fn_with_state(
            config.content_cache_age_sec,
            http_cache,
        ))
        .with_state(state.clone());

    let mut app: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .merge(catalog_routes)
        .merge(asset_routes)
        .merge(content_routes);

    #[cfg(feature = "slowdown")]
    {
        app = app.layer(middleware::from_fn(slowdown_request));
    }
    app = app.layer(middleware::from_fn_with_state(state, log_requests));

    app
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

pub async fn run_server(config: ServerConfig, services: CatalogServices) -> Result<()> {
    let address = format!("{}:{}", config.host, config.port);
    let app = make_app(config, services);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{BlobStore, FsBlobStore};
    use crate::catalog_store::RecordStore;
    use crate::query::GenreMatch;
    use crate::server::RequestsLoggingLevel;
    use axum::{body::Body, http::Request};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt; // for `oneshot`

    const API_KEY: &str = "test-key";

    async fn make_test_app(api_key: Option<&str>) -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let blob_store = FsBlobStore::new(dir.path(), 1024);
        blob_store.init().await.unwrap();
        let blob_store: Arc<dyn BlobStore> = Arc::new(blob_store);

        let services = CatalogServices::new(
            Arc::new(RecordStore::in_memory()),
            blob_store,
            GenreMatch::Exact,
        );
        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            content_cache_age_sec: 60,
            api_key: api_key.map(str::to_owned),
            max_upload_bytes: 1024,
            ..Default::default()
        };
        (make_app(config, services), dir)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_and_filter_by_genre() {
        let (app, _dir) = make_test_app(None).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/catalog",
                serde_json::json!({"title": "Dune", "genre": "SciFi", "year": 2021}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["id"], "m1");

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/catalog/SciFi"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!([{
                "id": "m1", "title": "Dune", "genre": "SciFi", "year": 2021, "asset_ref": null
            }])
        );

        let response = app
            .oneshot(empty_request("GET", "/catalog/Western"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn error_kinds_map_to_statuses() {
        let (app, _dir) = make_test_app(None).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/catalog",
                serde_json::json!({"title": "Dune", "genre": "SciFi", "year": 1700}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "InvalidField");

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/catalog",
                serde_json::json!({"title": "Dune"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/catalog/item/m1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(empty_request("GET", "/catalog?year_from=2000&year_to=1990"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_then_link() {
        let (app, _dir) = make_test_app(None).await;
        app.clone()
            .oneshot(json_request(
                "POST",
                "/catalog",
                serde_json::json!({"title": "Dune", "genre": "SciFi", "year": 2021}),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/assets/dune.mp4")
                    .body(Body::from("spice"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["key"], "dune.mp4");
        assert_eq!(body["size"], 5);
        assert_eq!(body["link"]["state"], "file_pending");

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/assets/dune.mp4/link/m1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"state": "linked", "item_id": "m1"})
        );

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/catalog/item/m1"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["asset_ref"], "dune.mp4");

        let response = app
            .oneshot(empty_request("GET", "/assets/dune.mp4/content"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "public, max-age=60"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"spice");
    }

    #[tokio::test]
    async fn deleting_item_drops_its_link_request() {
        let (app, _dir) = make_test_app(None).await;
        app.clone()
            .oneshot(json_request(
                "POST",
                "/catalog",
                serde_json::json!({"title": "Dune", "genre": "SciFi", "year": 2021}),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(empty_request("POST", "/assets/dune.mp4/link/m1"))
            .await
            .unwrap();
        app.clone()
            .oneshot(empty_request("DELETE", "/catalog/item/m1"))
            .await
            .unwrap();

        // The request went away with the item, so the upload waits for a new one.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/assets/dune.mp4")
                    .body(Body::from("spice"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["link"]["state"], "file_pending");

        let response = app
            .oneshot(empty_request("GET", "/assets/dune.mp4"))
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"state": "file_pending"})
        );
    }

    #[tokio::test]
    async fn mutating_routes_require_api_key() {
        let (app, _dir) = make_test_app(Some(API_KEY)).await;

        let protected = vec![
            json_request(
                "POST",
                "/catalog",
                serde_json::json!({"title": "Dune", "genre": "SciFi", "year": 2021}),
            ),
            json_request("PATCH", "/catalog/item/m1", serde_json::json!({"year": 2020})),
            empty_request("DELETE", "/catalog/item/m1"),
            empty_request("PUT", "/catalog/item/m1/asset/dune.mp4"),
            empty_request("PUT", "/assets/dune.mp4"),
            empty_request("POST", "/assets"),
            empty_request("POST", "/assets/dune.mp4/link/m1"),
        ];
        for request in protected {
            let uri = request.uri().to_string();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
        }

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/catalog"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut request = json_request(
            "POST",
            "/catalog",
            serde_json::json!({"title": "Dune", "genre": "SciFi", "year": 2021}),
        );
        request.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {}", API_KEY).parse().unwrap(),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn uptime_format() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(
            format_uptime(Duration::from_secs(86_400 + 3_661)),
            "1d 01:01:01"
        );
    }
}
