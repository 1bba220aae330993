//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all catalog server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// HTTP test client, optionally sending an API key with every request
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    api_key: Option<String>,
}

impl TestClient {
    /// Creates a client that sends no API key
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            api_key: None,
        }
    }

    /// Creates a client that authorizes every request with `api_key`
    pub fn with_api_key(base_url: String, api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Self::new(base_url)
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Response {
        self.authorize(request)
            .send()
            .await
            .unwrap_or_else(|e| panic!("{} request failed: {}", what, e))
    }

    // ========================================================================
    // Server
    // ========================================================================

    /// GET /
    pub async fn get_stats(&self) -> Response {
        self.send(self.client.get(format!("{}/", self.base_url)), "Stats")
            .await
    }

    // ========================================================================
    // Catalog Endpoints
    // ========================================================================

    /// POST /catalog
    pub async fn create_item(&self, body: &Value) -> Response {
        self.send(
            self.client
                .post(format!("{}/catalog", self.base_url))
                .json(body),
            "Create item",
        )
        .await
    }

    /// POST /catalog with a raw body, for malformed payloads
    pub async fn create_item_raw(&self, body: &str) -> Response {
        self.send(
            self.client
                .post(format!("{}/catalog", self.base_url))
                .header("Content-Type", "application/json")
                .body(body.to_string()),
            "Create item",
        )
        .await
    }

    /// GET /catalog
    pub async fn list_items(&self) -> Response {
        self.send(self.client.get(format!("{}/catalog", self.base_url)), "List")
            .await
    }

    /// GET /catalog with query parameters
    pub async fn query_items(&self, params: &[(&str, &str)]) -> Response {
        self.send(
            self.client
                .get(format!("{}/catalog", self.base_url))
                .query(params),
            "Query",
        )
        .await
    }

    /// GET /catalog/{genre}
    pub async fn list_genre(&self, genre: &str) -> Response {
        self.send(
            self.client.get(format!("{}/catalog/{}", self.base_url, genre)),
            "List genre",
        )
        .await
    }

    /// GET /catalog/item/{id}
    pub async fn get_item(&self, id: &str) -> Response {
        self.send(
            self.client
                .get(format!("{}/catalog/item/{}", self.base_url, id)),
            "Get item",
        )
        .await
    }

    /// PATCH /catalog/item/{id}
    pub async fn update_item(&self, id: &str, body: &Value) -> Response {
        self.send(
            self.client
                .patch(format!("{}/catalog/item/{}", self.base_url, id))
                .json(body),
            "Update item",
        )
        .await
    }

    /// DELETE /catalog/item/{id}
    pub async fn delete_item(&self, id: &str) -> Response {
        self.send(
            self.client
                .delete(format!("{}/catalog/item/{}", self.base_url, id)),
            "Delete item",
        )
        .await
    }

    /// PUT /catalog/item/{id}/asset/{key}
    pub async fn replace_item_asset(&self, id: &str, key: &str) -> Response {
        self.send(
            self.client
                .put(format!("{}/catalog/item/{}/asset/{}", self.base_url, id, key)),
            "Replace asset",
        )
        .await
    }

    // ========================================================================
    // Asset Endpoints
    // ========================================================================

    /// PUT /assets/{key} with the raw file as body
    pub async fn upload_asset(&self, key: &str, data: &[u8]) -> Response {
        self.send(
            self.client
                .put(format!("{}/assets/{}", self.base_url, key))
                .body(data.to_vec()),
            "Upload asset",
        )
        .await
    }

    /// POST /assets with a multipart form
    pub async fn upload_asset_multipart(&self, file_name: &str, data: &[u8]) -> Response {
        let part = reqwest::multipart::Part::bytes(data.to_vec()).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        self.send(
            self.client
                .post(format!("{}/assets", self.base_url))
                .multipart(form),
            "Multipart upload",
        )
        .await
    }

    /// POST /assets/{key}/link/{id}
    pub async fn link_asset(&self, key: &str, id: &str) -> Response {
        self.send(
            self.client
                .post(format!("{}/assets/{}/link/{}", self.base_url, key, id)),
            "Link asset",
        )
        .await
    }

    /// GET /assets/{key}
    pub async fn get_asset_state(&self, key: &str) -> Response {
        self.send(
            self.client.get(format!("{}/assets/{}", self.base_url, key)),
            "Asset state",
        )
        .await
    }

    /// GET /assets/{key}/content
    pub async fn get_asset_content(&self, key: &str) -> Response {
        self.send(
            self.client
                .get(format!("{}/assets/{}/content", self.base_url, key)),
            "Asset content",
        )
        .await
    }
}
