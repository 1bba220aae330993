use crate::catalog_store::CatalogError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

pub fn status_for(err: &CatalogError) -> StatusCode {
    match err {
        CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
        CatalogError::DuplicateId { .. } | CatalogError::AlreadyLinked { .. } => {
            StatusCode::CONFLICT
        }
        CatalogError::InvalidField { .. } => StatusCode::BAD_REQUEST,
        CatalogError::StaleAssetLink { .. } => StatusCode::GONE,
        CatalogError::CollaboratorUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        debug!("Request failed with {}: {}", status, self);
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
