//! Write capability check for mutating routes.

use super::state::ServerState;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};
use tracing::debug;

pub const HEADER_API_KEY: &str = "X-Api-Key";

/// Proof that the caller may mutate the catalog.
///
/// Always granted when the server has no API key configured.
#[derive(Debug)]
pub struct WriteCapability;

#[derive(Debug)]
pub enum CapabilityError {
    Forbidden,
}

impl IntoResponse for CapabilityError {
    fn into_response(self) -> Response {
        match self {
            CapabilityError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({
                    "error": "Forbidden",
                    "message": "a valid API key is required for this operation",
                })),
            )
                .into_response(),
        }
    }
}

fn presented_key(parts: &Parts) -> Option<&str> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    bearer.or_else(|| {
        parts
            .headers
            .get(HEADER_API_KEY)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    })
}

/// Compares digests so the comparison time does not depend on the key prefix.
fn keys_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

impl FromRequestParts<ServerState> for WriteCapability {
    type Rejection = CapabilityError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = ctx.config.api_key.as_deref() else {
            return Ok(WriteCapability);
        };
        match presented_key(parts) {
            Some(key) if keys_match(key, expected) => Ok(WriteCapability),
            Some(_) => {
                debug!("Rejected write with a wrong API key on {}", parts.uri.path());
                Err(CapabilityError::Forbidden)
            }
            None => {
                debug!("Rejected write without API key on {}", parts.uri.path());
                Err(CapabilityError::Forbidden)
            }
        }
    }
}
