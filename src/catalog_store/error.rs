//! Errors surfaced by the record store, the query engine and the asset linker.

use super::validation::ValidationError;
use thiserror::Error;

/// Every rejected catalog operation maps to exactly one of these kinds.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{operation}: item '{id}' already exists")]
    DuplicateId { operation: &'static str, id: String },

    #[error("{operation}: {entity} '{id}' not found")]
    NotFound {
        operation: &'static str,
        entity: &'static str,
        id: String,
    },

    #[error("{operation}: {source}")]
    InvalidField {
        operation: &'static str,
        #[source]
        source: ValidationError,
    },

    #[error("{operation}: asset '{key}' is already linked to item '{id}'")]
    AlreadyLinked {
        operation: &'static str,
        key: String,
        id: String,
    },

    #[error("{operation}: asset '{key}' was dropped, item '{id}' no longer exists")]
    StaleAssetLink {
        operation: &'static str,
        key: String,
        id: String,
    },

    #[error("{operation}: {collaborator} unavailable: {message}")]
    CollaboratorUnavailable {
        operation: &'static str,
        collaborator: &'static str,
        message: String,
    },
}

impl CatalogError {
    pub fn item_not_found(operation: &'static str, id: &str) -> Self {
        CatalogError::NotFound {
            operation,
            entity: "item",
            id: id.to_owned(),
        }
    }

    pub fn asset_not_found(operation: &'static str, key: &str) -> Self {
        CatalogError::NotFound {
            operation,
            entity: "asset",
            id: key.to_owned(),
        }
    }

    pub fn invalid(operation: &'static str, source: ValidationError) -> Self {
        CatalogError::InvalidField { operation, source }
    }

    /// Wraps a collaborator failure, keeping the whole error chain in the message.
    pub fn collaborator(
        operation: &'static str,
        collaborator: &'static str,
        err: impl std::fmt::Display,
    ) -> Self {
        CatalogError::CollaboratorUnavailable {
            operation,
            collaborator,
            message: format!("{:#}", err),
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::DuplicateId { .. } => "DuplicateId",
            CatalogError::NotFound { .. } => "NotFound",
            CatalogError::InvalidField { .. } => "InvalidField",
            CatalogError::AlreadyLinked { .. } => "AlreadyLinked",
            CatalogError::StaleAssetLink { .. } => "StaleAssetLink",
            CatalogError::CollaboratorUnavailable { .. } => "CollaboratorUnavailable",
        }
    }

    /// Re-labels the error with the operation the caller was performing.
    pub fn in_operation(self, op: &'static str) -> Self {
        match self {
            CatalogError::DuplicateId { id, .. } => CatalogError::DuplicateId { operation: op, id },
            CatalogError::NotFound { entity, id, .. } => CatalogError::NotFound {
                operation: op,
                entity,
                id,
            },
            CatalogError::InvalidField { source, .. } => CatalogError::InvalidField {
                operation: op,
                source,
            },
            CatalogError::AlreadyLinked { key, id, .. } => CatalogError::AlreadyLinked {
                operation: op,
                key,
                id,
            },
            CatalogError::StaleAssetLink { key, id, .. } => CatalogError::StaleAssetLink {
                operation: op,
                key,
                id,
            },
            CatalogError::CollaboratorUnavailable {
                collaborator,
                message,
                ..
            } => CatalogError::CollaboratorUnavailable {
                operation: op,
                collaborator,
                message,
            },
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
