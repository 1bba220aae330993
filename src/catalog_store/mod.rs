mod error;
mod models;
mod null_persistence;
mod store;
mod trait_def;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{CatalogError, CatalogResult};
pub use models::*;
pub use null_persistence::NoPersistence;
pub use store::RecordStore;
pub use trait_def::{IdState, RecordPersistence};
pub use validation::ValidationError;
