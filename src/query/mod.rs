mod engine;
pub mod predicates;

pub use engine::QueryEngine;
pub use predicates::{CatalogQuery, GenreMatch, Predicate};
