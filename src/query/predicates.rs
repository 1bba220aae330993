//! Filter predicates over catalog items.
//!
//! A predicate is any `Fn(&CatalogItem) -> bool`; the constructors here build
//! the ones the HTTP listing exposes.

use crate::catalog_store::validation::ValidationError;
use crate::catalog_store::CatalogItem;
use clap::ValueEnum;
use serde::Deserialize;

pub type Predicate = Box<dyn Fn(&CatalogItem) -> bool + Send + Sync>;

/// How genre filters compare genre names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenreMatch {
    #[default]
    Exact,
    CaseInsensitive,
}

impl GenreMatch {
    pub fn matches(self, wanted: &str, genre: &str) -> bool {
        match self {
            GenreMatch::Exact => wanted == genre,
            GenreMatch::CaseInsensitive => wanted.to_lowercase() == genre.to_lowercase(),
        }
    }
}

pub fn genre(wanted: impl Into<String>, mode: GenreMatch) -> Predicate {
    let wanted = wanted.into();
    Box::new(move |item: &CatalogItem| mode.matches(&wanted, &item.genre))
}

/// Inclusive year range, either end may be open.
pub fn year_range(from: Option<i32>, to: Option<i32>) -> Predicate {
    Box::new(move |item: &CatalogItem| {
        from.map_or(true, |from| item.year >= from) && to.map_or(true, |to| item.year <= to)
    })
}

/// Case-insensitive substring match on the title.
pub fn title_contains(needle: &str) -> Predicate {
    let needle = needle.to_lowercase();
    Box::new(move |item: &CatalogItem| item.title.to_lowercase().contains(&needle))
}

pub fn all_of(predicates: Vec<Predicate>) -> Predicate {
    Box::new(move |item: &CatalogItem| predicates.iter().all(|p| p(item)))
}

/// Query parameters of the catalog listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CatalogQuery {
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub title: Option<String>,
}

impl CatalogQuery {
    pub fn is_empty(&self) -> bool {
        self.year_from.is_none() && self.year_to.is_none() && self.title.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let (Some(from), Some(to)) = (self.year_from, self.year_to) {
            if from > to {
                return Err(ValidationError::InvalidRange {
                    field: "year",
                    from,
                    to,
                });
            }
        }
        Ok(())
    }

    pub fn into_predicate(self) -> Predicate {
        let mut predicates = Vec::new();
        if self.year_from.is_some() || self.year_to.is_some() {
            predicates.push(year_range(self.year_from, self.year_to));
        }
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            predicates.push(title_contains(title));
        }
        all_of(predicates)
    }
}
