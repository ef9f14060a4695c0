//! Core traits for the report pipeline.
//!
//! - `Filter`: composable, extensible filters over catalog matches
//! - `RatingLookup`: a best-effort external source of rating facts

use crate::types::{CatalogMatch, FilterConfig, RatingFacts};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

/// One narrowing step over resolved catalog matches.
///
/// Filters take the matches by value and hand back the ones they keep.
pub trait Filter: Send + Sync {
    /// Shown in logs and error context
    fn name(&self) -> &str;

    /// Keep the matches that satisfy `config`'s provider, languages or year
    fn apply(&self, matches: Vec<CatalogMatch>, config: &FilterConfig) -> Result<Vec<CatalogMatch>>;
}

/// Why a single lookup failed. Every variant is retried.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} for {id}")]
    Status { id: String, status: u16 },

    #[error("Could not decode response for {id}: {reason}")]
    Decode { id: String, reason: String },

    #[error("Lookup for {0} timed out")]
    Timeout(String),
}

/// An external source of ratings keyed by title id.
#[async_trait]
pub trait RatingLookup: Send + Sync {
    /// Label used in logs
    fn name(&self) -> &str;

    /// `Ok(None)` when the source has no rating for `id`
    async fn lookup(&self, id: &str) -> std::result::Result<Option<RatingFacts>, LookupError>;
}
