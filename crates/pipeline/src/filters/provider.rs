//! Filter to keep only the requested provider's listings.
//!
//! This is the one filter unresolved entries also go through, so the
//! coverage-gap list stays scoped to the provider being reported on.

use crate::traits::Filter;
use crate::types::{CatalogMatch, FilterConfig};
use anyhow::Result;

/// Keeps matches whose catalog entry came from `config.provider`.
///
/// Comparison is case-insensitive; no provider configured keeps everything.
pub struct ProviderFilter;

impl Filter for ProviderFilter {
    fn name(&self) -> &str {
        "ProviderFilter"
    }

    fn apply(&self, matches: Vec<CatalogMatch>, config: &FilterConfig) -> Result<Vec<CatalogMatch>> {
        let Some(provider) = config.provider.as_deref() else {
            return Ok(matches);
        };
        let filtered: Vec<CatalogMatch> = matches
            .into_iter()
            .filter(|m| m.provider().eq_ignore_ascii_case(provider))
            .collect();
        Ok(filtered)
    }
}
