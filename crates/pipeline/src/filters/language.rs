//! Filter on the languages a title is known in.

use crate::traits::Filter;
use crate::types::{CatalogMatch, FilterConfig};
use anyhow::Result;
use std::collections::HashSet;

/// Keeps matches carrying at least one requested language.
///
/// ## Algorithm
/// 1. Lowercase the requested set once
/// 2. For each match, compare against its language tags: enrichment
///    languages ("Hindi") plus alternate-name codes ("hi")
/// 3. Keep on any intersection; an empty request keeps everything
pub struct LanguageFilter;

impl Filter for LanguageFilter {
    fn name(&self) -> &str {
        "LanguageFilter"
    }

    fn apply(&self, matches: Vec<CatalogMatch>, config: &FilterConfig) -> Result<Vec<CatalogMatch>> {
        if config.languages.is_empty() {
            return Ok(matches);
        }
        let wanted: HashSet<String> = config.languages.iter().map(|l| l.to_lowercase()).collect();

        let filtered: Vec<CatalogMatch> = matches
            .into_iter()
            .filter(|m| m.language_tags().any(|tag| wanted.contains(&tag.to_lowercase())))
            .collect();
        Ok(filtered)
    }
}
