//! Types shared by the catalog adapters and the resolver.

use data_loader::TitleId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One listing scraped from a streaming provider's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub year: Option<u16>,
    /// Provider-side identifier (netflix id, reelgood slug) when the source has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// IMDb rating printed in the listing itself, out of 10
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_rating: Option<f32>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, provider: impl Into<String>, year: Option<u16>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            year,
            source_id: None,
            catalog_rating: None,
        }
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_catalog_rating(mut self, rating: Option<f32>) -> Self {
        self.catalog_rating = rating;
        self
    }
}

/// How a catalog entry was mapped onto a title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchConfidence {
    /// Exactly one title carries the name
    Exact,
    /// The entry's year (or the movie type among same-year titles) picked one
    YearDisambiguated,
    /// Best-effort pick among several plausible titles
    Fuzzy,
    /// No title picked
    Unresolved,
}

impl MatchConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchConfidence::Exact => "exact",
            MatchConfidence::YearDisambiguated => "year-disambiguated",
            MatchConfidence::Fuzzy => "fuzzy",
            MatchConfidence::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for MatchConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub entry: CatalogEntry,
    pub matched_title_id: Option<TitleId>,
    pub confidence: MatchConfidence,
    /// Distinct titles sharing the entry's normalized name
    pub candidate_count: usize,
}

impl ResolutionResult {
    pub fn unresolved(entry: CatalogEntry, candidate_count: usize) -> Self {
        Self {
            entry,
            matched_title_id: None,
            confidence: MatchConfidence::Unresolved,
            candidate_count,
        }
    }

    pub fn matched(
        entry: CatalogEntry,
        title_id: TitleId,
        confidence: MatchConfidence,
        candidate_count: usize,
    ) -> Self {
        Self {
            entry,
            matched_title_id: Some(title_id),
            confidence,
            candidate_count,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.matched_title_id.is_some()
    }
}
