//! Data flowing through the filter pipeline and into the report.

use data_loader::{CanonicalTitle, Result as LoadResult, TitleLookup};
use serde::{Deserialize, Serialize};
use sources::{MatchConfidence, ResolutionResult};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// A resolved catalog entry joined with the store's facts about its title.
///
/// `title` is `None` for unresolved entries.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMatch {
    pub resolution: ResolutionResult,
    pub title: Option<CanonicalTitle>,
    /// `language` codes of the title's alternate names
    pub alternate_languages: BTreeSet<String>,
}

impl CatalogMatch {
    /// A match with no title attached
    pub fn unresolved(resolution: ResolutionResult) -> Self {
        Self {
            resolution,
            title: None,
            alternate_languages: BTreeSet::new(),
        }
    }

    /// Fetch the matched title and its alternate-name languages
    pub fn load<L: TitleLookup + ?Sized>(lookup: &L, resolution: ResolutionResult) -> LoadResult<Self> {
        let Some(id) = resolution.matched_title_id.clone() else {
            return Ok(Self::unresolved(resolution));
        };
        let Some(title) = lookup.lookup_by_id(&id)? else {
            warn!("Matched title {} is no longer in the store", id);
            return Ok(Self::unresolved(resolution));
        };
        let alternate_languages = lookup
            .alternate_names(&id)?
            .into_iter()
            .filter_map(|alt| alt.language)
            .collect();
        Ok(Self {
            resolution,
            title: Some(title),
            alternate_languages,
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.title.is_some()
    }

    /// The resolver's confidence, or unresolved once the title is gone
    pub fn confidence(&self) -> MatchConfidence {
        if self.is_resolved() {
            self.resolution.confidence
        } else {
            MatchConfidence::Unresolved
        }
    }

    pub fn provider(&self) -> &str {
        &self.resolution.entry.provider
    }

    /// The title's year, or the catalog's when the title has none
    pub fn year(&self) -> Option<u16> {
        self.title
            .as_ref()
            .and_then(|t| t.release_year)
            .or(self.resolution.entry.year)
    }

    /// Enrichment languages followed by alternate-name language codes
    pub fn language_tags(&self) -> impl Iterator<Item = &str> {
        self.title
            .iter()
            .flat_map(|t| t.languages.iter())
            .chain(self.alternate_languages.iter())
            .map(String::as_str)
    }
}

/// Rating facts returned by an enrichment lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingFacts {
    pub rating: f32,
    /// `None` when the source does not report a vote count
    pub votes: Option<u32>,
    /// Display-name languages, empty when the source has none
    pub languages: BTreeSet<String>,
}

/// Report ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Highest rating first, unknown last
    #[default]
    Rating,
    /// Alphabetical, case-insensitive
    Name,
    /// Newest first, unknown last
    Year,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rating" => Ok(SortKey::Rating),
            "name" => Ok(SortKey::Name),
            "year" => Ok(SortKey::Year),
            other => Err(format!("unknown sort key '{}' (expected rating, name or year)", other)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::Rating => "rating",
            SortKey::Name => "name",
            SortKey::Year => "year",
        })
    }
}

/// What the report keeps and how it orders it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Keep entries listed by this provider; `None` keeps every provider
    pub provider: Option<String>,
    /// Codes and/or display names; empty keeps every language
    pub languages: BTreeSet<String>,
    pub year: Option<u16>,
    pub sort_by: SortKey,
}

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Accepts a comma-separated list such as "hi,Tamil"
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.languages = languages
            .into_iter()
            .flat_map(|l| {
                l.as_ref()
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect::<Vec<_>>()
            })
            .filter(|l| !l.is_empty())
            .collect();
        self
    }

    pub fn with_year(mut self, year: Option<u16>) -> Self {
        self.year = year;
        self
    }

    pub fn with_sort_by(mut self, sort_by: SortKey) -> Self {
        self.sort_by = sort_by;
        self
    }
}
