//! Core domain types for the consolidated title store.
//!
//! This module defines the records produced by the dataset readers, the
//! rows held by the store, and the in-memory `TitleIndex`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

// =============================================================================
// Type Aliases
// =============================================================================

/// Stable external identifier of a title (e.g. "tt0111161")
pub type TitleId = String;

/// A normalized name as produced by `normalize::normalize_title`
pub type NormalizedName = String;

// =============================================================================
// Title-related Types
// =============================================================================

/// Kind of work a title describes.
///
/// Source values without a dedicated variant are kept verbatim in `Other`
/// so they can be written back to the store and displayed unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TitleType {
    Movie,
    TvSeries,
    TvEpisode,
    Short,
    Other(String),
}

impl TitleType {
    /// Map a source `titleType` value onto a variant
    pub fn parse(raw: &str) -> Self {
        match raw {
            "movie" => TitleType::Movie,
            "tvSeries" => TitleType::TvSeries,
            "tvEpisode" => TitleType::TvEpisode,
            "short" => TitleType::Short,
            other => TitleType::Other(other.to_string()),
        }
    }

    /// The source spelling of this type
    pub fn as_str(&self) -> &str {
        match self {
            TitleType::Movie => "movie",
            TitleType::TvSeries => "tvSeries",
            TitleType::TvEpisode => "tvEpisode",
            TitleType::Short => "short",
            TitleType::Other(raw) => raw,
        }
    }

    pub fn is_movie(&self) -> bool {
        matches!(self, TitleType::Movie)
    }
}

impl From<String> for TitleType {
    fn from(raw: String) -> Self {
        TitleType::parse(&raw)
    }
}

impl From<TitleType> for String {
    fn from(title_type: TitleType) -> Self {
        title_type.as_str().to_string()
    }
}

impl fmt::Display for TitleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per distinct work in the consolidated store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTitle {
    pub id: TitleId,
    pub primary_name: String,
    pub original_name: String,
    pub title_type: TitleType,
    /// `None` when the source marks the year as unknown
    pub release_year: Option<u16>,
    pub genres: BTreeSet<String>,
    /// Populated by enrichment, never by the basics pass
    pub rating: Option<f32>,
    pub rating_votes: Option<u32>,
    /// Display-name languages learned by enrichment (e.g. "Hindi")
    pub languages: BTreeSet<String>,
}

impl CanonicalTitle {
    /// Build a title carrying only basics facts
    pub fn new(
        id: impl Into<TitleId>,
        name: impl Into<String>,
        title_type: TitleType,
        release_year: Option<u16>,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            original_name: name.clone(),
            primary_name: name,
            title_type,
            release_year,
            genres: BTreeSet::new(),
            rating: None,
            rating_votes: None,
            languages: BTreeSet::new(),
        }
    }

    /// Primary and original name, deduplicated
    pub fn names(&self) -> Vec<&str> {
        if self.primary_name == self.original_name {
            vec![self.primary_name.as_str()]
        } else {
            vec![self.primary_name.as_str(), self.original_name.as_str()]
        }
    }
}

/// Regional or translated title variant, many-to-one with `CanonicalTitle`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlternateName {
    pub title_id: TitleId,
    /// Ordinal of the row within its title; `(title_id, ordering)` is the upsert key
    pub ordering: u32,
    pub name: String,
    pub region: Option<String>,
    pub language: Option<String>,
    pub is_original_title: Option<bool>,
}

// =============================================================================
// Dataset Records
// =============================================================================

/// One parsed line of the title-basics dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicsRecord {
    pub id: TitleId,
    pub title_type: TitleType,
    pub primary_name: String,
    pub original_name: String,
    pub release_year: Option<u16>,
    pub genres: Vec<String>,
    /// Basics dumps never carry these; kept so an upsert can tell
    /// "not provided" apart from a fresh value.
    pub rating: Option<f32>,
    pub rating_votes: Option<u32>,
}

/// One parsed line of the title-akas dataset
pub type AkaRecord = AlternateName;

/// One parsed line of the title-ratings dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub title_id: TitleId,
    pub average_rating: f32,
    pub num_votes: u32,
}

// =============================================================================
// TitleIndex - In-memory lookup arena
// =============================================================================

/// In-memory mirror of the store's lookup contract.
///
/// Holds titles, their alternate names and the normalized-name index. It is
/// either filled directly or prefetched from the store for the names of a
/// catalog so resolution runs without touching SQLite per entry.
#[derive(Debug, Default)]
pub struct TitleIndex {
    pub(crate) titles: HashMap<TitleId, CanonicalTitle>,
    pub(crate) alternate_names: HashMap<TitleId, Vec<AlternateName>>,
    /// normalized name -> ids reachable through a primary, original or alternate name
    pub(crate) name_index: HashMap<NormalizedName, BTreeSet<TitleId>>,
}

impl TitleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_title(&self, id: &str) -> Option<&CanonicalTitle> {
        self.titles.get(id)
    }

    /// Alternate names of a title, empty if none are known
    pub fn get_alternate_names(&self, id: &str) -> &[AlternateName] {
        self.alternate_names
            .get(id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Ids indexed under an already-normalized name
    pub fn ids_for_normalized(&self, normalized: &str) -> Vec<&TitleId> {
        self.name_index
            .get(normalized)
            .map(|ids| ids.iter().collect())
            .unwrap_or_default()
    }

    /// Counts of (titles, alternate names, index keys)
    pub fn counts(&self) -> (usize, usize, usize) {
        let akas = self.alternate_names.values().map(|v| v.len()).sum();
        (self.titles.len(), akas, self.name_index.len())
    }
}
