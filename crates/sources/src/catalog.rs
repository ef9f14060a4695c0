//! Catalog source adapters.
//!
//! Scraping is not done here. Each adapter reads listings that were already
//! fetched to disk and yields them in file order:
//!
//! - `JsonLinesCatalog`: one `{"name", "provider", "year"}` object per line
//! - `ReelgoodCache`: cached reelgood browse pages, `{"results": [{title, released_on, slug, imdb_rating}]}`
//! - `WhatsOnNetflix`: the whats-on-netflix movie array, `[{title, titlereleased, netflixid, imdb}]`
//!
//! `merge_catalogs` folds several listings into one, dropping duplicates.

use crate::types::CatalogEntry;
use data_loader::normalize_title;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const NETFLIX: &str = "netflix";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid catalog entry at {path}:{line}: {reason}")]
    InvalidEntry {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Unknown catalog format '{0}' (expected jsonl, reelgood or whats-on-netflix)")]
    UnknownFormat(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Anything that yields a finite, ordered list of catalog entries
pub trait CatalogSource {
    /// Short label used in logs
    fn name(&self) -> &str;

    fn entries(&self) -> Result<Vec<CatalogEntry>>;
}

/// On-disk layouts the CLI can be pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    JsonLines,
    Reelgood,
    WhatsOnNetflix,
}

impl std::str::FromStr for CatalogFormat {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jsonl" | "json-lines" => Ok(CatalogFormat::JsonLines),
            "reelgood" => Ok(CatalogFormat::Reelgood),
            "whats-on-netflix" | "won" => Ok(CatalogFormat::WhatsOnNetflix),
            other => Err(CatalogError::UnknownFormat(other.to_string())),
        }
    }
}

/// Build the adapter for `format` reading `path`
pub fn open_catalog(format: CatalogFormat, path: &Path, provider: &str) -> Box<dyn CatalogSource> {
    match format {
        CatalogFormat::JsonLines => Box::new(JsonLinesCatalog::new(path)),
        CatalogFormat::Reelgood => Box::new(ReelgoodCache::new(path, provider)),
        CatalogFormat::WhatsOnNetflix => Box::new(WhatsOnNetflix::new(path)),
    }
}

// =============================================================================
// JSON lines fixture
// =============================================================================

pub struct JsonLinesCatalog {
    path: PathBuf,
}

impl JsonLinesCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CatalogSource for JsonLinesCatalog {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn entries(&self) -> Result<Vec<CatalogEntry>> {
        let text = read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: CatalogEntry =
                serde_json::from_str(line).map_err(|e| CatalogError::InvalidEntry {
                    path: self.path.display().to_string(),
                    line: i + 1,
                    reason: e.to_string(),
                })?;
            entries.push(entry);
        }
        debug!("Read {} entries from {}", entries.len(), self.path.display());
        Ok(entries)
    }
}

// =============================================================================
// Reelgood cached browse pages
// =============================================================================

#[derive(Deserialize)]
struct ReelgoodPage {
    #[serde(default)]
    results: Vec<ReelgoodItem>,
}

#[derive(Deserialize)]
struct ReelgoodItem {
    title: String,
    #[serde(default)]
    released_on: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    /// A bare number in most pages, occasionally a string
    #[serde(default)]
    imdb_rating: Option<serde_json::Value>,
}

/// Cached reelgood pages: either a single page file or a directory of
/// `reelgood_<provider>_from_<offset>_sz_<size>.json` files.
pub struct ReelgoodCache {
    path: PathBuf,
    provider: String,
}

impl ReelgoodCache {
    pub fn new(path: impl Into<PathBuf>, provider: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            provider: provider.into(),
        }
    }

    /// Page files for this provider, ordered by their offset
    fn page_files(&self) -> Result<Vec<PathBuf>> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }
        let prefix = format!("reelgood_{}", self.provider);
        let listing = fs::read_dir(&self.path).map_err(|source| CatalogError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        let mut pages = Vec::new();
        for dir_entry in listing {
            let path = dir_entry
                .map_err(|source| CatalogError::Io {
                    path: self.path.display().to_string(),
                    source,
                })?
                .path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with(&prefix) && file_name.ends_with(".json") {
                pages.push((page_offset(file_name), file_name.to_string(), path));
            }
        }
        pages.sort();
        Ok(pages.into_iter().map(|(_, _, path)| path).collect())
    }
}

/// Offset encoded as `_from_<n>_` in a page file name
fn page_offset(file_name: &str) -> u64 {
    file_name
        .split("_from_")
        .nth(1)
        .and_then(|rest| rest.split('_').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

impl CatalogSource for ReelgoodCache {
    fn name(&self) -> &str {
        "reelgood"
    }

    fn entries(&self) -> Result<Vec<CatalogEntry>> {
        let mut entries = Vec::new();
        let pages = self.page_files()?;
        if pages.is_empty() {
            warn!("No reelgood pages for {} under {}", self.provider, self.path.display());
        }
        for page in &pages {
            let text = read_to_string(page)?;
            let parsed: ReelgoodPage =
                serde_json::from_str(&text).map_err(|source| CatalogError::Json {
                    path: page.display().to_string(),
                    source,
                })?;
            for item in parsed.results {
                let year = item.released_on.as_deref().and_then(leading_year);
                let rating = match item.imdb_rating {
                    Some(serde_json::Value::Number(n)) => {
                        n.as_f64().and_then(|r| valid_rating(r as f32))
                    }
                    Some(serde_json::Value::String(s)) => parse_catalog_rating(&s),
                    _ => None,
                };
                let mut entry = CatalogEntry::new(item.title, self.provider.clone(), year)
                    .with_catalog_rating(rating);
                entry.source_id = item.slug.map(|slug| format!("slug_{}", slug));
                entries.push(entry);
            }
        }
        info!(
            "Read {} reelgood entries for {} from {} pages",
            entries.len(),
            self.provider,
            pages.len()
        );
        Ok(entries)
    }
}

// =============================================================================
// whats-on-netflix
// =============================================================================

#[derive(Deserialize)]
struct WhatsOnNetflixItem {
    title: String,
    #[serde(default)]
    titlereleased: Option<String>,
    #[serde(default)]
    netflixid: Option<String>,
    /// e.g. "7.1/10"
    #[serde(default)]
    imdb: Option<String>,
}

pub struct WhatsOnNetflix {
    path: PathBuf,
}

impl WhatsOnNetflix {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CatalogSource for WhatsOnNetflix {
    fn name(&self) -> &str {
        "whats-on-netflix"
    }

    fn entries(&self) -> Result<Vec<CatalogEntry>> {
        let text = read_to_string(&self.path)?;
        let items: Vec<WhatsOnNetflixItem> =
            serde_json::from_str(&text).map_err(|source| CatalogError::Json {
                path: self.path.display().to_string(),
                source,
            })?;

        let entries: Vec<CatalogEntry> = items
            .into_iter()
            .map(|item| {
                // Listings sometimes carry zero-width characters around the title
                let name = item.title.trim_matches(|c: char| c.is_whitespace() || c == '\u{200b}');
                let year = item.titlereleased.as_deref().and_then(leading_year);
                let rating = item.imdb.as_deref().and_then(parse_catalog_rating);
                let mut entry = CatalogEntry::new(name, NETFLIX, year).with_catalog_rating(rating);
                entry.source_id = item.netflixid.filter(|id| !id.is_empty());
                entry
            })
            .collect();
        info!("Read {} whats-on-netflix entries", entries.len());
        Ok(entries)
    }
}

/// Parse a listing's rating: "7.1/10", "7.1" or "N/A"
pub fn parse_catalog_rating(text: &str) -> Option<f32> {
    let score = text.split('/').next()?.trim();
    score.parse::<f32>().ok().and_then(valid_rating)
}

fn valid_rating(rating: f32) -> Option<f32> {
    (rating.is_finite() && (0.0..=10.0).contains(&rating)).then_some(rating)
}

// =============================================================================
// Merging
// =============================================================================

/// Concatenate listings in order, dropping later duplicates.
///
/// Two entries of the same provider are duplicates when they share a source
/// id, or, lacking one, the same normalized name and year.
pub fn merge_catalogs(listings: impl IntoIterator<Item = Vec<CatalogEntry>>) -> Vec<CatalogEntry> {
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut merged = Vec::new();
    let mut duplicates = 0usize;

    for entry in listings.into_iter().flatten() {
        let fresh = match &entry.source_id {
            Some(id) => seen_ids.insert((entry.provider.clone(), id.clone())),
            None => seen_names.insert((
                entry.provider.clone(),
                normalize_title(&entry.name),
                entry.year,
            )),
        };
        if fresh {
            merged.push(entry);
        } else {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        debug!("Merged catalogs: {} duplicates dropped", duplicates);
    }
    merged
}

fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Year from values like "2017" or "2017-09-15T00:00:00"
fn leading_year(value: &str) -> Option<u16> {
    value.get(..4).and_then(|y| y.parse().ok())
}
