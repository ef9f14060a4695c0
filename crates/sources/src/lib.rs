//! # Sources Crate
//!
//! Streaming-catalog listings and their resolution onto canonical titles.
//!
//! ## Components
//!
//! ### Catalog adapters
//! Read already-fetched provider listings into `CatalogEntry` values:
//! - JSON-lines fixtures
//! - cached reelgood browse pages
//! - the whats-on-netflix movie array
//!
//! ### Title Resolver
//! Maps each entry onto at most one title id using normalized-name
//! equality, the entry's year and a bias towards theatrical movies, and
//! reports how confident the pick is.
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{ConsolidatedStore, TitleIndex};
//! use sources::{CatalogSource, TitleResolver, WhatsOnNetflix};
//!
//! let store = ConsolidatedStore::open(Path::new("data/titles.db"))?;
//! let entries = WhatsOnNetflix::new("cache/movie.json").entries()?;
//!
//! // One store query per distinct name, then resolve in parallel
//! let index = TitleIndex::prefetch(&store, entries.iter().map(|e| e.name.as_str()))?;
//! let results = TitleResolver::new(&index).par_resolve_all(&entries)?;
//! ```

// Public modules
pub mod catalog;
pub mod resolver;
pub mod types;

// Re-export commonly used types
pub use catalog::{
    CatalogError, CatalogFormat, CatalogSource, JsonLinesCatalog, ReelgoodCache, WhatsOnNetflix,
    merge_catalogs, open_catalog, parse_catalog_rating,
};
pub use resolver::TitleResolver;
pub use types::{CatalogEntry, MatchConfidence, ResolutionResult};

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{BasicsRecord, ConsolidatedStore, TitleIndex, TitleType};

    fn basics(id: &str, name: &str, year: u16) -> BasicsRecord {
        BasicsRecord {
            id: id.to_string(),
            title_type: TitleType::Movie,
            primary_name: name.to_string(),
            original_name: name.to_string(),
            release_year: Some(year),
            genres: Vec::new(),
            rating: None,
            rating_votes: None,
        }
    }

    #[test]
    fn test_store_and_prefetched_index_resolve_alike() {
        let mut store = ConsolidatedStore::open_in_memory().unwrap();
        store.upsert_basics(&basics("tt0002", "Knives Out", 2019)).unwrap();
        store.upsert_basics(&basics("tt0003", "Knives Out", 1985)).unwrap();
        store.upsert_basics(&basics("tt0001", "Jallikattu", 2019)).unwrap();

        let entries = vec![
            CatalogEntry::new("Knives Out", "netflix", Some(2019)),
            CatalogEntry::new("Jallikattu", "netflix", None),
            CatalogEntry::new("Some Unknown Film", "netflix", Some(2019)),
        ];

        let direct = TitleResolver::new(&store).resolve_all(&entries).unwrap();
        let index = TitleIndex::prefetch(&store, entries.iter().map(|e| e.name.as_str())).unwrap();
        let prefetched = TitleResolver::new(&index).par_resolve_all(&entries).unwrap();

        assert_eq!(direct, prefetched);
        assert_eq!(direct[0].confidence, MatchConfidence::YearDisambiguated);
        assert_eq!(direct[1].confidence, MatchConfidence::Exact);
        assert_eq!(direct[2].confidence, MatchConfidence::Unresolved);
    }

    #[test]
    fn test_catalog_entry_creation() {
        let entry = CatalogEntry::new("Roma", "netflix", Some(2018)).with_source_id("80240715");
        assert_eq!(entry.provider, "netflix");
        assert_eq!(entry.source_id.as_deref(), Some("80240715"));
    }
}
