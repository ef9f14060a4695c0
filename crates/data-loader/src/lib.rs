//! # Data Loader Crate
//!
//! This crate consolidates the title dumps into one local SQLite store and
//! exposes the name lookups the resolver runs against.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (CanonicalTitle, AlternateName, dataset records, TitleIndex)
//! - **parser**: Streaming readers over the tab-separated dumps
//! - **normalize**: The name normalization shared by indexing and resolution
//! - **store**: The SQLite-backed consolidated store
//! - **etl**: Basics + akas passes into the store
//! - **index**: In-memory TitleIndex, prefetched from the store
//! - **lookup**: The `TitleLookup` trait both of the above implement
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{build_store, ConsolidatedStore, DatasetPaths, EtlOptions, TitleLookup};
//! use std::path::Path;
//!
//! let mut store = ConsolidatedStore::open(Path::new("data/titles.db"))?;
//! let summary = build_store(&mut store, &DatasetPaths::in_dir(Path::new("data")), EtlOptions::default())?;
//! println!("{} titles, {} rows skipped", summary.titles_upserted, summary.rows_skipped());
//!
//! for title in store.lookup_by_normalized_name("The Matrix")? {
//!     println!("{} {:?}", title.id, title.release_year);
//! }
//! ```

pub mod error;
pub mod etl;
pub mod index;
pub mod lookup;
pub mod normalize;
pub mod parser;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use etl::{DatasetPaths, EtlOptions, EtlSummary, build_from_readers, build_store};
pub use lookup::TitleLookup;
pub use normalize::normalize_title;
pub use parser::{AkasReader, BasicsReader, DatasetReader, RatingsReader};
pub use store::{
    AkaUpsert, ConsolidatedStore, DEFAULT_BATCH_SIZE, DEFAULT_DEFERRED_LIMIT, RetryOutcome,
};
pub use types::{
    // Type aliases
    NormalizedName,
    TitleId,
    // Core types
    AkaRecord,
    AlternateName,
    BasicsRecord,
    CanonicalTitle,
    RatingRecord,
    TitleIndex,
    // Enums
    TitleType,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_index_creation() {
        let index = TitleIndex::new();
        let (titles, akas, keys) = index.counts();

        assert_eq!(titles, 0);
        assert_eq!(akas, 0);
        assert_eq!(keys, 0);
    }

    #[test]
    fn test_empty_queries() {
        let index = TitleIndex::new();

        // Querying non-existent data should return None or empty slices
        assert!(index.get_title("tt999").is_none());
        assert!(index.get_alternate_names("tt999").is_empty());
        assert!(index.lookup_by_normalized_name("anything").unwrap().is_empty());
    }

    #[test]
    fn test_store_and_index_agree() {
        let mut store = ConsolidatedStore::open_in_memory().unwrap();
        let record = BasicsRecord {
            id: "tt0133093".to_string(),
            title_type: TitleType::Movie,
            primary_name: "The Matrix".to_string(),
            original_name: "The Matrix".to_string(),
            release_year: Some(1999),
            genres: vec!["Action".to_string(), "Sci-Fi".to_string()],
            rating: None,
            rating_votes: None,
        };
        store.upsert_basics(&record).unwrap();

        let mut index = TitleIndex::new();
        index.insert_title(store.lookup_by_id("tt0133093").unwrap().unwrap());

        let from_store = store.lookup_by_normalized_name("matrix").unwrap();
        let from_index = index.lookup_by_normalized_name("matrix").unwrap();
        assert_eq!(from_store, from_index);
    }
}
