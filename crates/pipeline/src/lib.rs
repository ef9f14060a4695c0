//! Pipeline for enriching, filtering and reporting resolved catalog entries.
//!
//! This crate provides:
//! - Filter trait and implementations for provider, language and year
//! - FilterPipeline for composing filters
//! - Enricher for bounded-parallel rating lookups
//! - Report for the sorted, printable result
//!
//! ## Architecture
//! The pipeline processes resolved entries in stages:
//! 1. Each resolution is joined with its title's store facts (`CatalogMatch`)
//! 2. Titles without a rating are optionally enriched through a `RatingLookup`
//! 3. Filters drop entries outside the requested provider, languages and year
//! 4. Remaining rows are sorted; unresolved entries are listed separately
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{FilterConfig, FilterPipeline, Report, SortKey};
//!
//! let config = FilterConfig::new()
//!     .with_provider("netflix")
//!     .with_languages(["hi"])
//!     .with_year(Some(2019))
//!     .with_sort_by(SortKey::Rating);
//!
//! let report = Report::build(matches, &FilterPipeline::standard(), &config)?;
//! ```

pub mod enrichment;
pub mod filter_pipeline;
pub mod filters;
pub mod report;
pub mod traits;
pub mod types;

// Re-export main types
pub use enrichment::{EnrichmentOutcome, EnrichmentSettings, Enricher, OmdbLookup, RatingsFileLookup};
pub use filter_pipeline::FilterPipeline;
pub use report::{Report, ReportRow, sort_rows};
pub use traits::{Filter, LookupError, RatingLookup};
pub use types::{CatalogMatch, FilterConfig, RatingFacts, SortKey};
