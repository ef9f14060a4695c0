//! Filter implementations for the report pipeline.
//!
//! This module contains all the concrete filter implementations
//! that can be composed into a FilterPipeline.

pub mod language;
pub mod provider;
pub mod release_year;

// Re-export for convenience
pub use language::LanguageFilter;
pub use provider::ProviderFilter;
pub use release_year::ReleaseYearFilter;
