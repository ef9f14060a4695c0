//! The read contract the resolver and the report builder rely on.
//!
//! Implemented by the SQLite `ConsolidatedStore` and by the in-memory
//! `TitleIndex`, so resolution code is written once against either.

use crate::error::Result;
use crate::types::{AlternateName, CanonicalTitle};

pub trait TitleLookup {
    /// All titles whose primary, original or alternate name normalizes to
    /// the same key as `name`. Order is not meaningful.
    fn lookup_by_normalized_name(&self, name: &str) -> Result<Vec<CanonicalTitle>>;

    /// A single title, `None` when the id is unknown
    fn lookup_by_id(&self, id: &str) -> Result<Option<CanonicalTitle>>;

    /// Alternate names of a title in source order
    fn alternate_names(&self, id: &str) -> Result<Vec<AlternateName>>;
}
