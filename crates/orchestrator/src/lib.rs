//! Run orchestration: one catalog run from raw listings to a report.
//!
//! The orchestrator owns no data of its own. It borrows the consolidated
//! store for the length of a run and drives the other crates in order:
//! read catalogs, resolve, enrich, filter, report.

pub mod orchestrator;

pub use orchestrator::{CatalogSpec, EnrichmentSource, MatchOrchestrator, RunOutput, RunSummary};
