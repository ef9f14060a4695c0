//! Example: Resolve a JSON-lines catalog against a built store
//!
//! Run with: cargo run --package sources --example resolve_catalog -- data/reel-match.sqlite3 catalog.jsonl
//!
//! This example shows how to:
//! 1. Open the consolidated store
//! 2. Read a catalog fixture
//! 3. Prefetch the titles the catalog can reach
//! 4. Resolve every entry in parallel
//! 5. Display the confidence breakdown

use data_loader::{ConsolidatedStore, TitleIndex};
use sources::{CatalogSource, JsonLinesCatalog, MatchConfidence, TitleResolver};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut args = std::env::args().skip(1);
    let store_path = args.next().unwrap_or_else(|| "data/reel-match.sqlite3".to_string());
    let catalog_path = args.next().unwrap_or_else(|| "catalog.jsonl".to_string());

    println!("=== Catalog Resolution Example ===\n");

    let store = ConsolidatedStore::open(Path::new(&store_path))?;
    let (titles, akas, _) = store.counts()?;
    println!("Store: {} titles, {} alternate names", titles, akas);

    let entries = JsonLinesCatalog::new(&catalog_path).entries()?;
    println!("Catalog: {} entries\n", entries.len());

    let start = Instant::now();
    let index = TitleIndex::prefetch(&store, entries.iter().map(|e| e.name.as_str()))?;
    println!("Prefetched {} titles in {:?}", index.counts().0, start.elapsed());

    let start = Instant::now();
    let results = TitleResolver::new(&index).par_resolve_all(&entries)?;
    println!("Resolved in {:?}\n", start.elapsed());

    let mut by_confidence: BTreeMap<&str, usize> = BTreeMap::new();
    for result in &results {
        *by_confidence.entry(result.confidence.as_str()).or_default() += 1;
    }
    for (confidence, count) in &by_confidence {
        println!("  {:<20} {}", confidence, count);
    }

    println!("\nFirst unresolved entries:");
    for result in results
        .iter()
        .filter(|r| r.confidence == MatchConfidence::Unresolved)
        .take(10)
    {
        println!("  {} ({:?})", result.entry.name, result.entry.year);
    }
    Ok(())
}
