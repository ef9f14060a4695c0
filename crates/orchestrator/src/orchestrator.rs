//! # Match Orchestrator
//!
//! This module coordinates one catalog run:
//! 1. Read and merge catalog listings
//! 2. Prefetch candidate titles from the store
//! 3. Resolve entries across the rayon pool
//! 4. Enrich unrated matches (optional, bounded-parallel)
//! 5. Write enrichment results back to the store
//! 6. Join resolutions with store facts
//! 7. Filter and sort into a report
//!
//! Only step 4 touches the network and only step 5 writes to the store.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use data_loader::{ConsolidatedStore, TitleId, TitleIndex};
use pipeline::{
    CatalogMatch, EnrichmentOutcome, EnrichmentSettings, Enricher, FilterConfig, FilterPipeline,
    OmdbLookup, RatingLookup, RatingsFileLookup, Report,
};
use sources::{
    CatalogEntry, CatalogFormat, MatchConfidence, ResolutionResult, TitleResolver, merge_catalogs,
    open_catalog,
};

/// One catalog to read
#[derive(Debug, Clone)]
pub struct CatalogSpec {
    pub format: CatalogFormat,
    /// File, or directory for cached reelgood pages
    pub path: PathBuf,
    /// Provider name for formats that don't carry one
    pub provider: String,
}

/// Where missing ratings come from
#[derive(Debug, Clone)]
pub enum EnrichmentSource {
    /// A title.ratings.tsv dump
    RatingsFile(PathBuf),
    /// An OMDb-compatible JSON API
    Omdb { api_key: String, base_url: String },
}

/// Run-level counters printed after the report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub entries: usize,
    pub exact: usize,
    pub year_disambiguated: usize,
    pub fuzzy: usize,
    pub unresolved: usize,
    /// Matched titles that had no rating before enrichment
    pub enrichment_requested: usize,
    pub enriched: usize,
    pub enrichment_not_found: usize,
    pub enrichment_failed: usize,
    pub rows: usize,
    pub unresolved_rows: usize,
}

impl RunSummary {
    /// Count confidences after the store join, so titles that vanished
    /// since resolution count as unresolved
    fn record_matches(&mut self, matches: &[CatalogMatch]) {
        for m in matches {
            match m.confidence() {
                MatchConfidence::Exact => self.exact += 1,
                MatchConfidence::YearDisambiguated => self.year_disambiguated += 1,
                MatchConfidence::Fuzzy => self.fuzzy += 1,
                MatchConfidence::Unresolved => self.unresolved += 1,
            }
        }
    }

    fn record_enrichment(&mut self, outcome: &EnrichmentOutcome) {
        self.enriched = outcome.enriched.len();
        self.enrichment_not_found = outcome.not_found.len();
        self.enrichment_failed = outcome.failed.len();
    }
}

/// What a run hands back to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutput {
    pub report: Report,
    pub summary: RunSummary,
}

/// Drives a catalog run against a borrowed store
pub struct MatchOrchestrator<'s> {
    store: &'s mut ConsolidatedStore,
    filter_pipeline: FilterPipeline,
    enrichment: Option<(EnrichmentSource, EnrichmentSettings)>,
}

impl<'s> MatchOrchestrator<'s> {
    /// Standard filters, no enrichment
    pub fn new(store: &'s mut ConsolidatedStore) -> Self {
        Self {
            store,
            filter_pipeline: FilterPipeline::standard(),
            enrichment: None,
        }
    }

    pub fn with_enrichment(mut self, source: EnrichmentSource, settings: EnrichmentSettings) -> Self {
        self.enrichment = Some((source, settings));
        self
    }

    /// Read every catalog in order and merge the listings
    pub fn read_catalogs(specs: &[CatalogSpec]) -> Result<Vec<CatalogEntry>> {
        let mut listings = Vec::with_capacity(specs.len());
        for spec in specs {
            let source = open_catalog(spec.format, &spec.path, &spec.provider);
            let entries = source.entries().with_context(|| {
                format!("Failed to read {} catalog {}", source.name(), spec.path.display())
            })?;
            info!(
                "Read {} entries from {} catalog {}",
                entries.len(),
                source.name(),
                spec.path.display()
            );
            listings.push(entries);
        }

        let merged = merge_catalogs(listings);
        info!("Merged catalogs: {} entries", merged.len());
        Ok(merged)
    }

    /// Resolve entries in catalog order
    pub fn resolve(&self, entries: &[CatalogEntry]) -> Result<Vec<ResolutionResult>> {
        let store: &ConsolidatedStore = &*self.store;
        let index = TitleIndex::prefetch(store, entries.iter().map(|e| e.name.as_str()))
            .context("Failed to prefetch candidate titles")?;
        let (titles, _, keys) = index.counts();
        info!("Prefetched {} candidate titles under {} names", titles, keys);

        TitleResolver::new(&index)
            .par_resolve_all(entries)
            .context("Failed to resolve catalog entries")
    }

    /// Resolve, enrich, filter and report
    pub async fn run(&mut self, entries: Vec<CatalogEntry>, config: &FilterConfig) -> Result<RunOutput> {
        let start_time = Instant::now();
        let mut summary = RunSummary {
            entries: entries.len(),
            ..RunSummary::default()
        };
        info!("Starting run over {} catalog entries", entries.len());

        // Resolve
        let resolutions = self.resolve(&entries)?;

        // Enrich before filtering
        if let Some((requested, outcome)) = self.enrich(&resolutions).await? {
            summary.enrichment_requested = requested;
            summary.record_enrichment(&outcome);
        }

        let matches = self.load_matches(resolutions)?;
        summary.record_matches(&matches);
        info!(
            "Resolved {} entries: {} exact, {} year-disambiguated, {} fuzzy, {} unresolved",
            summary.entries,
            summary.exact,
            summary.year_disambiguated,
            summary.fuzzy,
            summary.unresolved
        );
        let report = Report::build(matches, &self.filter_pipeline, config)
            .context("Failed to apply filters")?;
        summary.rows = report.rows.len();
        summary.unresolved_rows = report.unresolved.len();

        info!("Total time for run: {:.2?}", start_time.elapsed());
        Ok(RunOutput { report, summary })
    }

    /// Look up ratings for matched titles that have none; `None` when
    /// enrichment is off
    async fn enrich(
        &mut self,
        resolutions: &[ResolutionResult],
    ) -> Result<Option<(usize, EnrichmentOutcome)>> {
        let Some((source, settings)) = self.enrichment.clone() else {
            return Ok(None);
        };

        let matched = resolutions
            .iter()
            .filter_map(|r| r.matched_title_id.as_deref());
        let missing = self
            .store
            .titles_missing_rating(matched)
            .context("Failed to read ratings from the store")?;
        if missing.is_empty() {
            info!("Every matched title is rated; skipping enrichment");
            return Ok(Some((0, EnrichmentOutcome::default())));
        }
        info!("Enriching {} unrated titles", missing.len());

        let lookup = build_lookup(&source, &settings, &missing).await?;
        let outcome = Enricher::new(lookup)
            .with_settings(settings)
            .enrich(&missing)
            .await;
        self.apply_enrichment(&outcome)?;
        Ok(Some((missing.len(), outcome)))
    }

    /// Write enrichment results on this thread, then commit
    fn apply_enrichment(&mut self, outcome: &EnrichmentOutcome) -> Result<()> {
        for (id, facts) in &outcome.enriched {
            let updated = self
                .store
                .set_enrichment(id, facts.rating, facts.votes)
                .with_context(|| format!("Failed to store rating for {}", id))?;
            if !updated {
                warn!("Enriched title {} is no longer in the store", id);
                continue;
            }
            if !facts.languages.is_empty() {
                self.store
                    .set_languages(id, &facts.languages)
                    .with_context(|| format!("Failed to store languages for {}", id))?;
            }
        }
        self.store.flush().context("Failed to commit enrichment")
    }

    fn load_matches(&self, resolutions: Vec<ResolutionResult>) -> Result<Vec<CatalogMatch>> {
        let store: &ConsolidatedStore = &*self.store;
        resolutions
            .into_iter()
            .map(|resolution| CatalogMatch::load(store, resolution))
            .collect::<data_loader::Result<Vec<_>>>()
            .context("Failed to load matched titles")
    }
}

async fn build_lookup(
    source: &EnrichmentSource,
    settings: &EnrichmentSettings,
    missing: &[TitleId],
) -> Result<Arc<dyn RatingLookup>> {
    match source {
        EnrichmentSource::RatingsFile(path) => {
            // Streaming the dump is blocking work
            let path = path.clone();
            let wanted: HashSet<TitleId> = missing.iter().cloned().collect();
            let lookup = tokio::task::spawn_blocking(move || RatingsFileLookup::load(&path, &wanted))
                .await
                .context("Ratings loader task panicked")?
                .context("Failed to read the ratings dataset")?;
            Ok(Arc::new(lookup))
        }
        EnrichmentSource::Omdb { api_key, base_url } => {
            let lookup = OmdbLookup::new(api_key.clone(), base_url.clone(), settings.timeout)
                .context("Failed to build the OMDb client")?;
            Ok(Arc::new(lookup))
        }
    }
}
