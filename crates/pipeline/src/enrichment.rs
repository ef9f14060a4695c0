//! Best-effort rating enrichment.
//!
//! Lookups run concurrently on the tokio runtime, bounded by a semaphore,
//! each wrapped in a per-call timeout and retried a fixed number of times.
//! Results are returned to the caller, which stays the only writer to the
//! store. A failed lookup never fails the batch.

use crate::traits::{LookupError, RatingLookup};
use crate::types::RatingFacts;
use async_trait::async_trait;
use data_loader::{DataLoadError, RatingsReader, TitleId};
use futures::{StreamExt, stream::FuturesUnordered};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_CONCURRENCY: usize = 16;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_ATTEMPTS: u32 = 2;
pub const DEFAULT_OMDB_BASE_URL: &str = "https://www.omdbapi.com/";

/// Limits applied to one enrichment batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentSettings {
    /// Lookups in flight at once
    pub concurrency: usize,
    /// Per-call timeout
    pub timeout: Duration,
    /// Calls per id before giving up (minimum 1)
    pub attempts: u32,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
        }
    }
}

/// What one batch produced, each list ordered by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentOutcome {
    pub enriched: Vec<(TitleId, RatingFacts)>,
    /// The source answered but had no rating
    pub not_found: Vec<TitleId>,
    /// Every attempt failed or timed out
    pub failed: Vec<TitleId>,
}

enum LookupStatus {
    Found(RatingFacts),
    NotFound,
    Failed,
}

/// Runs a `RatingLookup` over many ids with bounded parallelism
pub struct Enricher<L: RatingLookup + ?Sized> {
    lookup: Arc<L>,
    settings: EnrichmentSettings,
}

impl<L: RatingLookup + ?Sized> Enricher<L> {
    pub fn new(lookup: Arc<L>) -> Self {
        Self {
            lookup,
            settings: EnrichmentSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EnrichmentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Look up every id once (duplicates collapse)
    #[instrument(skip(self, ids), fields(source = self.lookup.name(), ids = ids.len()))]
    pub async fn enrich(&self, ids: &[TitleId]) -> EnrichmentOutcome {
        let unique: BTreeSet<&TitleId> = ids.iter().collect();
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));

        let mut in_flight = FuturesUnordered::new();
        for id in unique {
            let semaphore = semaphore.clone();
            in_flight.push(async move {
                let status = match semaphore.acquire_owned().await {
                    Ok(_permit) => self.lookup_with_retry(id).await,
                    Err(_) => LookupStatus::Failed,
                };
                (id.clone(), status)
            });
        }

        let mut outcome = EnrichmentOutcome::default();
        while let Some((id, status)) = in_flight.next().await {
            match status {
                LookupStatus::Found(facts) => outcome.enriched.push((id, facts)),
                LookupStatus::NotFound => outcome.not_found.push(id),
                LookupStatus::Failed => outcome.failed.push(id),
            }
        }
        outcome.enriched.sort_by(|a, b| a.0.cmp(&b.0));
        outcome.not_found.sort();
        outcome.failed.sort();

        info!(
            "Enrichment via {}: {} enriched, {} not found, {} failed",
            self.lookup.name(),
            outcome.enriched.len(),
            outcome.not_found.len(),
            outcome.failed.len()
        );
        outcome
    }

    async fn lookup_with_retry(&self, id: &str) -> LookupStatus {
        let attempts = self.settings.attempts.max(1);
        for attempt in 1..=attempts {
            let result = tokio::time::timeout(self.settings.timeout, self.lookup.lookup(id))
                .await
                .unwrap_or_else(|_| Err(LookupError::Timeout(id.to_string())));
            match result {
                Ok(Some(facts)) => return LookupStatus::Found(facts),
                Ok(None) => return LookupStatus::NotFound,
                Err(e) => debug!("Lookup {} attempt {}/{} failed: {}", id, attempt, attempts, e),
            }
        }
        warn!("Giving up on {} after {} attempts", id, attempts);
        LookupStatus::Failed
    }
}

// =============================================================================
// Ratings dump lookup
// =============================================================================

/// Ratings read from a title.ratings.tsv dump, restricted to the ids asked for
pub struct RatingsFileLookup {
    ratings: HashMap<TitleId, RatingFacts>,
}

impl RatingsFileLookup {
    /// Stream `path`, keeping only rows for `wanted`
    pub fn load(path: &Path, wanted: &HashSet<TitleId>) -> Result<Self, DataLoadError> {
        let mut reader = RatingsReader::open(path)?;
        let mut ratings = HashMap::new();
        while let Some(record) = reader.next() {
            let record = record?;
            if wanted.contains(&record.title_id) {
                ratings.insert(
                    record.title_id,
                    RatingFacts {
                        rating: record.average_rating,
                        votes: Some(record.num_votes),
                        languages: BTreeSet::new(),
                    },
                );
            }
        }
        info!(
            "Loaded {} of {} requested ratings from {} ({} rows, {} skipped)",
            ratings.len(),
            wanted.len(),
            path.display(),
            reader.rows_read(),
            reader.rows_skipped()
        );
        Ok(Self { ratings })
    }

    pub fn from_map(ratings: HashMap<TitleId, RatingFacts>) -> Self {
        Self { ratings }
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }
}

#[async_trait]
impl RatingLookup for RatingsFileLookup {
    fn name(&self) -> &str {
        "ratings-dump"
    }

    async fn lookup(&self, id: &str) -> Result<Option<RatingFacts>, LookupError> {
        Ok(self.ratings.get(id).cloned())
    }
}

// =============================================================================
// OMDb HTTP lookup
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OmdbResponse {
    response: String,
    #[serde(default, rename = "imdbRating")]
    imdb_rating: Option<String>,
    #[serde(default, rename = "imdbVotes")]
    imdb_votes: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Looks titles up by id against an OMDb-compatible JSON API
pub struct OmdbLookup {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OmdbLookup {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reel-match/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl RatingLookup for OmdbLookup {
    fn name(&self) -> &str {
        "omdb"
    }

    async fn lookup(&self, id: &str) -> Result<Option<RatingFacts>, LookupError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("i", id), ("apikey", self.api_key.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status {
                id: id.to_string(),
                status: status.as_u16(),
            });
        }
        let body: OmdbResponse = response.json().await?;
        parse_omdb(id, body)
    }
}

fn parse_omdb(id: &str, body: OmdbResponse) -> Result<Option<RatingFacts>, LookupError> {
    if !body.response.eq_ignore_ascii_case("true") {
        debug!("OMDb has no entry for {}: {}", id, body.error.unwrap_or_default());
        return Ok(None);
    }
    let Some(rating) = body.imdb_rating.as_deref().and_then(known) else {
        return Ok(None);
    };
    let rating: f32 = rating.parse().map_err(|_| LookupError::Decode {
        id: id.to_string(),
        reason: format!("imdbRating '{}'", rating),
    })?;
    let votes = body
        .imdb_votes
        .as_deref()
        .and_then(known)
        .map(|v| v.replace(',', ""))
        .and_then(|v| v.parse::<u32>().ok());
    let languages = body
        .language
        .as_deref()
        .and_then(known)
        .map(|l| {
            l.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Some(RatingFacts {
        rating,
        votes,
        languages,
    }))
}

/// OMDb writes "N/A" for missing values
fn known(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && value != "N/A").then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls per id, sleeps, tracks peak concurrency
    struct MockLookup {
        failures: usize,
        delay: Duration,
        calls: std::sync::Mutex<HashMap<String, usize>>,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockLookup {
        fn new(failures: usize, delay: Duration) -> Self {
            Self {
                failures,
                delay,
                calls: Default::default(),
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RatingLookup for MockLookup {
        fn name(&self) -> &str {
            "mock"
        }

        async fn lookup(&self, id: &str) -> Result<Option<RatingFacts>, LookupError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            let call = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(id.to_string()).or_insert(0);
                *n += 1;
                *n
            };
            if id.starts_with("missing") {
                return Ok(None);
            }
            if call <= self.failures {
                return Err(LookupError::Decode {
                    id: id.to_string(),
                    reason: "flaky".to_string(),
                });
            }
            Ok(Some(RatingFacts {
                rating: 7.0,
                votes: Some(100),
                languages: BTreeSet::new(),
            }))
        }
    }

    fn ids(n: usize) -> Vec<TitleId> {
        (0..n).map(|i| format!("tt{:04}", i)).collect()
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let lookup = Arc::new(MockLookup::new(0, Duration::from_millis(20)));
        let enricher = Enricher::new(lookup.clone()).with_settings(EnrichmentSettings {
            concurrency: 3,
            ..Default::default()
        });

        let outcome = enricher.enrich(&ids(12)).await;

        assert_eq!(outcome.enriched.len(), 12);
        assert!(lookup.peak.load(Ordering::SeqCst) <= 3);
        assert!(lookup.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let lookup = Arc::new(MockLookup::new(1, Duration::from_millis(1)));
        let outcome = Enricher::new(lookup).enrich(&ids(2)).await;
        assert_eq!(outcome.enriched.len(), 2);
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn test_gives_up_without_aborting() {
        let lookup = Arc::new(MockLookup::new(5, Duration::from_millis(1)));
        let mut input = ids(3);
        input.push("missing1".to_string());

        let outcome = Enricher::new(lookup.clone()).enrich(&input).await;

        assert_eq!(outcome.failed, ids(3));
        assert_eq!(outcome.not_found, vec!["missing1".to_string()]);
        // Exactly the default attempt budget was spent per failing id
        assert_eq!(lookup.calls.lock().unwrap()["tt0000"], DEFAULT_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let lookup = Arc::new(MockLookup::new(0, Duration::from_millis(200)));
        let enricher = Enricher::new(lookup).with_settings(EnrichmentSettings {
            concurrency: 4,
            timeout: Duration::from_millis(10),
            attempts: 2,
        });

        let outcome = enricher.enrich(&ids(2)).await;
        assert_eq!(outcome.failed.len(), 2);
        assert!(outcome.enriched.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_ids_looked_up_once() {
        let lookup = Arc::new(MockLookup::new(0, Duration::from_millis(1)));
        let input = vec!["tt1".to_string(), "tt1".to_string()];
        let outcome = Enricher::new(lookup.clone()).enrich(&input).await;
        assert_eq!(outcome.enriched.len(), 1);
        assert_eq!(lookup.calls.lock().unwrap()["tt1"], 1);
    }

    #[tokio::test]
    async fn test_ratings_file_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("title.ratings.tsv");
        std::fs::write(
            &path,
            "tconst\taverageRating\tnumVotes\ntt0001\t7.4\t1200\ntt0002\t6.1\t50\ntt0003\tbad\t1\n",
        )
        .unwrap();
        let wanted: HashSet<TitleId> = ["tt0001".to_string(), "tt0404".to_string()].into();

        let lookup = RatingsFileLookup::load(&path, &wanted).unwrap();
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup.lookup("tt0001").await.unwrap().unwrap().votes, Some(1200));
        assert!(lookup.lookup("tt0002").await.unwrap().is_none());
    }

    #[test]
    fn test_parse_omdb_response() {
        let body: OmdbResponse = serde_json::from_str(
            r#"{"Title":"Jallikattu","Language":"Malayalam, English","imdbRating":"7.4","imdbVotes":"12,345","Response":"True"}"#,
        )
        .unwrap();
        let facts = parse_omdb("tt0001", body).unwrap().unwrap();
        assert_eq!(facts.rating, 7.4);
        assert_eq!(facts.votes, Some(12345));
        assert!(facts.languages.contains("Malayalam"));
        assert!(facts.languages.contains("English"));
    }

    #[test]
    fn test_parse_omdb_not_available() {
        let missing: OmdbResponse =
            serde_json::from_str(r#"{"Response":"False","Error":"Incorrect IMDb ID."}"#).unwrap();
        assert!(parse_omdb("tt0", missing).unwrap().is_none());

        let unrated: OmdbResponse =
            serde_json::from_str(r#"{"Response":"True","imdbRating":"N/A","imdbVotes":"N/A"}"#).unwrap();
        assert!(parse_omdb("tt1", unrated).unwrap().is_none());
    }

    #[test]
    fn test_parse_omdb_unknown_votes_stay_unknown() {
        let body: OmdbResponse =
            serde_json::from_str(r#"{"Response":"True","imdbRating":"7.0","imdbVotes":"N/A"}"#).unwrap();
        let facts = parse_omdb("tt1", body).unwrap().unwrap();
        assert_eq!(facts.rating, 7.0);
        assert_eq!(facts.votes, None);

        let garbled: OmdbResponse =
            serde_json::from_str(r#"{"Response":"True","imdbRating":"6.5","imdbVotes":"lots"}"#).unwrap();
        assert_eq!(parse_omdb("tt2", garbled).unwrap().unwrap().votes, None);
    }
}
