//! Ordered chain of report filters.
//!
//! Only resolved matches pass through here; `Report::build` routes
//! unresolved entries through the provider filter alone.

use crate::filters::{LanguageFilter, ProviderFilter, ReleaseYearFilter};
use crate::traits::Filter;
use crate::types::{CatalogMatch, FilterConfig};
use anyhow::{Context, Result};
use tracing::debug;

/// Filters applied in insertion order, each narrowing the previous output.
///
/// ```ignore
/// let pipeline = FilterPipeline::new()
///     .add_filter(ProviderFilter)
///     .add_filter(ReleaseYearFilter);
/// let netflix_2019 = pipeline.apply(matches, &config)?;
/// ```
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    /// No filters; every match passes
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Provider, then language, then release year
    pub fn standard() -> Self {
        Self::new()
            .add_filter(ProviderFilter)
            .add_filter(LanguageFilter)
            .add_filter(ReleaseYearFilter)
    }

    pub fn add_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Names of the filters, in application order
    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Narrow `matches` by every filter in turn. A failing filter aborts the
    /// run with its name attached to the error.
    pub fn apply(&self, matches: Vec<CatalogMatch>, config: &FilterConfig) -> Result<Vec<CatalogMatch>> {
        let mut kept = matches;
        for filter in &self.filters {
            let before = kept.len();
            kept = filter
                .apply(kept, config)
                .with_context(|| format!("{} failed on {} matches", filter.name(), before))?;
            debug!("{}: {} -> {} matches", filter.name(), before, kept.len());
        }
        Ok(kept)
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{CanonicalTitle, TitleType};
    use sources::{CatalogEntry, MatchConfidence, ResolutionResult};

    fn matched(id: &str, provider: &str, year: u16) -> CatalogMatch {
        let entry = CatalogEntry::new(format!("Film {}", id), provider, Some(year));
        CatalogMatch {
            resolution: ResolutionResult::matched(entry, id.to_string(), MatchConfidence::Exact, 1),
            title: Some(CanonicalTitle::new(id, format!("Film {}", id), TitleType::Movie, Some(year))),
            alternate_languages: ["hi".to_string()].into(),
        }
    }

    #[test]
    fn test_empty_pipeline() {
        let pipeline = FilterPipeline::new();
        let matches = vec![matched("tt1", "netflix", 2019), matched("tt2", "amazon_prime", 2018)];

        let filtered = pipeline.apply(matches, &FilterConfig::new().with_year(Some(2019))).unwrap();
        assert_eq!(filtered.len(), 2);
    }

    struct RejectingFilter;

    impl Filter for RejectingFilter {
        fn name(&self) -> &str {
            "RejectingFilter"
        }

        fn apply(&self, _matches: Vec<CatalogMatch>, _config: &FilterConfig) -> Result<Vec<CatalogMatch>> {
            anyhow::bail!("language table unavailable")
        }
    }

    #[test]
    fn test_failing_filter_names_itself() {
        let pipeline = FilterPipeline::new()
            .add_filter(ProviderFilter)
            .add_filter(RejectingFilter);
        let matches = vec![matched("tt1", "netflix", 2019)];

        let err = pipeline
            .apply(matches, &FilterConfig::new().with_provider("netflix"))
            .unwrap_err();
        assert_eq!(err.to_string(), "RejectingFilter failed on 1 matches");
        assert_eq!(err.root_cause().to_string(), "language table unavailable");
    }

    #[test]
    fn test_standard_pipeline() {
        let pipeline = FilterPipeline::standard();
        assert_eq!(
            pipeline.filter_names(),
            vec!["ProviderFilter", "LanguageFilter", "ReleaseYearFilter"]
        );

        let matches = vec![
            matched("tt1", "netflix", 2019),
            matched("tt2", "amazon_prime", 2019),
            matched("tt3", "netflix", 2018),
        ];
        let config = FilterConfig::new()
            .with_provider("netflix")
            .with_languages(["hi"])
            .with_year(Some(2019));

        let filtered = pipeline.apply(matches, &config).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].resolution.matched_title_id.as_deref(), Some("tt1"));
    }
}
