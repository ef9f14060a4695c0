//! Report building: filter, sort and flatten matches into printable rows.

use crate::filter_pipeline::FilterPipeline;
use crate::filters::ProviderFilter;
use crate::traits::Filter;
use crate::types::{CatalogMatch, FilterConfig, SortKey};
use anyhow::Result;
use data_loader::TitleId;
use serde::Serialize;
use sources::MatchConfidence;
use std::cmp::Ordering;
use tracing::info;

/// One printable line of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub name: String,
    pub provider: String,
    pub year: Option<u16>,
    /// The store's rating, else the one printed in the catalog listing
    pub rating: Option<f32>,
    pub votes: Option<u32>,
    /// Display-name languages from enrichment
    pub languages: Vec<String>,
    /// Language codes of the title's alternate names
    pub alternate_languages: Vec<String>,
    /// Empty for unresolved entries
    pub matched_ids: Vec<TitleId>,
    pub confidence: MatchConfidence,
}

impl From<&CatalogMatch> for ReportRow {
    fn from(m: &CatalogMatch) -> Self {
        let title = m.title.as_ref();
        ReportRow {
            name: m.resolution.entry.name.clone(),
            provider: m.resolution.entry.provider.clone(),
            year: m.year(),
            rating: title
                .and_then(|t| t.rating)
                .or(m.resolution.entry.catalog_rating),
            votes: title.and_then(|t| t.rating_votes),
            languages: title
                .map(|t| t.languages.iter().cloned().collect())
                .unwrap_or_default(),
            alternate_languages: m.alternate_languages.iter().cloned().collect(),
            matched_ids: title.map(|t| vec![t.id.clone()]).unwrap_or_default(),
            confidence: m.confidence(),
        }
    }
}

/// Matched rows in the requested order, plus the entries nothing matched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub rows: Vec<ReportRow>,
    /// Catalog order; only the provider filter applies to these
    pub unresolved: Vec<ReportRow>,
}

impl Report {
    /// Run matched entries through `pipeline`, unresolved ones through the
    /// provider filter, then sort by `config.sort_by`
    pub fn build(matches: Vec<CatalogMatch>, pipeline: &FilterPipeline, config: &FilterConfig) -> Result<Self> {
        let (resolved, unresolved): (Vec<_>, Vec<_>) =
            matches.into_iter().partition(CatalogMatch::is_resolved);

        let kept = pipeline.apply(resolved, config)?;
        let unresolved = ProviderFilter.apply(unresolved, config)?;

        let mut rows: Vec<ReportRow> = kept.iter().map(ReportRow::from).collect();
        sort_rows(&mut rows, config.sort_by);

        let report = Report {
            rows,
            unresolved: unresolved.iter().map(ReportRow::from).collect(),
        };
        info!(
            "Report: {} rows, {} unresolved (sorted by {})",
            report.rows.len(),
            report.unresolved.len(),
            config.sort_by
        );
        Ok(report)
    }
}

/// Sort rows by `key`; ties break by name, then first matched id
pub fn sort_rows(rows: &mut [ReportRow], key: SortKey) {
    rows.sort_by(|a, b| {
        let primary = match key {
            SortKey::Rating => descending_known(a.rating, b.rating, |x, y| x.total_cmp(y)),
            SortKey::Year => descending_known(a.year, b.year, |x, y| x.cmp(y)),
            SortKey::Name => Ordering::Equal,
        };
        primary
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.matched_ids.first().cmp(&b.matched_ids.first()))
    });
}

/// Larger values first, unknown values last
fn descending_known<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(&b, &a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
