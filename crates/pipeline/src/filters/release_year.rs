//! Filter on release year.

use crate::traits::Filter;
use crate::types::{CatalogMatch, FilterConfig};
use anyhow::Result;

/// Keeps matches released in `config.year`.
///
/// The title's year wins; the catalog's year is used only when the title
/// has none. A match with neither is dropped once a year is requested.
pub struct ReleaseYearFilter;

impl Filter for ReleaseYearFilter {
    fn name(&self) -> &str {
        "ReleaseYearFilter"
    }

    fn apply(&self, matches: Vec<CatalogMatch>, config: &FilterConfig) -> Result<Vec<CatalogMatch>> {
        let Some(year) = config.year else {
            return Ok(matches);
        };
        let filtered: Vec<CatalogMatch> = matches
            .into_iter()
            .filter(|m| m.year() == Some(year))
            .collect();
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{CanonicalTitle, TitleType};
    use sources::{CatalogEntry, MatchConfidence, ResolutionResult};

    fn matched(id: &str, title_year: Option<u16>, catalog_year: Option<u16>) -> CatalogMatch {
        CatalogMatch {
            resolution: ResolutionResult::matched(
                CatalogEntry::new(id, "netflix", catalog_year),
                id.to_string(),
                MatchConfidence::Exact,
                1,
            ),
            title: Some(CanonicalTitle::new(id, id, TitleType::Movie, title_year)),
            alternate_languages: Default::default(),
        }
    }

    #[test]
    fn test_release_year_filter() {
        let matches = vec![
            matched("tt1", Some(2019), Some(2020)),
            matched("tt2", Some(2018), Some(2019)),
            matched("tt3", None, Some(2019)),
            matched("tt4", None, None),
        ];
        let config = FilterConfig::new().with_year(Some(2019));

        let filtered = ReleaseYearFilter.apply(matches, &config).unwrap();
        let ids: Vec<&str> = filtered.iter().map(|m| m.resolution.entry.name.as_str()).collect();
        assert_eq!(ids, vec!["tt1", "tt3"]);
    }
}
