//! Title Resolver - maps free-text catalog entries onto canonical ids
//!
//! ## Algorithm
//! 1. Candidates = every title whose primary, original or alternate name
//!    normalizes to the entry's name; deduplicated and ordered by id
//! 2. No candidate: unresolved
//! 3. One candidate: exact
//! 4. Several candidates and the entry has a year: keep same-year titles
//!    - one left: year-disambiguated
//!    - several left: the single movie among them (year-disambiguated),
//!      otherwise the lowest-id movie, else the lowest id (fuzzy)
//!    - none left: fall through to step 5
//! 5. Several candidates, no usable year: the single movie (fuzzy),
//!    otherwise unresolved
//!
//! A miss is a value, never an error. Only lookup failures propagate.

use crate::types::{CatalogEntry, MatchConfidence, ResolutionResult};
use data_loader::{CanonicalTitle, TitleLookup, normalize_title};
use rayon::prelude::*;
use tracing::{debug, instrument};

/// Resolves catalog entries against any `TitleLookup`
pub struct TitleResolver<'a, L: TitleLookup + ?Sized> {
    lookup: &'a L,
}

impl<'a, L: TitleLookup + ?Sized> TitleResolver<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    /// Resolve one entry
    #[instrument(skip(self, entry), fields(name = %entry.name, year = ?entry.year))]
    pub fn resolve(&self, entry: &CatalogEntry) -> data_loader::Result<ResolutionResult> {
        if normalize_title(&entry.name).is_empty() {
            debug!("Name normalizes to nothing; unresolved");
            return Ok(ResolutionResult::unresolved(entry.clone(), 0));
        }

        // Step 1: Gather candidates
        let mut candidates = self.lookup.lookup_by_normalized_name(&entry.name)?;
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        candidates.dedup_by(|a, b| a.id == b.id);

        let result = pick(entry, &candidates);
        debug!(
            "{} candidates -> {} {}",
            result.candidate_count,
            result.confidence,
            result.matched_title_id.as_deref().unwrap_or("-")
        );
        Ok(result)
    }

    /// Resolve entries in order on the calling thread
    pub fn resolve_all(&self, entries: &[CatalogEntry]) -> data_loader::Result<Vec<ResolutionResult>> {
        entries.iter().map(|entry| self.resolve(entry)).collect()
    }
}

impl<L: TitleLookup + Sync + ?Sized> TitleResolver<'_, L> {
    /// Resolve entries across the rayon pool; output order matches input order
    pub fn par_resolve_all(
        &self,
        entries: &[CatalogEntry],
    ) -> data_loader::Result<Vec<ResolutionResult>> {
        entries.par_iter().map(|entry| self.resolve(entry)).collect()
    }
}

/// Steps 2-5 over a deduplicated, id-ordered candidate list
fn pick(entry: &CatalogEntry, candidates: &[CanonicalTitle]) -> ResolutionResult {
    let count = candidates.len();
    let matched = |title: &CanonicalTitle, confidence| {
        ResolutionResult::matched(entry.clone(), title.id.clone(), confidence, count)
    };

    match candidates {
        // Step 2
        [] => ResolutionResult::unresolved(entry.clone(), 0),
        // Step 3
        [only] => matched(only, MatchConfidence::Exact),
        _ => {
            // Step 4
            if let Some(year) = entry.year {
                let same_year: Vec<&CanonicalTitle> = candidates
                    .iter()
                    .filter(|t| t.release_year == Some(year))
                    .collect();
                match same_year.as_slice() {
                    [] => {}
                    [only] => return matched(*only, MatchConfidence::YearDisambiguated),
                    several => {
                        return match single_movie(several.iter().copied()) {
                            Some(movie) => matched(movie, MatchConfidence::YearDisambiguated),
                            None => {
                                // Lowest-id movie, else lowest id of any type
                                let pick = several
                                    .iter()
                                    .copied()
                                    .find(|t| t.title_type.is_movie())
                                    .unwrap_or(several[0]);
                                matched(pick, MatchConfidence::Fuzzy)
                            }
                        };
                    }
                }
            }

            // Step 5
            match single_movie(candidates.iter()) {
                Some(movie) => matched(movie, MatchConfidence::Fuzzy),
                None => ResolutionResult::unresolved(entry.clone(), count),
            }
        }
    }
}

/// The only movie-typed title in `titles`, if there is exactly one
fn single_movie<'t>(titles: impl Iterator<Item = &'t CanonicalTitle>) -> Option<&'t CanonicalTitle> {
    let mut movies = titles.filter(|t| t.title_type.is_movie());
    match (movies.next(), movies.next()) {
        (Some(movie), None) => Some(movie),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{AlternateName, TitleIndex, TitleType};

    fn title(id: &str, name: &str, year: Option<u16>, title_type: TitleType) -> CanonicalTitle {
        CanonicalTitle::new(id, name, title_type, year)
    }

    fn entry(name: &str, year: Option<u16>) -> CatalogEntry {
        CatalogEntry::new(name, "netflix", year)
    }

    fn index_of(titles: Vec<CanonicalTitle>) -> TitleIndex {
        let mut index = TitleIndex::new();
        for t in titles {
            index.insert_title(t);
        }
        index
    }

    #[test]
    fn test_exact_match() {
        let index = index_of(vec![title("tt0001", "Jallikattu", Some(2019), TitleType::Movie)]);
        let resolver = TitleResolver::new(&index);

        let result = resolver.resolve(&entry("Jallikattu", Some(2019))).unwrap();
        assert_eq!(result.confidence, MatchConfidence::Exact);
        assert_eq!(result.matched_title_id.as_deref(), Some("tt0001"));
        assert_eq!(result.candidate_count, 1);
    }

    #[test]
    fn test_year_disambiguates() {
        let index = index_of(vec![
            title("tt0002", "Knives Out", Some(2019), TitleType::Movie),
            title("tt0003", "Knives Out", Some(1985), TitleType::Movie),
        ]);
        let resolver = TitleResolver::new(&index);

        let result = resolver.resolve(&entry("Knives Out", Some(2019))).unwrap();
        assert_eq!(result.confidence, MatchConfidence::YearDisambiguated);
        assert_eq!(result.matched_title_id.as_deref(), Some("tt0002"));
        assert_eq!(result.candidate_count, 2);
    }

    #[test]
    fn test_unknown_name_is_unresolved() {
        let index = index_of(vec![title("tt0001", "Jallikattu", Some(2019), TitleType::Movie)]);
        let resolver = TitleResolver::new(&index);

        let result = resolver.resolve(&entry("Some Unknown Film", Some(2019))).unwrap();
        assert_eq!(result.confidence, MatchConfidence::Unresolved);
        assert!(result.matched_title_id.is_none());
        assert_eq!(result.candidate_count, 0);
    }

    #[test]
    fn test_same_year_prefers_single_movie() {
        let index = index_of(vec![
            title("tt0010", "Dark", Some(2017), TitleType::TvSeries),
            title("tt0011", "Dark", Some(2017), TitleType::Movie),
        ]);
        let result = TitleResolver::new(&index)
            .resolve(&entry("Dark", Some(2017)))
            .unwrap();
        assert_eq!(result.confidence, MatchConfidence::YearDisambiguated);
        assert_eq!(result.matched_title_id.as_deref(), Some("tt0011"));
    }

    #[test]
    fn test_same_year_tie_breaks_on_lowest_id() {
        let index = index_of(vec![
            title("tt0021", "Twin", Some(2020), TitleType::Movie),
            title("tt0020", "Twin", Some(2020), TitleType::Movie),
        ]);
        let result = TitleResolver::new(&index)
            .resolve(&entry("Twin", Some(2020)))
            .unwrap();
        assert_eq!(result.confidence, MatchConfidence::Fuzzy);
        assert_eq!(result.matched_title_id.as_deref(), Some("tt0020"));
    }

    #[test]
    fn test_same_year_tie_skips_lower_id_series() {
        let index = index_of(vec![
            title("tt0022", "Twin", Some(2020), TitleType::Movie),
            title("tt0019", "Twin", Some(2020), TitleType::TvSeries),
            title("tt0021", "Twin", Some(2020), TitleType::Movie),
        ]);
        let result = TitleResolver::new(&index)
            .resolve(&entry("Twin", Some(2020)))
            .unwrap();
        assert_eq!(result.confidence, MatchConfidence::Fuzzy);
        assert_eq!(result.matched_title_id.as_deref(), Some("tt0021"));
        assert_eq!(result.candidate_count, 3);
    }

    #[test]
    fn test_same_year_tie_without_movies_takes_lowest_id() {
        let index = index_of(vec![
            title("tt0024", "Twin", Some(2020), TitleType::TvSeries),
            title("tt0023", "Twin", Some(2020), TitleType::Short),
        ]);
        let result = TitleResolver::new(&index)
            .resolve(&entry("Twin", Some(2020)))
            .unwrap();
        assert_eq!(result.confidence, MatchConfidence::Fuzzy);
        assert_eq!(result.matched_title_id.as_deref(), Some("tt0023"));
    }

    #[test]
    fn test_year_mismatch_falls_back_to_movie_type() {
        let index = index_of(vec![
            title("tt0030", "Heat", Some(1995), TitleType::Movie),
            title("tt0031", "Heat", Some(1972), TitleType::Short),
        ]);
        let result = TitleResolver::new(&index)
            .resolve(&entry("Heat", Some(2001)))
            .unwrap();
        assert_eq!(result.confidence, MatchConfidence::Fuzzy);
        assert_eq!(result.matched_title_id.as_deref(), Some("tt0030"));
    }

    #[test]
    fn test_no_year_and_no_single_movie_is_unresolved() {
        let index = index_of(vec![
            title("tt0040", "Crash", Some(1996), TitleType::Movie),
            title("tt0041", "Crash", Some(2004), TitleType::Movie),
        ]);
        let result = TitleResolver::new(&index).resolve(&entry("Crash", None)).unwrap();
        assert_eq!(result.confidence, MatchConfidence::Unresolved);
        assert_eq!(result.candidate_count, 2);
    }

    #[test]
    fn test_alternate_name_and_primary_name_collapse_to_one_candidate() {
        let mut index = index_of(vec![title("tt0050", "Amélie", Some(2001), TitleType::Movie)]);
        index.insert_alternate_name(AlternateName {
            title_id: "tt0050".to_string(),
            ordering: 1,
            name: "AMÉLIE!".to_string(),
            region: Some("US".to_string()),
            language: Some("en".to_string()),
            is_original_title: None,
        });
        let result = TitleResolver::new(&index)
            .resolve(&entry("amélie", None))
            .unwrap();
        assert_eq!(result.confidence, MatchConfidence::Exact);
        assert_eq!(result.candidate_count, 1);
    }

    #[test]
    fn test_punctuation_only_name_is_unresolved() {
        let index = index_of(vec![title("tt0001", "Jallikattu", None, TitleType::Movie)]);
        let result = TitleResolver::new(&index).resolve(&entry("?!", None)).unwrap();
        assert_eq!(result.confidence, MatchConfidence::Unresolved);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let index = index_of(vec![
            title("tt0062", "Solaris", Some(2002), TitleType::Movie),
            title("tt0061", "Solaris", Some(1972), TitleType::Movie),
            title("tt0060", "Solaris", Some(1968), TitleType::Movie),
        ]);
        let resolver = TitleResolver::new(&index);
        let entries = vec![entry("Solaris", None), entry("Solaris", Some(1972))];

        let first = resolver.resolve_all(&entries).unwrap();
        let second = resolver.par_resolve_all(&entries).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[1].matched_title_id.as_deref(), Some("tt0061"));
    }
}
