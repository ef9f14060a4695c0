//! TitleIndex building and lookup.
//!
//! The index is filled one title at a time, either directly (tests, small
//! fixtures) or by prefetching from the store every title reachable from a
//! known list of names. A prefetched index answers lookups for those names
//! exactly as the store would, without a SQLite round-trip per entry, and
//! can be shared across threads.

use crate::error::Result;
use crate::lookup::TitleLookup;
use crate::normalize::normalize_title;
use crate::types::*;
use std::collections::HashSet;
use tracing::debug;

impl TitleIndex {
    /// Add or replace a title and index its primary and original names
    pub fn insert_title(&mut self, title: CanonicalTitle) {
        if let Some(previous) = self.titles.remove(&title.id) {
            let stale: Vec<String> = previous.names().into_iter().map(normalize_title).collect();
            for key in stale {
                self.unindex(&key, &previous.id);
            }
        }
        for name in title.names() {
            self.index_name(name, &title.id);
        }
        self.titles.insert(title.id.clone(), title);
    }

    /// Add an alternate name. Returns `false` (and stores nothing) when the
    /// parent title is unknown.
    pub fn insert_alternate_name(&mut self, alternate: AlternateName) -> bool {
        if !self.titles.contains_key(&alternate.title_id) {
            return false;
        }
        self.index_name(&alternate.name, &alternate.title_id);

        let names = self
            .alternate_names
            .entry(alternate.title_id.clone())
            .or_default();
        let replaced = match names.iter_mut().find(|n| n.ordering == alternate.ordering) {
            Some(existing) => Some(std::mem::replace(existing, alternate)),
            None => {
                names.push(alternate);
                names.sort_by_key(|n| n.ordering);
                None
            }
        };
        if let Some(old) = replaced {
            self.unindex(&normalize_title(&old.name), &old.title_id);
        }
        true
    }

    /// Load from `lookup` every title reachable from `names`, together with
    /// its alternate names.
    ///
    /// One lookup per distinct normalized name; titles already loaded are not
    /// fetched twice.
    pub fn prefetch<L, I, S>(lookup: &L, names: I) -> Result<Self>
    where
        L: TitleLookup + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = TitleIndex::new();
        let mut queried = HashSet::new();

        for name in names {
            let name = name.as_ref();
            let key = normalize_title(name);
            if key.is_empty() || !queried.insert(key) {
                continue;
            }
            for title in lookup.lookup_by_normalized_name(name)? {
                if index.titles.contains_key(&title.id) {
                    continue;
                }
                let alternates = lookup.alternate_names(&title.id)?;
                index.insert_title(title);
                for alternate in alternates {
                    index.insert_alternate_name(alternate);
                }
            }
        }

        let (titles, akas, keys) = index.counts();
        debug!(
            "Prefetched {} titles, {} alternate names, {} keys for {} names",
            titles,
            akas,
            keys,
            queried.len()
        );
        Ok(index)
    }

    fn index_name(&mut self, name: &str, id: &TitleId) {
        let key = normalize_title(name);
        if key.is_empty() {
            return;
        }
        self.name_index.entry(key).or_default().insert(id.clone());
    }

    /// Drop `id` from `key` unless another of its names still maps there
    fn unindex(&mut self, key: &str, id: &TitleId) {
        let by_title = self
            .titles
            .get(id)
            .is_some_and(|t| t.names().into_iter().any(|n| normalize_title(n) == key));
        let still_reachable = by_title
            || self
                .get_alternate_names(id)
                .iter()
                .any(|alt| normalize_title(&alt.name) == key);
        if still_reachable {
            return;
        }
        if let Some(ids) = self.name_index.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.name_index.remove(key);
            }
        }
    }
}

impl TitleLookup for TitleIndex {
    fn lookup_by_normalized_name(&self, name: &str) -> Result<Vec<CanonicalTitle>> {
        let key = normalize_title(name);
        Ok(self
            .ids_for_normalized(&key)
            .into_iter()
            .filter_map(|id| self.titles.get(id))
            .cloned()
            .collect())
    }

    fn lookup_by_id(&self, id: &str) -> Result<Option<CanonicalTitle>> {
        Ok(self.titles.get(id).cloned())
    }

    fn alternate_names(&self, id: &str) -> Result<Vec<AlternateName>> {
        Ok(self.get_alternate_names(id).to_vec())
    }
}
