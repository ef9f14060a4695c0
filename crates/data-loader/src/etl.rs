//! Build or refresh the consolidated store from the raw dumps.
//!
//! The basics pass runs first so that alternate names almost always find
//! their parent; the few that don't are buffered by the store and retried
//! once after the akas pass. Re-running against the same files converges to
//! the same store contents.

use crate::error::Result;
use crate::parser::{AkasReader, BasicsReader, DatasetReader};
use crate::store::{AkaUpsert, ConsolidatedStore};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Rows between progress log lines on long passes
pub const PROGRESS_EVERY: u64 = 1_000_000;

/// Locations of the source dumps
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    pub basics: PathBuf,
    pub akas: PathBuf,
}

impl DatasetPaths {
    /// Conventional dump names inside one directory
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            basics: dir.join("title.basics.tsv"),
            akas: dir.join("title.akas.tsv"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EtlOptions {
    /// Read at most this many data lines from each dump
    pub row_limit: Option<u64>,
}

/// Run-level counters surfaced at the end of a build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EtlSummary {
    pub basics_read: u64,
    pub basics_skipped: u64,
    pub titles_upserted: u64,
    pub akas_read: u64,
    pub akas_skipped: u64,
    pub akas_upserted: u64,
    /// Akas first buffered for a missing parent, then applied on retry
    pub akas_recovered: u64,
    pub orphans_dropped: u64,
}

impl EtlSummary {
    pub fn rows_skipped(&self) -> u64 {
        self.basics_skipped + self.akas_skipped
    }
}

/// Run both passes from files on disk and flush the store
pub fn build_store(
    store: &mut ConsolidatedStore,
    paths: &DatasetPaths,
    options: EtlOptions,
) -> Result<EtlSummary> {
    let basics = BasicsReader::open(&paths.basics)?.with_limit(options.row_limit);
    let akas = AkasReader::open(&paths.akas)?.with_limit(options.row_limit);
    build_from_readers(store, basics, akas)
}

/// Run both passes from already-opened readers
pub fn build_from_readers<B: Read, A: Read>(
    store: &mut ConsolidatedStore,
    basics: BasicsReader<B>,
    akas: AkasReader<A>,
) -> Result<EtlSummary> {
    let start = Instant::now();
    let mut summary = EtlSummary::default();

    info!("Loading title basics...");
    ingest_basics(store, basics, &mut summary)?;
    info!(
        "Basics pass done: {} titles upserted, {} rows skipped",
        summary.titles_upserted, summary.basics_skipped
    );

    info!("Loading alternate names...");
    ingest_akas(store, akas, &mut summary)?;

    let retry = store.retry_deferred_akas()?;
    summary.akas_recovered = retry.applied;
    summary.akas_upserted += retry.applied;
    summary.orphans_dropped = retry.dropped;
    store.flush()?;

    info!(
        "Akas pass done: {} alternate names upserted, {} rows skipped, {} orphans dropped",
        summary.akas_upserted, summary.akas_skipped, summary.orphans_dropped
    );
    info!("Store build finished in {:.1?}", start.elapsed());
    Ok(summary)
}

fn ingest_basics<R: Read>(
    store: &mut ConsolidatedStore,
    mut reader: BasicsReader<R>,
    summary: &mut EtlSummary,
) -> Result<()> {
    while let Some(record) = reader.next() {
        store.upsert_basics(&record?)?;
        summary.titles_upserted += 1;
        log_progress(&reader, "basics");
    }
    summary.basics_read = reader.rows_read();
    summary.basics_skipped = reader.rows_skipped();
    Ok(())
}

fn ingest_akas<R: Read>(
    store: &mut ConsolidatedStore,
    mut reader: AkasReader<R>,
    summary: &mut EtlSummary,
) -> Result<()> {
    while let Some(record) = reader.next() {
        if store.upsert_aka(record?)? == AkaUpsert::Applied {
            summary.akas_upserted += 1;
        }
        log_progress(&reader, "akas");
    }
    summary.akas_read = reader.rows_read();
    summary.akas_skipped = reader.rows_skipped();
    Ok(())
}

fn log_progress<R: Read, T: crate::parser::DatasetRecord>(
    reader: &DatasetReader<R, T>,
    pass: &str,
) {
    let read = reader.rows_read();
    if read > 0 && read % PROGRESS_EVERY == 0 {
        info!(
            "  {}: {} rows read ({} skipped)",
            pass,
            read,
            reader.rows_skipped()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::TitleLookup;
    use std::fs;

    const BASICS: &str = "tconst\ttitleType\tprimaryTitle\toriginalTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres\n\
tt0001\tmovie\tJallikattu\tJallikattu\t0\t2019\t\\N\t91\tAction,Drama\n\
tt0002\tmovie\tKnives Out\tKnives Out\t0\t2019\t\\N\t130\tComedy,Crime\n\
tt0003\tmovie\tKnives Out\tKnives Out\t0\t1985\t\\N\t90\tHorror\n\
tt0004\tmovie\tMissing Fields\n";

    const AKAS: &str = "titleId\tordering\ttitle\tregion\tlanguage\ttypes\tattributes\tisOriginalTitle\n\
tt0001\t1\tJallikattu\tIN\tml\t\\N\t\\N\t1\n\
tt0001\t2\tThe Bull Chase\tUS\ten\t\\N\t\\N\t0\n\
tt0002\t1\tÀ couteaux tirés\tFR\tfr\t\\N\t\\N\t0\n\
tt0404\t1\tGhost Film\tUS\ten\t\\N\t\\N\t0\n";

    fn write_dumps(dir: &Path, basics: &str, akas: &str) -> DatasetPaths {
        let paths = DatasetPaths::in_dir(dir);
        fs::write(&paths.basics, basics).unwrap();
        fs::write(&paths.akas, akas).unwrap();
        paths
    }

    fn snapshot(store: &ConsolidatedStore) -> (Vec<String>, Vec<String>) {
        let mut titles = store
            .conn
            .prepare("SELECT id || '|' || primary_name || '|' || IFNULL(release_year, '?') || '|' || genres FROM titles ORDER BY id")
            .unwrap();
        let titles: Vec<String> = titles
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        let mut akas = store
            .conn
            .prepare("SELECT title_id || '|' || ordering || '|' || name FROM alternate_names ORDER BY title_id, ordering")
            .unwrap();
        let akas: Vec<String> = akas
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        (titles, akas)
    }

    #[test]
    fn test_build_counts_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_dumps(dir.path(), BASICS, AKAS);
        let mut store = ConsolidatedStore::open_in_memory().unwrap();

        let summary = build_store(&mut store, &paths, EtlOptions::default()).unwrap();

        assert_eq!(summary.basics_read, 4);
        assert_eq!(summary.basics_skipped, 1);
        assert_eq!(summary.titles_upserted, 3);
        assert_eq!(summary.akas_upserted, 3);
        assert_eq!(summary.orphans_dropped, 1);

        // The malformed row produced no title
        assert!(store.lookup_by_id("tt0004").unwrap().is_none());
        assert_eq!(store.counts().unwrap().0, 3);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_dumps(dir.path(), BASICS, AKAS);
        let db = dir.path().join("store.db");

        let mut store = ConsolidatedStore::open(&db).unwrap();
        build_store(&mut store, &paths, EtlOptions::default()).unwrap();
        let once = snapshot(&store);
        let counts_once = store.counts().unwrap();

        build_store(&mut store, &paths, EtlOptions::default()).unwrap();
        assert_eq!(snapshot(&store), once);
        assert_eq!(store.counts().unwrap(), counts_once);
    }

    #[test]
    fn test_no_alternate_name_without_parent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_dumps(dir.path(), BASICS, AKAS);
        let mut store = ConsolidatedStore::open_in_memory().unwrap();
        build_store(&mut store, &paths, EtlOptions::default()).unwrap();

        let mut stmt = store
            .conn
            .prepare("SELECT DISTINCT title_id FROM alternate_names")
            .unwrap();
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        drop(stmt);

        assert!(!ids.is_empty());
        for id in ids {
            assert!(store.lookup_by_id(&id).unwrap().is_some(), "dangling {}", id);
        }
    }

    #[test]
    fn test_akas_without_basics_are_dropped() {
        let mut store = ConsolidatedStore::open_in_memory().unwrap();
        let empty_basics = "tconst\ttitleType\tprimaryTitle\toriginalTitle\tstartYear\tgenres\n";
        let basics: BasicsReader<&[u8]> = DatasetReader::from_reader(empty_basics.as_bytes()).unwrap();
        let akas: AkasReader<&[u8]> = DatasetReader::from_reader(AKAS.as_bytes()).unwrap();

        let summary = build_from_readers(&mut store, basics, akas).unwrap();
        assert_eq!(summary.akas_upserted, 0);
        assert_eq!(summary.orphans_dropped, 4);
    }

    #[test]
    fn test_refreshed_dump_updates_rows() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_dumps(dir.path(), BASICS, AKAS);
        let mut store = ConsolidatedStore::open_in_memory().unwrap();
        build_store(&mut store, &paths, EtlOptions::default()).unwrap();
        store.set_enrichment("tt0001", 7.4, Some(900)).unwrap();

        let refreshed = BASICS.replace("Jallikattu\tJallikattu", "Jallikattu Redux\tJallikattu");
        let paths = write_dumps(dir.path(), &refreshed, AKAS);
        build_store(&mut store, &paths, EtlOptions::default()).unwrap();

        let title = store.lookup_by_id("tt0001").unwrap().unwrap();
        assert_eq!(title.primary_name, "Jallikattu Redux");
        assert_eq!(title.rating, Some(7.4));
        assert_eq!(store.counts().unwrap().0, 3);
        // Still reachable through the original name and the alternate name
        assert_eq!(store.lookup_by_normalized_name("jallikattu").unwrap().len(), 1);
        assert_eq!(store.lookup_by_normalized_name("Bull Chase").unwrap().len(), 1);
    }

    #[test]
    fn test_row_limit_builds_partial_store() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_dumps(dir.path(), BASICS, AKAS);
        let mut store = ConsolidatedStore::open_in_memory().unwrap();

        let summary = build_store(&mut store, &paths, EtlOptions { row_limit: Some(1) }).unwrap();
        assert_eq!(summary.titles_upserted, 1);
        assert_eq!(store.counts().unwrap().0, 1);
    }
}
