//! SQLite-backed consolidated store.
//!
//! Tables:
//! - `titles`: one row per canonical title, keyed by id
//! - `alternate_names`: keyed by (title_id, ordering), FK to `titles`
//! - `name_index`: normalized name -> title id, tagged with the origin of the
//!   name (`basics` or `aka:<ordering>`) so a re-upsert can replace exactly
//!   the keys it produced
//! - `temp.deferred_alternate_names`: connection-local overflow for orphan
//!   alternate names past the in-memory limit
//!
//! Writes are grouped into transactions of `batch_size` rows. A row's
//! statements always land in the same transaction, so a row is either fully
//! applied or not at all. Call `flush` (or `close`) at the end of a run.

use crate::error::Result;
use crate::lookup::TitleLookup;
use crate::normalize::normalize_title;
use crate::types::*;
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

const SCHEMA_VERSION: i32 = 1;

/// Default number of rows per write transaction
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Orphan alternate names held in memory before the rest spill to a temp table
pub const DEFAULT_DEFERRED_LIMIT: usize = 100_000;

const BASICS_ORIGIN: &str = "basics";

const TITLE_COLUMNS: &str = "t.id, t.primary_name, t.original_name, t.title_type, t.release_year, \
     t.genres, t.rating, t.rating_votes, t.languages";

/// What happened to an alternate name handed to `upsert_aka`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AkaUpsert {
    /// Written to the store
    Applied,
    /// Parent title unknown; held for `retry_deferred_akas`
    Deferred,
}

/// Outcome of the single retry pass over deferred alternate names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryOutcome {
    pub applied: u64,
    pub dropped: u64,
}

/// Handle to the consolidated store file.
///
/// The store is the only writer of its file; callers pass the handle
/// explicitly and keep all mutation on one thread.
pub struct ConsolidatedStore {
    pub(crate) conn: Connection,
    batch_size: usize,
    rows_in_batch: usize,
    deferred_akas: Vec<AkaRecord>,
    deferred_limit: usize,
    /// Rows in `temp.deferred_alternate_names`
    spilled_akas: usize,
}

impl ConsolidatedStore {
    /// Open (creating if needed) the store at `path` and bring its schema up to date
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )?;
        info!("Opened consolidated store at {}", path.display());
        Self::from_connection(conn)
    }

    /// A throwaway store, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn,
            batch_size: DEFAULT_BATCH_SIZE,
            rows_in_batch: 0,
            deferred_akas: Vec::new(),
            deferred_limit: DEFAULT_DEFERRED_LIMIT,
            spilled_akas: 0,
        })
    }

    /// Rows per write transaction (minimum 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Orphan alternate names kept in memory (minimum 1); the overflow goes
    /// to a temporary table on the same connection
    pub fn with_deferred_limit(mut self, limit: usize) -> Self {
        self.deferred_limit = limit.max(1);
        self
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Insert or update a title by id.
    ///
    /// All basics fields are replaced. `rating`/`rating_votes` keep their
    /// stored values unless the record carries its own; enrichment languages
    /// are never touched here.
    pub fn upsert_basics(&mut self, record: &BasicsRecord) -> Result<()> {
        self.begin_row()?;
        let genres: BTreeSet<&str> = record.genres.iter().map(String::as_str).collect();
        let genres = encode_set(&genres)?;

        self.conn
            .prepare_cached(
                "INSERT INTO titles (id, primary_name, original_name, title_type, release_year, genres, rating, rating_votes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    primary_name = excluded.primary_name,
                    original_name = excluded.original_name,
                    title_type = excluded.title_type,
                    release_year = excluded.release_year,
                    genres = excluded.genres,
                    rating = COALESCE(excluded.rating, titles.rating),
                    rating_votes = COALESCE(excluded.rating_votes, titles.rating_votes)",
            )?
            .execute(params![
                record.id,
                record.primary_name,
                record.original_name,
                record.title_type.as_str(),
                record.release_year,
                genres,
                record.rating,
                record.rating_votes,
            ])?;

        let names = [record.primary_name.as_str(), record.original_name.as_str()];
        self.replace_index_entries(&record.id, BASICS_ORIGIN, &names)?;
        self.end_row()
    }

    /// Insert or update an alternate name.
    ///
    /// When the parent title is not in the store yet the record is deferred
    /// and retried once by `retry_deferred_akas`. Up to the deferred limit
    /// are held in memory; the rest spill to a temporary table.
    pub fn upsert_aka(&mut self, record: AkaRecord) -> Result<AkaUpsert> {
        if !self.contains_title(&record.title_id)? {
            if self.deferred_akas.len() < self.deferred_limit {
                self.deferred_akas.push(record);
            } else {
                self.spill_aka(&record)?;
            }
            return Ok(AkaUpsert::Deferred);
        }
        self.write_aka(&record)?;
        Ok(AkaUpsert::Applied)
    }

    /// Retry every deferred alternate name once; those still without a parent are dropped
    pub fn retry_deferred_akas(&mut self) -> Result<RetryOutcome> {
        let mut outcome = RetryOutcome::default();
        for record in std::mem::take(&mut self.deferred_akas) {
            self.retry_aka(&record, &mut outcome)?;
        }

        if self.spilled_akas > 0 {
            let mut after = 0i64;
            loop {
                let chunk = self.read_spilled(after, self.deferred_limit)?;
                let Some((last, _)) = chunk.last() else {
                    break;
                };
                after = *last;
                for (_, record) in &chunk {
                    self.retry_aka(record, &mut outcome)?;
                }
            }
            self.conn.execute_batch("DELETE FROM temp.deferred_alternate_names")?;
            self.spilled_akas = 0;
        }

        if outcome.dropped > 0 {
            warn!(
                "Dropped {} alternate names whose title is unknown",
                outcome.dropped
            );
        }
        Ok(outcome)
    }

    /// Number of alternate names waiting for their parent title
    pub fn deferred_count(&self) -> usize {
        self.deferred_akas.len() + self.spilled_akas
    }

    fn retry_aka(&mut self, record: &AkaRecord, outcome: &mut RetryOutcome) -> Result<()> {
        if self.contains_title(&record.title_id)? {
            self.write_aka(record)?;
            outcome.applied += 1;
        } else {
            debug!(
                "Dropping orphan alternate name '{}' ({} #{})",
                record.name, record.title_id, record.ordering
            );
            outcome.dropped += 1;
        }
        Ok(())
    }

    fn spill_aka(&mut self, record: &AkaRecord) -> Result<()> {
        if self.spilled_akas == 0 {
            info!(
                "More than {} orphan alternate names; spilling the rest to a temporary table",
                self.deferred_limit
            );
            self.conn.execute_batch(
                "CREATE TEMP TABLE IF NOT EXISTS deferred_alternate_names (
                    title_id          TEXT NOT NULL,
                    ordering          INTEGER NOT NULL,
                    name              TEXT NOT NULL,
                    region            TEXT,
                    language          TEXT,
                    is_original_title INTEGER
                )",
            )?;
        }
        self.begin_row()?;
        self.conn
            .prepare_cached(
                "INSERT INTO temp.deferred_alternate_names
                    (title_id, ordering, name, region, language, is_original_title)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                record.title_id,
                record.ordering,
                record.name,
                record.region,
                record.language,
                record.is_original_title,
            ])?;
        self.spilled_akas += 1;
        self.end_row()
    }

    /// Spilled rows after `after` in insertion order, with their rowids
    fn read_spilled(&self, after: i64, limit: usize) -> Result<Vec<(i64, AkaRecord)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT rowid, title_id, ordering, name, region, language, is_original_title
             FROM temp.deferred_alternate_names WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![after, limit as i64], |row| {
                Ok((
                    row.get(0)?,
                    AlternateName {
                        title_id: row.get(1)?,
                        ordering: row.get(2)?,
                        name: row.get(3)?,
                        region: row.get(4)?,
                        language: row.get(5)?,
                        is_original_title: row.get(6)?,
                    },
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn write_aka(&mut self, record: &AkaRecord) -> Result<()> {
        self.begin_row()?;
        self.conn
            .prepare_cached(
                "INSERT INTO alternate_names (title_id, ordering, name, region, language, is_original_title)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(title_id, ordering) DO UPDATE SET
                    name = excluded.name,
                    region = excluded.region,
                    language = excluded.language,
                    is_original_title = excluded.is_original_title",
            )?
            .execute(params![
                record.title_id,
                record.ordering,
                record.name,
                record.region,
                record.language,
                record.is_original_title,
            ])?;

        let origin = format!("aka:{}", record.ordering);
        self.replace_index_entries(&record.title_id, &origin, &[record.name.as_str()])?;
        self.end_row()
    }

    /// Set rating facts on a title; unknown `votes` are stored as NULL.
    /// Unknown ids are a no-op and return `false`.
    pub fn set_enrichment(&mut self, id: &str, rating: f32, votes: Option<u32>) -> Result<bool> {
        self.begin_row()?;
        let changed = self
            .conn
            .prepare_cached("UPDATE titles SET rating = ?2, rating_votes = ?3 WHERE id = ?1")?
            .execute(params![id, rating, votes])?;
        self.end_row()?;
        if changed == 0 {
            debug!("Enrichment for unknown title {} ignored", id);
        }
        Ok(changed > 0)
    }

    /// Merge display-name languages into a title. Unknown ids are a no-op.
    pub fn set_languages(&mut self, id: &str, languages: &BTreeSet<String>) -> Result<bool> {
        let Some(mut title) = self.lookup_by_id(id)? else {
            return Ok(false);
        };
        title.languages.extend(languages.iter().cloned());
        let encoded = encode_set(&title.languages)?;

        self.begin_row()?;
        self.conn
            .prepare_cached("UPDATE titles SET languages = ?2 WHERE id = ?1")?
            .execute(params![id, encoded])?;
        self.end_row()?;
        Ok(true)
    }

    /// Commit the open write transaction, if any
    pub fn flush(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        self.rows_in_batch = 0;
        Ok(())
    }

    /// Flush and release the file
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }

    fn begin_row(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        self.rows_in_batch += 1;
        if self.rows_in_batch >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn replace_index_entries(&mut self, id: &str, origin: &str, names: &[&str]) -> Result<()> {
        self.conn
            .prepare_cached("DELETE FROM name_index WHERE title_id = ?1 AND origin = ?2")?
            .execute(params![id, origin])?;

        let keys: BTreeSet<String> = names
            .iter()
            .map(|name| normalize_title(name))
            .filter(|key| !key.is_empty())
            .collect();
        let mut insert = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO name_index (normalized_name, title_id, origin) VALUES (?1, ?2, ?3)",
        )?;
        for key in keys {
            insert.execute(params![key, id, origin])?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn contains_title(&self, id: &str) -> Result<bool> {
        let found = self
            .conn
            .prepare_cached("SELECT 1 FROM titles WHERE id = ?1")?
            .query_row(params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Ids among `ids` that exist and have no rating yet, in input order
    pub fn titles_missing_rating<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Result<Vec<TitleId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT rating IS NULL FROM titles WHERE id = ?1")?;
        let mut missing = Vec::new();
        let mut seen = BTreeSet::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            let unrated: Option<bool> = stmt.query_row(params![id], |row| row.get(0)).optional()?;
            if unrated == Some(true) {
                missing.push(id.to_string());
            }
        }
        Ok(missing)
    }

    /// Counts of (titles, alternate names, name index rows)
    pub fn counts(&self) -> Result<(u64, u64, u64)> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as u64)
        };
        Ok((count("titles")?, count("alternate_names")?, count("name_index")?))
    }
}

impl TitleLookup for ConsolidatedStore {
    fn lookup_by_normalized_name(&self, name: &str) -> Result<Vec<CanonicalTitle>> {
        let key = normalize_title(name);
        if key.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM titles t
             WHERE t.id IN (SELECT title_id FROM name_index WHERE normalized_name = ?1)
             ORDER BY t.id",
            TITLE_COLUMNS
        ))?;
        let titles = stmt
            .query_map(params![key], title_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(titles)
    }

    fn lookup_by_id(&self, id: &str) -> Result<Option<CanonicalTitle>> {
        let title = self
            .conn
            .prepare_cached(&format!("SELECT {} FROM titles t WHERE t.id = ?1", TITLE_COLUMNS))?
            .query_row(params![id], title_from_row)
            .optional()?;
        Ok(title)
    }

    fn alternate_names(&self, id: &str) -> Result<Vec<AlternateName>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT title_id, ordering, name, region, language, is_original_title
             FROM alternate_names WHERE title_id = ?1 ORDER BY ordering",
        )?;
        let names = stmt
            .query_map(params![id], |row| {
                Ok(AlternateName {
                    title_id: row.get(0)?,
                    ordering: row.get(1)?,
                    name: row.get(2)?,
                    region: row.get(3)?,
                    language: row.get(4)?,
                    is_original_title: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |r| r.get(0))?;
    if version < SCHEMA_VERSION {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS titles (
                id            TEXT PRIMARY KEY,
                primary_name  TEXT NOT NULL,
                original_name TEXT NOT NULL,
                title_type    TEXT NOT NULL,
                release_year  INTEGER,
                genres        TEXT NOT NULL DEFAULT '[]',
                rating        REAL,
                rating_votes  INTEGER,
                languages     TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS alternate_names (
                title_id          TEXT NOT NULL REFERENCES titles(id) ON DELETE CASCADE,
                ordering          INTEGER NOT NULL,
                name              TEXT NOT NULL,
                region            TEXT,
                language          TEXT,
                is_original_title INTEGER,
                PRIMARY KEY (title_id, ordering)
            );

            CREATE TABLE IF NOT EXISTS name_index (
                normalized_name TEXT NOT NULL,
                title_id        TEXT NOT NULL REFERENCES titles(id) ON DELETE CASCADE,
                origin          TEXT NOT NULL,
                PRIMARY KEY (normalized_name, title_id, origin)
            ) WITHOUT ROWID;

            CREATE INDEX IF NOT EXISTS idx_name_index_title ON name_index(title_id, origin);

            PRAGMA user_version = 1;",
        )?;
    }
    Ok(())
}

fn title_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CanonicalTitle> {
    let title_type: String = row.get(3)?;
    Ok(CanonicalTitle {
        id: row.get(0)?,
        primary_name: row.get(1)?,
        original_name: row.get(2)?,
        title_type: TitleType::parse(&title_type),
        release_year: row.get(4)?,
        genres: decode_set(row, 5)?,
        rating: row.get(6)?,
        rating_votes: row.get(7)?,
        languages: decode_set(row, 8)?,
    })
}

fn encode_set<T: serde::Serialize>(set: &BTreeSet<T>) -> Result<String> {
    serde_json::to_string(set).map_err(|e| crate::DataLoadError::InvalidValue {
        field: "string set".to_string(),
        value: e.to_string(),
    })
}

fn decode_set(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<BTreeSet<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
