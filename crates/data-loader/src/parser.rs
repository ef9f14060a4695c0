//! Streaming readers for the tab-separated title datasets.
//!
//! - title.basics.tsv: tconst, titleType, primaryTitle, originalTitle, startYear, genres, ...
//! - title.akas.tsv: titleId, ordering, title, region, language, types, attributes, isOriginalTitle
//! - title.ratings.tsv: tconst, averageRating, numVotes
//!
//! Readers hold one record buffer at a time and locate columns by header
//! name. A line that cannot be turned into a record is skipped and counted;
//! only I/O failures end the stream with an error.

use crate::error::{DataLoadError, Result};
use crate::types::*;
use csv::{ByteRecord, ReaderBuilder};
use std::fs::File;
use std::io::{BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;
use tracing::debug;

/// Token the dumps use for a missing scalar value
pub const UNKNOWN: &str = "\\N";

const READ_BUFFER_BYTES: usize = 8 << 20;

/// A record type that can be decoded from one dataset line.
pub trait DatasetRecord: Sized {
    /// File name used in log lines and errors
    const FILE: &'static str;
    /// Header names this record reads, in the order `from_row` addresses them
    const COLUMNS: &'static [&'static str];

    /// Decode one line. The error string is the reason the row is skipped.
    fn from_row(row: &Row<'_>) -> std::result::Result<Self, String>;
}

/// View of one line restricted to the columns a record asked for.
pub struct Row<'a> {
    record: &'a ByteRecord,
    positions: &'a [usize],
}

impl Row<'_> {
    /// Field `i` of `COLUMNS`; `None` when the source wrote the unknown token
    pub fn optional(&self, i: usize) -> std::result::Result<Option<&str>, String> {
        let raw = self
            .record
            .get(self.positions[i])
            .ok_or_else(|| format!("missing field {}", i))?;
        let value = std::str::from_utf8(raw).map_err(|e| format!("invalid UTF-8: {}", e))?;
        if value == UNKNOWN {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    /// Field `i` of `COLUMNS`, which must be present and non-empty
    pub fn required(&self, i: usize, name: &str) -> std::result::Result<&str, String> {
        match self.optional(i)? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(format!("Missing {}", name)),
        }
    }
}

/// Lazy sequence of records read from one dataset.
///
/// Not restartable: open the file again to read it again.
pub struct DatasetReader<R: Read, T: DatasetRecord> {
    reader: csv::Reader<R>,
    record: ByteRecord,
    positions: Vec<usize>,
    header_len: usize,
    rows_read: u64,
    rows_skipped: u64,
    limit: Option<u64>,
    _record: PhantomData<T>,
}

impl<T: DatasetRecord> DatasetReader<BufReader<File>, T> {
    /// Open a dataset file from disk
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DataLoadError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => DataLoadError::IoError(e),
        })?;
        Self::from_reader(BufReader::with_capacity(READ_BUFFER_BYTES, file))
    }
}

impl<R: Read, T: DatasetRecord> DatasetReader<R, T> {
    /// Wrap any reader; the first line must be the header
    pub fn from_reader(input: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .quoting(false)
            .flexible(true)
            .from_reader(input);

        let headers = reader.byte_headers()?.clone();
        let positions = T::COLUMNS
            .iter()
            .map(|column| {
                headers
                    .iter()
                    .position(|h| h == column.as_bytes())
                    .ok_or_else(|| DataLoadError::MissingColumn {
                        file: T::FILE.to_string(),
                        column: column.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            reader,
            record: ByteRecord::new(),
            positions,
            header_len: headers.len(),
            rows_read: 0,
            rows_skipped: 0,
            limit: None,
            _record: PhantomData,
        })
    }

    /// Stop after `limit` data lines (skipped lines count towards the limit)
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Data lines consumed so far, including skipped ones
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Data lines that could not be decoded
    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped
    }

    fn skip(&mut self, line: u64, reason: String) {
        self.rows_skipped += 1;
        let error = DataLoadError::ParseError {
            file: T::FILE.to_string(),
            line,
            reason,
        };
        debug!("Skipping row: {}", error);
    }
}

impl<R: Read, T: DatasetRecord> Iterator for DatasetReader<R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.limit.is_some_and(|limit| self.rows_read >= limit) {
                return None;
            }
            match self.reader.read_byte_record(&mut self.record) {
                Ok(false) => return None,
                Ok(true) => {}
                Err(e) if e.is_io_error() => return Some(Err(e.into())),
                Err(e) => {
                    // Decoding problems below the row level still only cost one row
                    self.rows_read += 1;
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    self.skip(line, e.to_string());
                    continue;
                }
            }
            self.rows_read += 1;

            let line = self.record.position().map(|p| p.line()).unwrap_or(0);
            if self.record.len() != self.header_len {
                let reason = format!(
                    "expected {} fields but found {}",
                    self.header_len,
                    self.record.len()
                );
                self.skip(line, reason);
                continue;
            }

            let row = Row {
                record: &self.record,
                positions: &self.positions,
            };
            match T::from_row(&row) {
                Ok(parsed) => return Some(Ok(parsed)),
                Err(reason) => self.skip(line, reason),
            }
        }
    }
}

// =============================================================================
// Record decoders
// =============================================================================

impl DatasetRecord for BasicsRecord {
    const FILE: &'static str = "title.basics.tsv";
    const COLUMNS: &'static [&'static str] = &[
        "tconst",
        "titleType",
        "primaryTitle",
        "originalTitle",
        "startYear",
        "genres",
    ];

    fn from_row(row: &Row<'_>) -> std::result::Result<Self, String> {
        let id = row.required(0, "tconst")?;
        let title_type = row.required(1, "titleType")?;
        let primary_name = row.required(2, "primaryTitle")?;
        let original_name = row
            .optional(3)?
            .filter(|name| !name.is_empty())
            .unwrap_or(primary_name);
        let release_year = row
            .optional(4)?
            .map(|year| {
                year.parse::<u16>()
                    .map_err(|e| format!("Invalid startYear '{}': {}", year, e))
            })
            .transpose()?;

        Ok(BasicsRecord {
            id: id.to_string(),
            title_type: TitleType::parse(title_type),
            primary_name: primary_name.to_string(),
            original_name: original_name.to_string(),
            release_year,
            genres: parse_genres(row.optional(5)?),
            rating: None,
            rating_votes: None,
        })
    }
}

impl DatasetRecord for AkaRecord {
    const FILE: &'static str = "title.akas.tsv";
    const COLUMNS: &'static [&'static str] = &[
        "titleId",
        "ordering",
        "title",
        "region",
        "language",
        "isOriginalTitle",
    ];

    fn from_row(row: &Row<'_>) -> std::result::Result<Self, String> {
        let title_id = row.required(0, "titleId")?;
        let ordering = row.required(1, "ordering")?;
        let ordering = ordering
            .parse::<u32>()
            .map_err(|e| format!("Invalid ordering '{}': {}", ordering, e))?;
        let name = row.required(2, "title")?;
        let is_original_title = match row.optional(5)? {
            None | Some("") => None,
            Some("1") => Some(true),
            Some("0") => Some(false),
            Some(other) => return Err(format!("Invalid isOriginalTitle '{}'", other)),
        };

        Ok(AlternateName {
            title_id: title_id.to_string(),
            ordering,
            name: name.to_string(),
            region: non_empty(row.optional(3)?),
            language: non_empty(row.optional(4)?),
            is_original_title,
        })
    }
}

impl DatasetRecord for RatingRecord {
    const FILE: &'static str = "title.ratings.tsv";
    const COLUMNS: &'static [&'static str] = &["tconst", "averageRating", "numVotes"];

    fn from_row(row: &Row<'_>) -> std::result::Result<Self, String> {
        let title_id = row.required(0, "tconst")?;
        let rating = row.required(1, "averageRating")?;
        let votes = row.required(2, "numVotes")?;
        Ok(RatingRecord {
            title_id: title_id.to_string(),
            average_rating: rating
                .parse()
                .map_err(|e| format!("Invalid averageRating '{}': {}", rating, e))?,
            num_votes: votes
                .parse()
                .map_err(|e| format!("Invalid numVotes '{}': {}", votes, e))?,
        })
    }
}

/// Reader over title.basics.tsv
pub type BasicsReader<R> = DatasetReader<R, BasicsRecord>;
/// Reader over title.akas.tsv
pub type AkasReader<R> = DatasetReader<R, AkaRecord>;
/// Reader over title.ratings.tsv
pub type RatingsReader<R> = DatasetReader<R, RatingRecord>;

/// Parse comma-separated genres
///
/// Example: "Crime,Drama" -> vec!["Crime", "Drama"]
fn parse_genres(s: Option<&str>) -> Vec<String> {
    s.map(|genres| {
        genres
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASICS: &str = "tconst\ttitleType\tprimaryTitle\toriginalTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres\n\
tt0001\tmovie\tJallikattu\tJallikattu\t0\t2019\t\\N\t91\tAction,Drama\n\
tt0002\tmovie\tKnives Out\tKnives Out\t0\t\\N\t\\N\t\\N\t\\N\n\
tt0003\tmovie\tBroken Row\n\
tt0004\tshort\t\\N\t\\N\t0\t1999\t\\N\t5\tShort\n\
tt0005\tvideo\tQuoted \"Name\"\tQuoted \"Name\"\t0\tabcd\t\\N\t5\tShort\n\
tt0006\ttvMovie\tTV Film\tTV Film\t0\t2001\t\\N\t90\tDrama\n";

    fn basics_reader(input: &str) -> BasicsReader<&[u8]> {
        DatasetReader::from_reader(input.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_basics_rows() {
        let mut reader = basics_reader(BASICS);
        let records: Vec<BasicsRecord> = reader.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, "tt0001");
        assert_eq!(records[0].release_year, Some(2019));
        assert_eq!(records[0].genres, vec!["Action", "Drama"]);
        assert!(records[0].title_type.is_movie());

        // Unknown year and genres stay unknown, not zero or empty-string
        assert_eq!(records[1].release_year, None);
        assert!(records[1].genres.is_empty());

        assert_eq!(records[2].title_type, TitleType::Other("tvMovie".to_string()));

        // Short line, unknown required title, non-numeric year
        assert_eq!(reader.rows_read(), 6);
        assert_eq!(reader.rows_skipped(), 3);
    }

    #[test]
    fn test_missing_header_column_is_fatal() {
        let result = BasicsReader::from_reader("tconst\tprimaryTitle\ntt1\tX\n".as_bytes());
        assert!(matches!(
            result,
            Err(DataLoadError::MissingColumn { ref column, .. }) if column == "titleType"
        ));
    }

    #[test]
    fn test_parse_akas_rows() {
        let input = "titleId\tordering\ttitle\tregion\tlanguage\ttypes\tattributes\tisOriginalTitle\n\
tt0001\t1\tJallikattu\tIN\thi\t\\N\t\\N\t0\n\
tt0001\t2\tJallikattu\t\\N\t\\N\toriginal\t\\N\t1\n\
tt0001\tx\tBad Ordering\tIN\thi\t\\N\t\\N\t0\n";
        let mut reader: AkasReader<&[u8]> = DatasetReader::from_reader(input.as_bytes()).unwrap();
        let akas: Vec<AkaRecord> = reader.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(akas.len(), 2);
        assert_eq!(akas[0].region.as_deref(), Some("IN"));
        assert_eq!(akas[0].language.as_deref(), Some("hi"));
        assert_eq!(akas[0].is_original_title, Some(false));
        assert_eq!(akas[1].region, None);
        assert_eq!(akas[1].language, None);
        assert_eq!(akas[1].is_original_title, Some(true));
        assert_eq!(reader.rows_skipped(), 1);
    }

    #[test]
    fn test_parse_ratings_rows() {
        let input = "tconst\taverageRating\tnumVotes\ntt0001\t7.4\t12345\ntt0002\tNaN-ish\t1\n";
        let mut reader: RatingsReader<&[u8]> =
            DatasetReader::from_reader(input.as_bytes()).unwrap();
        let ratings: Vec<RatingRecord> = reader.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].average_rating, 7.4);
        assert_eq!(ratings[0].num_votes, 12345);
        assert_eq!(reader.rows_skipped(), 1);
    }

    #[test]
    fn test_row_limit() {
        let mut reader = basics_reader(BASICS).with_limit(Some(2));
        let records: Vec<_> = reader.by_ref().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(reader.rows_read(), 2);
    }

    #[test]
    fn test_open_missing_file() {
        let result = BasicsReader::open(Path::new("/definitely/not/here.tsv"));
        assert!(matches!(result, Err(DataLoadError::FileNotFound { .. })));
    }

    #[test]
    fn test_parse_genres() {
        assert_eq!(parse_genres(Some("Comedy")), vec!["Comedy"]);
        assert!(parse_genres(None).is_empty());
    }
}
