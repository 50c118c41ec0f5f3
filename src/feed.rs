//! Flat-file promotion feed
//!
//! Rows are `identifier,price,expiration` with no header. Rows that cannot
//! become a record are skipped and counted; only failing to open or read the
//! file aborts a load.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::store::PromotionRecord;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed source '{path}' is unavailable: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read feed source '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Why a single row was skipped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("expected 3 fields, found {0}")]
    TooFewFields(usize),
    #[error("field {0} is not valid UTF-8")]
    NotUtf8(usize),
    #[error("price '{0}' is not a non-negative decimal")]
    InvalidPrice(String),
}

/// Parse one row's fields into a record
pub fn parse_row(fields: &csv::ByteRecord) -> Result<PromotionRecord, RowError> {
    if fields.len() < 3 {
        return Err(RowError::TooFewFields(fields.len()));
    }

    let field = move |idx: usize| std::str::from_utf8(&fields[idx]).map_err(|_| RowError::NotUtf8(idx + 1));
    let identifier = field(0)?;
    let price_text = field(1)?;
    let expiration = field(2)?;

    let price = match price_text.trim().parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => price,
        _ => return Err(RowError::InvalidPrice(price_text.to_string())),
    };

    Ok(PromotionRecord::new(identifier, price, expiration))
}

/// Lazy reader over one pass of a feed source
pub struct FeedReader<R = File> {
    path: PathBuf,
    reader: csv::Reader<R>,
    row: csv::ByteRecord,
    malformed_rows: u64,
    done: bool,
}

impl FeedReader<File> {
    /// Open the feed file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| FeedError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(file, path))
    }
}

impl<R: Read> FeedReader<R> {
    /// Wrap an already opened source; `path` is only used in messages
    pub fn from_reader(source: R, path: impl Into<PathBuf>) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(source);
        Self {
            path: path.into(),
            reader,
            row: csv::ByteRecord::new(),
            malformed_rows: 0,
            done: false,
        }
    }

    /// Rows skipped so far in this pass
    pub fn malformed_rows(&self) -> u64 {
        self.malformed_rows
    }
}

impl<R: Read> Iterator for FeedReader<R> {
    type Item = Result<PromotionRecord, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.reader.read_byte_record(&mut self.row) {
                Ok(false) => self.done = true,
                Ok(true) => match parse_row(&self.row) {
                    Ok(record) => return Some(Ok(record)),
                    Err(e) => {
                        self.malformed_rows += 1;
                        let line = self.row.position().map(|p| p.line()).unwrap_or_default();
                        warn!("Skipping malformed row {} in {}: {}", line, self.path.display(), e);
                    }
                },
                Err(source) => {
                    self.done = true;
                    return Some(Err(FeedError::Read {
                        path: self.path.clone(),
                        source,
                    }));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn read_all(data: &str) -> (Vec<PromotionRecord>, u64) {
        let mut feed = FeedReader::from_reader(data.as_bytes(), "test.csv");
        let records = feed.by_ref().collect::<Result<Vec<_>, _>>().unwrap();
        (records, feed.malformed_rows())
    }

    #[test]
    fn test_reads_rows_in_order() {
        let (records, malformed) = read_all("P1,9.99,2025-01-01\nP2,14.50,2025-02-01\n");
        assert_eq!(
            records,
            vec![
                PromotionRecord::new("P1", 9.99, "2025-01-01"),
                PromotionRecord::new("P2", 14.5, "2025-02-01"),
            ]
        );
        assert_eq!(malformed, 0);
    }

    #[test]
    fn test_skips_short_rows() {
        let (records, malformed) = read_all("P1,9.99\nP2,1.00,2025-02-01\nonly\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "P2");
        assert_eq!(malformed, 2);
    }

    #[test]
    fn test_rejects_bad_prices() {
        let (records, malformed) = read_all(
            "A,abc,2025-01-01\nB,-1,2025-01-01\nC,NaN,2025-01-01\nD,inf,2025-01-01\nE,,2025-01-01\nF,0,2025-01-01\n",
        );
        assert_eq!(records, vec![PromotionRecord::new("F", 0.0, "2025-01-01")]);
        assert_eq!(malformed, 5);
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let (records, malformed) = read_all("P1,2.5,2025-01-01,extra,columns\n");
        assert_eq!(records, vec![PromotionRecord::new("P1", 2.5, "2025-01-01")]);
        assert_eq!(malformed, 0);
    }

    #[test]
    fn test_quoted_fields_and_opaque_expiration() {
        let (records, _) = read_all("\"P,1\",\" 3.25 \",\"next tuesday\"\n");
        assert_eq!(records, vec![PromotionRecord::new("P,1", 3.25, "next tuesday")]);
    }

    #[test]
    fn test_invalid_utf8_row_is_skipped() {
        let mut data = b"P1,1.0,2025-01-01\n".to_vec();
        data.extend_from_slice(b"\xff\xfe,2.0,2025-01-01\n");
        data.extend_from_slice(b"P3,3.0,2025-01-01\n");

        let mut feed = FeedReader::from_reader(&data[..], "bytes");
        let records = feed.by_ref().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].identifier, "P3");
        assert_eq!(feed.malformed_rows(), 1);
    }

    #[test]
    fn test_parse_row_errors() {
        let short = csv::ByteRecord::from(vec!["a", "b"]);
        assert_eq!(parse_row(&short), Err(RowError::TooFewFields(2)));

        let bad_price = csv::ByteRecord::from(vec!["a", "x1", "c"]);
        assert_eq!(
            parse_row(&bad_price),
            Err(RowError::InvalidPrice("x1".to_string()))
        );
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        match FeedReader::open(&missing) {
            Err(FeedError::SourceUnavailable { path, .. }) => assert_eq!(path, missing),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected SourceUnavailable"),
        }
    }

    #[test]
    fn test_open_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "P1,9.99,2025-01-01").unwrap();
        writeln!(file, "P2,14.50,2025-02-01").unwrap();

        let feed = FeedReader::open(file.path()).unwrap();
        let records = feed.collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_read_error_ends_the_pass() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk gone"))
            }
        }

        let mut feed = FeedReader::from_reader(Broken, "broken");
        assert!(matches!(feed.next(), Some(Err(FeedError::Read { .. }))));
        assert!(feed.next().is_none());
    }
}
