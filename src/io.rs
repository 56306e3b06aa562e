//! Source reading
//!
//! Both backends read the CSV through [`CleanReader`], which decodes the
//! declared encoding and applies the bad-line policy record by record. The
//! cleaned records are re-encoded as UTF-8 CSV, which is what polars reads:
//! fully into memory for the eager backend ([`read_eager`]) or streamed into
//! partition files for the deferred backend ([`stage_partitions`]).

use crate::config::{BadLinePolicy, Encoding, SourceConfig};
use crate::errors::{BenchError, BenchResult};
use csv::{ByteRecord, StringRecord};
use polars::prelude::*;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Counts kept by a [`CleanReader`] while it walks the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub rows_kept: usize,
    pub rows_skipped: usize,
    pub rows_padded: usize,
}

pub struct CleanReader {
    inner: csv::Reader<BufReader<File>>,
    header: StringRecord,
    raw: ByteRecord,
    encoding: Encoding,
    policy: BadLinePolicy,
    stats: ScanStats,
}

impl CleanReader {
    pub fn open(source: &SourceConfig) -> BenchResult<Self> {
        let file = File::open(&source.path).map_err(|e| BenchError::SourceUnreadable {
            path: source.path.clone(),
            source: e,
        })?;
        let mut inner = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let mut raw = ByteRecord::new();
        if !inner.read_byte_record(&mut raw)? {
            return Err(BenchError::SourceUnreadable {
                path: source.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "no header row"),
            });
        }
        let mut header = StringRecord::new();
        for field in raw.iter() {
            header.push_field(&decode(field, source.encoding, 1)?);
        }
        debug!("Source header has {} columns", header.len());

        Ok(Self {
            inner,
            header,
            raw,
            encoding: source.encoding,
            policy: source.on_bad_lines,
            stats: ScanStats::default(),
        })
    }

    pub fn header(&self) -> &StringRecord {
        &self.header
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Read the next well-formed record into `out`. Returns `false` at end of input.
    pub fn read_record(&mut self, out: &mut StringRecord) -> BenchResult<bool> {
        let width = self.header.len();
        loop {
            if !self.inner.read_byte_record(&mut self.raw)? {
                return Ok(false);
            }
            let line = self.raw.position().map(|p| p.line()).unwrap_or(0);

            if self.raw.len() > width {
                match self.policy {
                    BadLinePolicy::Error => {
                        return Err(BenchError::MalformedRow {
                            line,
                            expected: width,
                            found: self.raw.len(),
                        })
                    }
                    BadLinePolicy::Warn => {
                        warn!(
                            "Skipping line {}: expected {} fields, saw {}",
                            line,
                            width,
                            self.raw.len()
                        );
                    }
                    BadLinePolicy::Skip => {}
                }
                self.stats.rows_skipped += 1;
                continue;
            }

            out.clear();
            for field in self.raw.iter() {
                out.push_field(&decode(field, self.encoding, line)?);
            }
            if out.len() < width {
                // short rows are kept, the missing trailing fields read as null
                self.stats.rows_padded += 1;
                while out.len() < width {
                    out.push_field("");
                }
            }
            self.stats.rows_kept += 1;
            return Ok(true);
        }
    }
}

/// Column names from the header row, without reading any data rows.
pub fn read_header(source: &SourceConfig) -> BenchResult<Vec<String>> {
    let reader = CleanReader::open(source)?;
    Ok(reader.header().iter().map(str::to_string).collect())
}

fn decode(bytes: &[u8], encoding: Encoding, line: u64) -> BenchResult<Cow<'_, str>> {
    match encoding {
        Encoding::Utf8 => std::str::from_utf8(bytes)
            .map(Cow::Borrowed)
            .map_err(|_| BenchError::Encoding { line }),
        Encoding::Latin1 => Ok(match std::str::from_utf8(bytes) {
            // ASCII is identical in both encodings
            Ok(s) if s.is_ascii() => Cow::Borrowed(s),
            _ => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
        }),
        Encoding::LossyUtf8 => Ok(String::from_utf8_lossy(bytes)),
    }
}

/// Clean the whole source into memory and parse it as one `DataFrame`.
///
/// The schema is inferred over every row.
pub fn read_eager(source: &SourceConfig) -> BenchResult<(DataFrame, ScanStats)> {
    let mut reader = CleanReader::open(source)?;
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(reader.header())?;

    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        writer.write_record(&record)?;
    }
    let buffer = writer
        .into_inner()
        .map_err(|e| BenchError::IoError(e.into_error()))?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(Cursor::new(buffer))
        .finish()?;
    Ok((df, reader.stats()))
}

/// Source cleaned and split into UTF-8 CSV partitions on disk.
#[derive(Debug, Clone)]
pub struct StagedSource {
    pub columns: Vec<String>,
    pub partitions: Vec<PathBuf>,
    pub stats: ScanStats,
}

/// Stream the source into partition files of roughly `partition_bytes` each.
///
/// Memory use is bounded by one record; every partition repeats the header
/// so it can be scanned on its own. At least one partition is always written.
pub fn stage_partitions(
    source: &SourceConfig,
    dir: &Path,
    partition_bytes: u64,
) -> BenchResult<StagedSource> {
    let mut reader = CleanReader::open(source)?;
    let header = reader.header().clone();

    let mut partitions = Vec::new();
    let mut writer = open_partition(dir, &header, &mut partitions)?;
    let mut written: u64 = 0;
    let mut rows_in_partition = 0usize;

    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        if written >= partition_bytes && rows_in_partition > 0 {
            writer.flush()?;
            writer = open_partition(dir, &header, &mut partitions)?;
            written = 0;
            rows_in_partition = 0;
        }
        writer.write_record(&record)?;
        written += (record.as_slice().len() + record.len()) as u64;
        rows_in_partition += 1;
    }
    writer.flush()?;

    debug!(
        "Staged {} rows into {} partition(s)",
        reader.stats().rows_kept,
        partitions.len()
    );

    Ok(StagedSource {
        columns: header.iter().map(str::to_string).collect(),
        partitions,
        stats: reader.stats(),
    })
}

fn open_partition(
    dir: &Path,
    header: &StringRecord,
    partitions: &mut Vec<PathBuf>,
) -> BenchResult<csv::Writer<File>> {
    let path = dir.join(format!("part-{:05}.csv", partitions.len()));
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(header)?;
    partitions.push(path);
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn source_at(path: &Path, encoding: Encoding, policy: BadLinePolicy) -> SourceConfig {
        SourceConfig {
            path: path.to_path_buf(),
            encoding,
            on_bad_lines: policy,
            ..Default::default()
        }
    }

    #[test]
    fn test_read_eager_shape() -> BenchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b,c\n1,2,3\n4,5,6")?;

        let (df, stats) = read_eager(&source_at(&path, Encoding::Utf8, BadLinePolicy::Warn))?;
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(stats.rows_kept, 2);
        assert_eq!(stats.rows_skipped, 0);
        Ok(())
    }

    #[test]
    fn test_long_rows_skipped_short_rows_padded() -> BenchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b,c\n1,2,3\n4,5,6,7\n8,9\n")?;

        let (df, stats) = read_eager(&source_at(&path, Encoding::Utf8, BadLinePolicy::Skip))?;
        assert_eq!(df.height(), 2);
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(stats.rows_padded, 1);
        assert_eq!(df.column("c")?.null_count(), 1);
        Ok(())
    }

    #[test]
    fn test_error_policy_aborts() -> BenchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b\n1,2\n3,4,5\n")?;

        let err = read_eager(&source_at(&path, Encoding::Utf8, BadLinePolicy::Error)).unwrap_err();
        match err {
            BenchError::MalformedRow {
                line,
                expected,
                found,
            } => {
                assert_eq!(line, 3);
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            }
            other => panic!("expected MalformedRow, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_latin1_decoding() -> BenchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data.csv");
        // "Revista Médica" with é as the single byte 0xE9
        let mut bytes = b"journal\nRevista M".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"dica\n");
        fs::write(&path, &bytes)?;

        let (df, _) = read_eager(&source_at(&path, Encoding::Latin1, BadLinePolicy::Warn))?;
        let journal = df.column("journal")?.as_materialized_series().str()?.get(0);
        assert_eq!(journal, Some("Revista Médica"));

        let err = read_eager(&source_at(&path, Encoding::Utf8, BadLinePolicy::Warn)).unwrap_err();
        assert!(matches!(err, BenchError::Encoding { line: 2 }));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let source = source_at(
            Path::new("/definitely/not/here.csv"),
            Encoding::Utf8,
            BadLinePolicy::Warn,
        );
        assert!(matches!(
            CleanReader::open(&source),
            Err(BenchError::SourceUnreadable { .. })
        ));
    }

    #[test]
    fn test_empty_file_has_no_header() -> BenchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.csv");
        fs::write(&path, "")?;
        let source = source_at(&path, Encoding::Utf8, BadLinePolicy::Warn);

        assert!(matches!(
            read_header(&source),
            Err(BenchError::SourceUnreadable { .. })
        ));
        assert!(matches!(
            read_eager(&source),
            Err(BenchError::SourceUnreadable { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_read_header_skips_rows() -> BenchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data.csv");
        // the bad row is never reached
        fs::write(&path, "a,b\n1,2,3\n")?;

        let source = source_at(&path, Encoding::Utf8, BadLinePolicy::Error);
        assert_eq!(read_header(&source)?, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_stage_partitions_splits_and_repeats_header() -> BenchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data.csv");
        let mut content = String::from("id,name\n");
        for i in 0..10 {
            content.push_str(&format!("{},row{}\n", i, i));
        }
        fs::write(&path, content)?;

        let staging = tempdir()?;
        let staged = stage_partitions(
            &source_at(&path, Encoding::Utf8, BadLinePolicy::Warn),
            staging.path(),
            16,
        )?;

        assert_eq!(staged.columns, vec!["id", "name"]);
        assert!(staged.partitions.len() > 1);
        assert_eq!(staged.stats.rows_kept, 10);

        let mut rows = 0;
        for part in &staged.partitions {
            let text = fs::read_to_string(part)?;
            let mut lines = text.lines();
            assert_eq!(lines.next(), Some("id,name"));
            rows += lines.count();
        }
        assert_eq!(rows, 10);
        Ok(())
    }

    #[test]
    fn test_stage_partitions_header_only() -> BenchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b\n")?;

        let staging = tempdir()?;
        let staged = stage_partitions(
            &source_at(&path, Encoding::Utf8, BadLinePolicy::Warn),
            staging.path(),
            1024,
        )?;
        assert_eq!(staged.partitions.len(), 1);
        assert_eq!(staged.stats.rows_kept, 0);
        Ok(())
    }
}
