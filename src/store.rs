use std::{
  fs::{File, OpenOptions},
  io::{BufRead, BufReader, Write},
  path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::debug;

/// One timed pipeline invocation. Immutable once created; appended to the
/// store exactly once and never rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRecord {
  pub label: String,
  pub bytes: u64,
  pub secs: f64,
}

impl BenchmarkRecord {
  /// Parses one store line: `label bytes secs`, whitespace-separated. Lines
  /// that do not carry three well-formed fields are not records.
  fn parse(line: &str) -> Option<Self> {
    let mut fields = line.split_whitespace();

    let label = fields.next()?.to_string();
    let bytes = fields.next()?.parse().ok()?;
    let secs = fields.next()?.parse().ok()?;

    Some(Self { label, bytes, secs })
  }
}

/// Append-only, line-oriented store of benchmark records. A single writer is
/// active for the lifetime of a session; readers only run after it stops.
pub struct ResultsStore {
  path: PathBuf,
  file: File,
}

impl ResultsStore {
  /// Opens `path` for appending, creating it if absent. Existing records are
  /// preserved.
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&path)
      .with_context(|| format!("open {path:?}"))?;

    Ok(Self { path, file })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Appends one record and syncs it to disk before returning, so a crash
  /// after this call never loses the record.
  pub fn append(&mut self, record: &BenchmarkRecord) -> Result<()> {
    writeln!(self.file, "{} {} {:.3}", record.label, record.bytes, record.secs).context("write record")?;
    self.file.flush().context("flush")?;
    self.file.sync_data().context("sync")?;

    Ok(())
  }

  /// Reads every record from a store file. Malformed lines are skipped rather
  /// than aborting the report.
  pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<BenchmarkRecord>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {path:?}"))?;

    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
      let line = line.context("read line")?;

      match BenchmarkRecord::parse(&line) {
        Some(record) => records.push(record),
        None if line.trim().is_empty() => {}
        None => debug!(line = %line, "skipping malformed record line"),
      }
    }

    Ok(records)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn record(label: &str, bytes: u64, secs: f64) -> BenchmarkRecord {
    BenchmarkRecord {
      label: label.to_string(),
      bytes,
      secs,
    }
  }

  #[test]
  fn append_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results");

    let mut store = ResultsStore::open(&path).unwrap();
    store.append(&record("xxd", 1_000_000, 0.5)).unwrap();
    store.append(&record("bin2c+gcc", 2_000_000, 1.234)).unwrap();

    let records = ResultsStore::read_all(&path).unwrap();
    assert_eq!(records, vec![record("xxd", 1_000_000, 0.5), record("bin2c+gcc", 2_000_000, 1.234)]);
  }

  #[test]
  fn reopen_appends_instead_of_truncating() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results");

    ResultsStore::open(&path).unwrap().append(&record("a", 1, 0.1)).unwrap();
    ResultsStore::open(&path).unwrap().append(&record("b", 2, 0.2)).unwrap();

    let records = ResultsStore::read_all(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].label, "a");
    assert_eq!(records[1].label, "b");
  }

  #[test]
  fn malformed_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results");

    std::fs::write(
      &path,
      "xxd 1000000 0.500\n\
       truncated 42\n\
       notanumber x y\n\
       \n\
       ld 1000000 0.250\n",
    )
    .unwrap();

    let records = ResultsStore::read_all(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].label, "xxd");
    assert_eq!(records[1].label, "ld");
  }

  #[test]
  fn elapsed_is_persisted_with_millisecond_precision() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results");

    ResultsStore::open(&path).unwrap().append(&record("a", 1_000_000, 0.123456)).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, "a 1000000 0.123\n");
  }
}
