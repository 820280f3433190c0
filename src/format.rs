use std::{fmt::Write, path::Path};

use anyhow::{Context, Result};

use crate::{
  stats::{self, AggregateEntry},
  store::ResultsStore,
};

const RATE_WIDTH: usize = 10;
const UNIT: &str = "MB/s";

/// Renders the throughput table: one row per entry, non-empty sections in
/// fixed category order separated by a blank line. Rendering the same
/// entries twice yields identical text.
pub fn format(entries: &[AggregateEntry]) -> Result<String> {
  let width = entries.iter().map(|entry| entry.label.len()).max().unwrap_or(0);

  let mut blocks = Vec::new();
  for section in stats::sections(entries) {
    if section.is_empty() {
      continue;
    }

    let mut block = String::new();
    for entry in section {
      writeln!(
        block,
        "{label:<width$}  {rate:>RATE_WIDTH$.2} {UNIT}",
        label = entry.label,
        rate = entry.mb_per_s,
      )?;
    }

    blocks.push(block);
  }

  Ok(blocks.join("\n"))
}

/// Reads a results store and writes its report to stderr. The report shares
/// the diagnostic stream so that stdout stays free for pipeline output.
pub fn report<P: AsRef<Path>>(path: P) -> Result<()> {
  let records = ResultsStore::read_all(path).context("read store")?;
  eprint!("{}", format(&stats::aggregate(&records)).context("format")?);

  Ok(())
}
