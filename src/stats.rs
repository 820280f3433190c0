use std::collections::HashMap;

use crate::{store::BenchmarkRecord, workload};

/// Compiler-tool markers, in report section order. A label is categorized by
/// substring containment against these.
pub const MARKERS: [&str; 3] = ["gcc", "clang", "ld"];

/// Throughput for one label. Derived in full from the store on every report,
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateEntry {
  pub label: String,
  pub mb_per_s: f64,
}

/// Collapses records into one throughput entry per label, in first-seen
/// label order.
///
/// Throughput is a ratio of sums: total bytes over total elapsed seconds. A
/// label measured twice counts both elapsed times against both byte counts
/// rather than averaging two per-run rates, so uneven run counts per label do
/// not skew the result. Labels whose total elapsed time is zero have no
/// defined rate and are dropped.
pub fn aggregate(records: &[BenchmarkRecord]) -> Vec<AggregateEntry> {
  let mut labels: Vec<&str> = Vec::new();
  let mut sums: HashMap<&str, (u64, f64)> = HashMap::new();

  for record in records {
    if !sums.contains_key(record.label.as_str()) {
      labels.push(&record.label);
    }

    let (bytes, secs) = sums.entry(&record.label).or_insert((0, 0.0));
    *bytes += record.bytes;
    *secs += record.secs;
  }

  let mut entries = Vec::with_capacity(labels.len());
  for label in labels {
    let (bytes, secs) = sums[label];
    if secs > 0.0 {
      entries.push(AggregateEntry {
        label: label.to_string(),
        mb_per_s: bytes as f64 / workload::MEGABYTE as f64 / secs,
      });
    }
  }

  entries
}

/// Buckets entries into the four report sections: labels matching none of
/// the markers first, then one section per marker. Marker sections are
/// independent containment filters, so a label naming two tools appears
/// under both. Each section is sorted ascending by throughput; the sort is
/// stable, so ties keep first-seen order.
pub fn sections(entries: &[AggregateEntry]) -> [Vec<&AggregateEntry>; 4] {
  let none = entries
    .iter()
    .filter(|entry| MARKERS.iter().all(|marker| !entry.label.contains(marker)))
    .collect();

  let [gcc, clang, ld] = MARKERS.map(|marker| {
    entries
      .iter()
      .filter(|entry| entry.label.contains(marker))
      .collect::<Vec<_>>()
  });

  let mut sections = [none, gcc, clang, ld];
  for section in &mut sections {
    section.sort_by(|a, b| a.mb_per_s.total_cmp(&b.mb_per_s));
  }

  sections
}
