use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};

/// Decimal megabyte, matching the store's byte accounting.
pub const MEGABYTE: u64 = 1_000_000;

/// Produces `size_mb` megabytes of fresh random bytes.
///
/// Random payloads are incompressible, so converter and compiler timings are
/// not flattered by redundant input. An unavailable entropy source fails the
/// iteration.
pub fn generate(size_mb: u64) -> Result<Vec<u8>> {
  let mut payload = vec![0u8; (size_mb * MEGABYTE) as usize];
  OsRng.try_fill_bytes(&mut payload).context("entropy source")?;

  Ok(payload)
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn payload_has_exact_size() {
    assert_eq!(generate(1).unwrap().len(), 1_000_000);
    assert_eq!(generate(3).unwrap().len(), 3_000_000);
  }

  #[test]
  fn payloads_are_fresh() {
    assert_ne!(generate(1).unwrap(), generate(1).unwrap());
  }
}
