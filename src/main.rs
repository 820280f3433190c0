mod bench;
mod ext;
mod format;
mod run;
mod stats;
mod store;
mod workload;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use self::bench::{Bench, Config};

#[derive(Parser)]
struct Args {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run benchmark iterations until interrupted, then print the report.
  Run {
    /// Payload size per iteration, in megabytes.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    size_mb: u64,
    /// Converter executable under test.
    #[arg(long, default_value = "bin2c")]
    converter: PathBuf,
    /// Alternate converter executables to include as extra comparisons.
    #[arg(long = "alt-converter", value_delimiter = ' ')]
    alt_converters: Vec<PathBuf>,
    /// Skip the `xxd -i` baseline.
    #[arg(long)]
    skip_xxd: bool,
    /// Skip the `ld` binary-to-object comparison.
    #[arg(long)]
    skip_ld: bool,
    /// Skip all compiler pairings, timing raw conversion only.
    #[arg(long)]
    skip_compilers: bool,
    /// Use only this C compiler for the compile-stage comparisons.
    #[arg(long)]
    cc: Option<String>,
    /// Append to an existing results file instead of a session-owned
    /// temporary one; never deleted by the harness.
    #[arg(long)]
    results_file: Option<PathBuf>,
    /// Kill any pipeline stage running longer than this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
  },
  /// Print the throughput report for an existing results file.
  Report {
    #[arg(long)]
    results_file: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  match Args::parse().command {
    Command::Run {
      size_mb,
      converter,
      alt_converters,
      skip_xxd,
      skip_ld,
      skip_compilers,
      cc,
      results_file,
      timeout_secs,
    } => {
      let config = Config {
        size_mb,
        converter,
        alt_converters,
        skip_xxd,
        skip_ld,
        skip_compilers,
        cc,
        results_file,
        timeout_secs,
      };

      Bench::new(config).context("Bench::new")?.run().context("run")
    }
    Command::Report { results_file } => format::report(&results_file).context("report"),
  }
}
