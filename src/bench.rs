use std::{
  path::{Path, PathBuf},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::Duration,
};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::{
  ext::ExitStatusExt,
  format,
  run::{self, Pipeline, Stage},
  store::{BenchmarkRecord, ResultsStore},
  workload,
};

/// C compilers paired with each converter when `--cc` does not restrict the
/// set.
const DEFAULT_COMPILERS: [&str; 2] = ["gcc", "clang"];

const RESULTS_FILE_NAME: &str = "results";

/// Session configuration, threaded explicitly through every component.
#[derive(Debug, Clone, Default)]
pub struct Config {
  /// Payload size per iteration, in megabytes.
  pub size_mb: u64,
  /// Converter under test.
  pub converter: PathBuf,
  /// Alternate converter executables included as extra comparisons.
  pub alt_converters: Vec<PathBuf>,
  /// Omits the `xxd -i` baseline from the run set.
  pub skip_xxd: bool,
  /// Omits the `ld` binary-to-object comparison.
  pub skip_ld: bool,
  /// Omits every compiler pairing, timing raw conversion only.
  pub skip_compilers: bool,
  /// Restricts compiler pairings to one compiler.
  pub cc: Option<String>,
  /// Reuses an existing store instead of creating a session-owned one.
  pub results_file: Option<PathBuf>,
  /// Kills any pipeline stage running longer than this.
  pub timeout_secs: Option<u64>,
}

/// One benchmarking session: a results store, the run set derived from the
/// configuration, and the cancellation flag that ends the loop.
pub struct Bench {
  config: Config,
  store: ResultsStore,
  pipelines: Vec<Pipeline>,
  /// Present only when this session created the results location and
  /// therefore owns its deletion.
  tempdir: Option<TempDir>,
  cancelled: Arc<AtomicBool>,
}

impl Bench {
  pub fn new(config: Config) -> Result<Self> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)).context("set signal handler")?;

    Self::with_cancellation(config, cancelled)
  }

  /// Construction minus the process-global signal handler, so the lifecycle
  /// can be driven with a caller-controlled flag.
  fn with_cancellation(config: Config, cancelled: Arc<AtomicBool>) -> Result<Self> {
    let (store, tempdir) = match &config.results_file {
      Some(path) => (ResultsStore::open(path).context("open results store")?, None),
      None => {
        let tempdir = TempDir::with_prefix("embed-bench-").context("tempdir")?;
        let store = ResultsStore::open(tempdir.path().join(RESULTS_FILE_NAME)).context("create results store")?;

        (store, Some(tempdir))
      }
    };

    let pipelines = pipelines(&config);

    Ok(Self {
      config,
      store,
      pipelines,
      tempdir,
      cancelled,
    })
  }

  /// Drives measurement cycles until cancelled, then reports exactly once
  /// and cleans up. Cleanup also runs when an iteration fails fatally.
  pub fn run(mut self) -> Result<()> {
    info!(
      results = %self.store.path().display(),
      variants = self.pipelines.len(),
      "benchmarking until interrupted"
    );

    let outcome = self.run_loop();
    self.finish();

    outcome
  }

  fn run_loop(&mut self) -> Result<()> {
    let timeout = self.config.timeout_secs.map(Duration::from_secs);

    while !self.cancelled.load(Ordering::SeqCst) {
      let payload = workload::generate(self.config.size_mb).context("generate workload")?;

      for pipeline in &self.pipelines {
        // Cancellation is observed between runs; the in-flight run, if any,
        // is simply never recorded.
        if self.cancelled.load(Ordering::SeqCst) {
          return Ok(());
        }

        debug!(label = %pipeline.label, "running");

        let timing = match run::run_timed(pipeline, &payload, timeout) {
          Ok(timing) => timing,
          Err(err) => {
            warn!(label = %pipeline.label, error = %err, "pipeline failed");
            continue;
          }
        };

        if let Err(err) = timing.status.check_success() {
          warn!(
            label = %pipeline.label,
            elapsed_ms = timing.elapsed.as_millis(),
            error = %err,
            "pipeline exited non-zero, not recording"
          );
          continue;
        }

        let record = BenchmarkRecord {
          label: pipeline.label.clone(),
          bytes: payload.len() as u64,
          secs: timing.elapsed.as_secs_f64(),
        };
        self.store.append(&record).context("append record")?;
      }
    }

    Ok(())
  }

  /// Reports once from a session-owned store, then deletes its location. An
  /// externally supplied store is left untouched; the `report` subcommand
  /// reads it on demand. Failures here are logged, never escalated.
  fn finish(self) {
    let Some(tempdir) = self.tempdir else { return };

    if let Err(err) = format::report(self.store.path()) {
      warn!(error = %err, "report failed");
    }

    if let Err(err) = tempdir.close() {
      warn!(error = %err, "could not delete session results location");
    }
  }
}

/// Builds the labeled run set for one iteration, in a fixed order: the
/// baseline converter, the converters under test, each converter paired with
/// each selected compiler, and the linker's direct binary-to-object path.
fn pipelines(config: &Config) -> Vec<Pipeline> {
  let mut converters: Vec<(String, Stage)> = Vec::new();

  if !config.skip_xxd {
    converters.push(("xxd".to_string(), Stage::new("xxd", &["-i"])));
  }
  for path in std::iter::once(&config.converter).chain(&config.alt_converters) {
    converters.push((label_for(path), Stage::new(path.clone(), &[])));
  }

  let mut pipelines: Vec<Pipeline> = converters
    .iter()
    .map(|(label, stage)| Pipeline {
      label: label.clone(),
      first: stage.clone(),
      second: None,
    })
    .collect();

  if !config.skip_compilers {
    for cc in compilers(config) {
      for (label, stage) in &converters {
        pipelines.push(Pipeline {
          label: format!("{label}+{cc}"),
          first: stage.clone(),
          second: Some(Stage::new(cc.as_str(), &["-x", "c", "-c", "-o", "/dev/null", "-"])),
        });
      }
    }
  }

  // `ld -r -b binary` only exists as a comparison target on ELF platforms.
  if cfg!(target_os = "linux") && !config.skip_ld {
    pipelines.push(Pipeline {
      label: "ld".to_string(),
      first: Stage::new("ld", &["-r", "-b", "binary", "-o", "/dev/null", "/dev/stdin"]),
      second: None,
    });
  }

  pipelines
}

fn compilers(config: &Config) -> Vec<String> {
  match &config.cc {
    Some(cc) => vec![cc.clone()],
    None => DEFAULT_COMPILERS.iter().map(|cc| cc.to_string()).collect(),
  }
}

/// Store lines are whitespace-delimited, so labels never contain whitespace.
fn label_for(path: &Path) -> String {
  let stem = path
    .file_stem()
    .map_or_else(|| path.to_string_lossy().into_owned(), |stem| stem.to_string_lossy().into_owned());

  stem.replace(char::is_whitespace, "_")
}

#[cfg(test)]
mod test {
  use super::*;

  fn config() -> Config {
    Config {
      size_mb: 1,
      converter: PathBuf::from("bin2c"),
      ..Config::default()
    }
  }

  fn labels(config: &Config) -> Vec<String> {
    pipelines(config).into_iter().map(|pipeline| pipeline.label).collect()
  }

  #[test]
  fn default_run_set_covers_all_variants() {
    let labels = labels(&config());

    assert_eq!(
      labels,
      ["xxd", "bin2c", "xxd+gcc", "bin2c+gcc", "xxd+clang", "bin2c+clang", "ld"]
    );
  }

  #[test]
  fn skip_compilers_prunes_every_paired_label() {
    let labels = labels(&Config {
      skip_compilers: true,
      ..config()
    });

    assert!(labels.iter().all(|label| !label.contains('+')));
  }

  #[test]
  fn skip_xxd_removes_the_baseline() {
    let labels = labels(&Config {
      skip_xxd: true,
      ..config()
    });

    assert!(labels.iter().all(|label| !label.starts_with("xxd")));
  }

  #[test]
  fn skip_ld_removes_the_linker_comparison() {
    let labels = labels(&Config {
      skip_ld: true,
      ..config()
    });

    assert!(!labels.contains(&"ld".to_string()));
  }

  #[test]
  fn cc_restricts_the_compiler_set() {
    let labels = labels(&Config {
      cc: Some("tcc".to_string()),
      ..config()
    });

    assert!(labels.contains(&"bin2c+tcc".to_string()));
    assert!(labels.iter().all(|label| !label.contains("+gcc") && !label.contains("+clang")));
  }

  #[test]
  fn alt_converters_are_extra_variants() {
    let labels = labels(&Config {
      alt_converters: vec![PathBuf::from("/opt/tools/fast bin2c")],
      ..config()
    });

    assert!(labels.contains(&"fast_bin2c".to_string()));
  }

  fn cancelled_bench(config: Config) -> Bench {
    Bench::with_cancellation(config, Arc::new(AtomicBool::new(true))).unwrap()
  }

  #[test]
  fn session_owned_store_is_deleted_on_cleanup() {
    let bench = cancelled_bench(config());
    let path = bench.store.path().to_path_buf();
    assert!(path.exists());

    bench.run().unwrap();

    assert!(!path.exists());
    assert!(!path.parent().unwrap().exists());
  }

  #[test]
  fn caller_supplied_store_survives_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results");
    std::fs::write(&path, "xxd 1000000 0.500\n").unwrap();

    let bench = cancelled_bench(Config {
      results_file: Some(path.clone()),
      ..config()
    });
    bench.run().unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "xxd 1000000 0.500\n");
  }
}
