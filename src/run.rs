use std::{
  io::{self, Write},
  path::PathBuf,
  process::{Child, Command, ExitStatus, Stdio},
  time::{Duration, Instant},
};

use anyhow::{Context, Result};

use crate::ext::ChildExt;

/// One external program invocation in a pipeline.
#[derive(Debug, Clone)]
pub struct Stage {
  pub program: PathBuf,
  pub args: Vec<String>,
}

impl Stage {
  pub fn new<P: Into<PathBuf>>(program: P, args: &[&str]) -> Self {
    Self {
      program: program.into(),
      args: args.iter().map(|arg| arg.to_string()).collect(),
    }
  }

  fn command(&self) -> Command {
    let mut command = Command::new(&self.program);
    command.args(&self.args);

    command
  }
}

/// A labeled one- or two-stage pipeline. Stage one converts the payload on
/// its stdin; stage two, if present, compiles stage one's output.
#[derive(Debug, Clone)]
pub struct Pipeline {
  pub label: String,
  pub first: Stage,
  pub second: Option<Stage>,
}

/// Wall-clock measurement of one pipeline invocation, rounded to millisecond
/// resolution. `status` is the first failing stage's exit status, or the
/// final stage's on success.
#[derive(Debug)]
pub struct Timing {
  pub elapsed: Duration,
  pub status: ExitStatus,
}

/// Runs a pipeline over `input` and measures its wall-clock time.
///
/// The clock starts immediately before the first spawn and stops immediately
/// after the last stage is reaped. The final stage's stdout and every
/// stage's stderr are inherited from the caller, never proxied through the
/// harness, so outer redirection sees the pipeline's streams untouched and
/// the measurement cannot reorder or buffer them.
///
/// A stage that exits non-zero still yields a `Timing`; only a failure to
/// spawn (or a timeout) is an error, in which case no elapsed time exists.
pub fn run_timed(pipeline: &Pipeline, input: &[u8], timeout: Option<Duration>) -> Result<Timing> {
  let start = Instant::now();

  let mut first = pipeline
    .first
    .command()
    .stdin(Stdio::piped())
    .stdout(if pipeline.second.is_some() {
      Stdio::piped()
    } else {
      Stdio::inherit()
    })
    .spawn()
    .with_context(|| format!("spawn {:?}", pipeline.first.program))?;

  let second = match &pipeline.second {
    Some(stage) => {
      let stdout = first.stdout.take().context("first stage stdout")?;

      match stage.command().stdin(Stdio::from(stdout)).spawn() {
        Ok(child) => Some(child),
        Err(err) => {
          let _ = first.kill();
          let _ = first.wait();

          return Err(err).with_context(|| format!("spawn {:?}", stage.program));
        }
      }
    }
    None => None,
  };

  let mut stdin = first.stdin.take().context("first stage stdin")?;

  // The payload write can outlast a stage that never reads its stdin, so it
  // runs beside the timeout-bounded wait instead of before it; killing the
  // children closes the pipe, which unblocks the writer with a broken pipe.
  let (elapsed, status) = std::thread::scope(|scope| {
    let writer = scope.spawn(move || stdin.write_all(input));

    let status = wait_pipeline(&pipeline.label, first, second, timeout);
    let elapsed = start.elapsed();

    let write_result = match writer.join() {
      Ok(result) => result,
      Err(panic) => std::panic::resume_unwind(panic),
    };
    let status = status?;

    // A stage that exits early (or a dead stage two) closes the pipe under
    // us; the pipeline's own exit status reports that, not the write.
    if let Err(err) = write_result {
      if err.kind() != io::ErrorKind::BrokenPipe {
        return Err(err).context("write payload");
      }
    }

    Ok((elapsed, status))
  })?;

  let millis = (elapsed.as_secs_f64() * 1_000.0).round() as u64;

  Ok(Timing {
    elapsed: Duration::from_millis(millis),
    status,
  })
}

fn wait_pipeline(label: &str, first: Child, second: Option<Child>, timeout: Option<Duration>) -> Result<ExitStatus> {
  let Some(first_status) = wait_stage(first, timeout)? else {
    if let Some(mut child) = second {
      let _ = child.kill();
      let _ = child.wait();
    }

    anyhow::bail!("{label} timed out");
  };

  let status = match second {
    Some(child) => {
      let Some(second_status) = wait_stage(child, timeout)? else {
        anyhow::bail!("{label} timed out");
      };

      if first_status.success() {
        second_status
      } else {
        first_status
      }
    }
    None => first_status,
  };

  Ok(status)
}

fn wait_stage(mut child: Child, timeout: Option<Duration>) -> Result<Option<ExitStatus>> {
  match timeout {
    Some(limit) => child.wait_deadline(limit),
    None => child.wait().map(Some).context("wait"),
  }
}
