use std::{
  process::{Child, ExitStatus},
  time::Duration,
};

use anyhow::{Context, Result};
use wait_timeout::ChildExt as WaitExt;

#[extend::ext(name = ExitStatusExt)]
pub impl ExitStatus {
  fn check_success(&self) -> Result<()> {
    if !self.success() {
      anyhow::bail!("exited with non-zero status {self}");
    }

    Ok(())
  }
}

#[extend::ext(name = ChildExt)]
pub impl Child {
  /// Waits for the child with a deadline. On timeout the child is killed and
  /// reaped, and `Ok(None)` is returned; otherwise the exit status is
  /// returned as-is.
  fn wait_deadline(&mut self, limit: Duration) -> Result<Option<ExitStatus>> {
    let Some(status) = self.wait_timeout(limit).context("wait")? else {
      self.kill().context("kill after timeout")?;
      self.wait().context("reap after kill")?;

      return Ok(None);
    };

    Ok(Some(status))
  }
}
