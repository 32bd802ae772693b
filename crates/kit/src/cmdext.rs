//! Running external commands whose output belongs in the VM log
//!
//! Plain `run`/`run_get_string` come from [`bootc_utils::CommandRunExt`];
//! this adds the two shapes that crate doesn't cover.

use std::fs::File;
use std::process::{Command, Output, Stdio};

use bootc_utils::CommandRunExt;
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;

/// Extension methods for [`Command`].
pub trait CommandLogExt {
    /// Run to completion with stdout and stderr appended to `log`,
    /// failing on a non-zero exit.
    fn run_logged(&mut self, log: &File) -> Result<()>;

    /// Run to completion capturing all output, without checking the exit status.
    fn run_capture(&mut self) -> Result<Output>;
}

fn spawn_context(c: &Command) -> String {
    format!("Spawning {}", c.get_program().to_string_lossy())
}

impl CommandLogExt for Command {
    fn run_logged(&mut self, log: &File) -> Result<()> {
        let stdout = log.try_clone().context("Duplicating log file handle")?;
        let stderr = log.try_clone().context("Duplicating log file handle")?;
        tracing::debug!("exec: {}", self.to_string_pretty());
        let st = self
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .wrap_err_with(|| spawn_context(self))?;
        if !st.success() {
            return Err(eyre!("{} failed: {st}", self.to_string_pretty()));
        }
        Ok(())
    }

    fn run_capture(&mut self) -> Result<Output> {
        tracing::debug!("exec: {}", self.to_string_pretty());
        self.stdin(Stdio::null())
            .output()
            .wrap_err_with(|| spawn_context(self))
    }
}
