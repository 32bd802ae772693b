//! Removing a domain and everything it owns
//!
//! Teardown is a fixed sequence of independent steps. Each step may find
//! nothing to do (the domain is already gone, there never was a pool of
//! that name); that is recorded and the sequence carries on. Teardown as a
//! whole never fails.

use std::fmt;

use strum::IntoEnumIterator;
use tracing::instrument;

use crate::cmdext::CommandLogExt;
use crate::tools::Toolchain;
use crate::workspace::VmWorkspace;

/// One step of the teardown sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum TeardownStep {
    Destroy,
    PoolDestroy,
    PoolUndefine,
    Undefine,
    RemoveWorkspace,
}

/// Result of a single teardown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Skipped(String),
}

/// What happened during a teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub name: String,
    pub steps: Vec<(TeardownStep, StepOutcome)>,
}

impl TeardownReport {
    /// Whether any step actually removed something.
    pub fn removed_anything(&self) -> bool {
        self.steps.iter().any(|(_, o)| *o == StepOutcome::Done)
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (step, outcome) in &self.steps {
            match outcome {
                StepOutcome::Done => writeln!(f, "  {step}: done")?,
                StepOutcome::Skipped(why) => writeln!(f, "  {step}: skipped ({why})")?,
            }
        }
        Ok(())
    }
}

fn virsh_step(tools: &Toolchain, args: &[&str]) -> StepOutcome {
    match tools.virsh().args(args).run_capture() {
        Ok(o) if o.status.success() => StepOutcome::Done,
        Ok(o) => {
            let stderr = String::from_utf8_lossy(&o.stderr);
            let why = stderr.lines().next().unwrap_or("").trim();
            if why.is_empty() {
                StepOutcome::Skipped(o.status.to_string())
            } else {
                StepOutcome::Skipped(why.to_owned())
            }
        }
        Err(e) => StepOutcome::Skipped(format!("{e:#}")),
    }
}

fn remove_workspace(ws: &VmWorkspace) -> StepOutcome {
    match std::fs::remove_dir_all(ws.dir()) {
        Ok(()) => StepOutcome::Done,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            StepOutcome::Skipped(format!("{} does not exist", ws.dir()))
        }
        Err(e) => StepOutcome::Skipped(format!("Removing {}: {e}", ws.dir())),
    }
}

/// Force off and undefine the domain `name`, its same-named storage pool
/// if any, and remove its workspace directory.
#[instrument(skip(tools, ws))]
pub fn teardown(tools: &Toolchain, name: &str, ws: &VmWorkspace) -> TeardownReport {
    let mut steps = Vec::new();
    for step in TeardownStep::iter() {
        let outcome = match step {
            TeardownStep::Destroy => virsh_step(tools, &["destroy", name]),
            TeardownStep::PoolDestroy => virsh_step(tools, &["pool-destroy", name]),
            TeardownStep::PoolUndefine => virsh_step(tools, &["pool-undefine", name]),
            TeardownStep::Undefine => virsh_step(tools, &["undefine", name]),
            TeardownStep::RemoveWorkspace => remove_workspace(ws),
        };
        match &outcome {
            StepOutcome::Done => tracing::info!("{step} {name}: done"),
            StepOutcome::Skipped(why) => tracing::debug!("{step} {name}: skipped: {why}"),
        }
        steps.push((step, outcome));
    }
    TeardownReport {
        name: name.to_owned(),
        steps,
    }
}
