//! Process Launcher: create one child and register it, atomically.

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::{info, warn};

use super::JobTable;
use crate::error::{JobError, KernelResult};
use crate::process::ProcessControl;
use crate::signals::SignalMask;
use tsh_types::{CommandSpec, JobId, JobState};

/// A freshly registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launched {
    pub pid: Pid,
    pub id: JobId,
    pub state: JobState,
}

/// Start `spec` and track it under `command_line`.
///
/// A free slot is confirmed before anything is created, so a full table never
/// leaves an untracked child behind. Fork failure is returned as a fatal
/// [`KernelError::Fork`](crate::KernelError::Fork).
pub fn launch(
    jobs: &mut JobTable,
    process: &dyn ProcessControl,
    spec: &CommandSpec,
    command_line: &str,
) -> KernelResult<Launched> {
    if jobs.is_full() {
        return Err(JobError::TableFull.into());
    }
    let state = if spec.background {
        JobState::Background
    } else {
        JobState::Foreground
    };
    if state == JobState::Foreground
        && let Some(fg) = jobs.foreground_pid()
    {
        return Err(JobError::ForegroundBusy(fg.as_raw()).into());
    }

    let mask = SignalMask::block_job_control()?;
    let pid = process.spawn(spec)?;
    let id = match jobs.add(pid, state, command_line) {
        Ok(id) => id,
        Err(e) => {
            warn!(pid = %pid, error = %e, "could not track child, killing it");
            let _ = process.signal_group(pid, Signal::SIGKILL);
            return Err(e.into());
        }
    };
    drop(mask);

    info!(job = %id, pid = %pid, ?state, command = command_line, "launched");
    Ok(Launched { pid, id, state })
}
