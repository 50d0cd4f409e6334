//! Reaper: drain every reapable child after a child-state-change notification.
//!
//! Notifications coalesce, so one call loops until no child is left to
//! collect. Each PID is resolved through the table; background jobs are
//! reaped exactly like the foreground one.

use std::fmt;

use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use tracing::{debug, trace};

use super::JobTable;
use crate::error::KernelResult;
use crate::process::ProcessControl;
use tsh_types::{JobId, JobState};

/// A user-facing report produced while reaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobNotice {
    Terminated { id: JobId, pid: Pid, signal: i32 },
    Stopped { id: JobId, pid: Pid, signal: i32 },
}

impl fmt::Display for JobNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobNotice::Terminated { id, pid, signal } => {
                write!(f, "Job [{}] ({}) terminated by signal {}", id, pid, signal)
            }
            JobNotice::Stopped { id, pid, signal } => {
                write!(f, "Job [{}] ({}) stopped by signal {}", id, pid, signal)
            }
        }
    }
}

/// Collect all pending child state changes and apply them to `jobs`.
pub fn reap(jobs: &mut JobTable, process: &dyn ProcessControl) -> KernelResult<Vec<JobNotice>> {
    let mut notices = Vec::new();

    while let Some(status) = process.try_wait()? {
        match status {
            WaitStatus::Exited(pid, code) => {
                let tracked = jobs.remove(pid);
                debug!(pid = %pid, code, tracked, "child exited");
            }
            WaitStatus::Signaled(pid, signal, _) => {
                let Some(id) = jobs.find_by_pid(pid).map(|job| job.id()) else {
                    debug!(pid = %pid, ?signal, "untracked child killed");
                    continue;
                };
                jobs.remove(pid);
                notices.push(JobNotice::Terminated {
                    id,
                    pid,
                    signal: signal as i32,
                });
            }
            WaitStatus::Stopped(pid, signal) => {
                let Some(id) = jobs.find_by_pid(pid).map(|job| job.id()) else {
                    debug!(pid = %pid, ?signal, "untracked child stopped");
                    continue;
                };
                if jobs.set_state(pid, JobState::Stopped).is_ok() {
                    notices.push(JobNotice::Stopped {
                        id,
                        pid,
                        signal: signal as i32,
                    });
                }
            }
            other => trace!(?other, "ignoring wait status"),
        }
    }

    Ok(notices)
}
