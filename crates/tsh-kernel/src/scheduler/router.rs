//! Signal Router: forward terminal control signals to the foreground group.

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::JobTable;
use crate::process::ProcessControl;

/// Send `signal` to the whole process group of the foreground job.
///
/// Returns the group signalled, or `None` when there is no foreground job and
/// the signal is swallowed.
pub fn forward_to_foreground(jobs: &JobTable, process: &dyn ProcessControl, signal: Signal) -> Option<Pid> {
    let Some(pgid) = jobs.foreground_pid() else {
        debug!(?signal, "no foreground job, signal swallowed");
        return None;
    };

    match process.signal_group(pgid, signal) {
        Ok(()) => debug!(pgid = %pgid, ?signal, "forwarded to foreground group"),
        // Already gone; the reaper will pick it up.
        Err(Errno::ESRCH) => debug!(pgid = %pgid, ?signal, "foreground group vanished"),
        Err(e) => warn!(pgid = %pgid, ?signal, error = %e, "failed to forward signal"),
    }
    Some(pgid)
}
