//! Process-control seam: the OS facilities the job-control core needs.
//!
//! The core never calls `fork`, `killpg` or `waitpid` directly; it goes
//! through [`ProcessControl`] so the scheduler can be exercised against a
//! scripted implementation in tests.
//!
//! ```text
//! Launcher ──spawn──────────┐
//! Router   ──signal_group───┼──▶ dyn ProcessControl ──▶ NixProcess (fork/exec, killpg, waitpid)
//! Reaper   ──try_wait───────┘                       └─▶ MockProcess (tests)
//! ```

mod exec;

#[cfg(test)]
pub mod testing;

#[cfg(test)]
pub use testing::{MockHandle, MockProcess};

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork, pipe, setpgid};
use tracing::debug;

use crate::error::{KernelError, KernelResult};
use exec::PreparedExec;
use tsh_types::CommandSpec;

/// OS process facilities used by the scheduler.
pub trait ProcessControl: Send {
    /// Create one child per stage of `spec`, all in a new process group whose
    /// ID is the first stage's PID, and return that PID. Exec failure is
    /// confined to the child.
    fn spawn(&self, spec: &CommandSpec) -> KernelResult<Pid>;

    /// Deliver `signal` to every process in group `pgid`.
    fn signal_group(&self, pgid: Pid, signal: Signal) -> nix::Result<()>;

    /// Collect one pending state change from any child, without blocking.
    /// Reports stopped children too. `None` when nothing is reapable.
    fn try_wait(&self) -> KernelResult<Option<WaitStatus>>;
}

/// Production implementation over `nix`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NixProcess;

impl NixProcess {
    /// Fork one stage. The parent also moves the child into its group, so the
    /// group exists before either side proceeds. EACCES means the child
    /// already exec'd.
    fn fork_stage(prepared: &PreparedExec) -> KernelResult<Pid> {
        // SAFETY: the child branch only calls async-signal-safe functions on
        // data prepared before the fork, then execs or exits.
        match unsafe { fork() }.map_err(KernelError::Fork)? {
            ForkResult::Child => prepared.run_child(),
            ForkResult::Parent { child } => {
                let pgid = prepared.group().unwrap_or(child);
                if let Err(e) = setpgid(child, pgid) {
                    debug!(pid = %child, pgid = %pgid, error = %e, "parent setpgid");
                }
                Ok(child)
            }
        }
    }
}

impl ProcessControl for NixProcess {
    fn spawn(&self, spec: &CommandSpec) -> KernelResult<Pid> {
        let path_var = std::env::var("PATH").unwrap_or_default();
        let mut leader = PreparedExec::new(spec, &path_var);
        let mut followers: Vec<PreparedExec> = spec
            .pipeline
            .iter()
            .map(|stage| PreparedExec::new(stage, &path_var))
            .collect();

        // pipes[i] connects stage i to stage i + 1. The parent's copies
        // close when `pipes` drops, after every stage is forked.
        let pipes = followers
            .iter()
            .map(|_| pipe().map_err(KernelError::Pipe))
            .collect::<KernelResult<Vec<(OwnedFd, OwnedFd)>>>()?;
        let pipe_fds: Vec<RawFd> = pipes
            .iter()
            .flat_map(|(read, write)| [read.as_raw_fd(), write.as_raw_fd()])
            .collect();
        let write_end = |i: usize| pipes.get(i).map(|(_, write)| write.as_raw_fd());
        let read_end = |i: usize| pipes.get(i).map(|(read, _)| read.as_raw_fd());

        leader.wire(None, write_end(0), &pipe_fds);
        for (i, stage) in followers.iter_mut().enumerate() {
            stage.wire(read_end(i), write_end(i + 1), &pipe_fds);
        }

        let pgid = Self::fork_stage(&leader)?;
        for stage in &mut followers {
            stage.join_group(pgid);
            if let Err(e) = Self::fork_stage(stage) {
                let _ = killpg(pgid, Signal::SIGKILL);
                return Err(e);
            }
        }

        debug!(
            pid = %pgid,
            stages = followers.len() + 1,
            program = %leader.program_display(),
            "spawned"
        );
        Ok(pgid)
    }

    fn signal_group(&self, pgid: Pid, signal: Signal) -> nix::Result<()> {
        killpg(pgid, signal)
    }

    fn try_wait(&self) -> KernelResult<Option<WaitStatus>> {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED;
        loop {
            match waitpid(Pid::from_raw(-1), Some(flags)) {
                Ok(WaitStatus::StillAlive) => return Ok(None),
                Ok(status) => return Ok(Some(status)),
                Err(Errno::ECHILD) => return Ok(None),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(KernelError::Wait(e)),
            }
        }
    }
}

/// Resolve a command name against `PATH`.
///
/// Names containing `/` are used as given. Returns `None` when no executable
/// match exists.
pub fn resolve_in_path(name: &str, path_var: &str) -> Option<String> {
    if name.contains('/') {
        return Some(name.to_string());
    }
    for dir in path_var.split(':') {
        if dir.is_empty() {
            continue;
        }

        let full_path = format!("{}/{}", dir, name);
        let path = Path::new(&full_path);

        if path.is_file() {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = path.metadata()
                && metadata.permissions().mode() & 0o111 != 0
            {
                return Some(full_path);
            }
        }
    }

    None
}
