//! Foreground/Background Controller: the `fg` and `bg` built-ins.
//!
//! Resolves a `%jobid` or raw PID argument, sends SIGCONT to the job's
//! process group and moves the job to its new state. Every error path leaves
//! the table untouched.

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use thiserror::Error;
use tracing::info;

use super::{Job, JobTable};
use crate::error::JobError;
use crate::process::ProcessControl;
use tsh_types::{JobId, JobInfo, JobState};

/// Which way a job is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Foreground,
    Background,
}

impl Resume {
    /// Built-in name, used as the prefix of error messages.
    pub fn command(self) -> &'static str {
        match self {
            Resume::Foreground => "fg",
            Resume::Background => "bg",
        }
    }

    fn target_state(self) -> JobState {
        match self {
            Resume::Foreground => JobState::Foreground,
            Resume::Background => JobState::Background,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("{0} command requires PID or %jobid argument")]
    MissingArgument(&'static str),
    #[error("{0}: argument must be a PID or %jobid")]
    InvalidArgument(&'static str),
    #[error("{0}: No such job")]
    NoSuchJob(String),
    #[error("({0}): No such process")]
    NoSuchProcess(i32),
    #[error("{command}: {errno}")]
    Signal { command: &'static str, errno: Errno },
    #[error("{0}")]
    Job(#[from] JobError),
}

/// A parsed `fg`/`bg` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRef {
    /// `%N`
    Job(JobId),
    /// `N`
    Process(Pid),
}

impl JobRef {
    pub fn parse(command: &'static str, arg: Option<&str>) -> Result<Self, ControlError> {
        let arg = arg.ok_or(ControlError::MissingArgument(command))?;
        let invalid = || ControlError::InvalidArgument(command);
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

        if let Some(rest) = arg.strip_prefix('%') {
            if !digits(rest) {
                return Err(invalid());
            }
            rest.parse().map(|n| JobRef::Job(JobId(n))).map_err(|_| invalid())
        } else {
            if !digits(arg) {
                return Err(invalid());
            }
            arg.parse().map(|n| JobRef::Process(Pid::from_raw(n))).map_err(|_| invalid())
        }
    }

    /// Look the reference up in `jobs`.
    pub fn resolve<'a>(&self, jobs: &'a JobTable) -> Result<&'a Job, ControlError> {
        match *self {
            JobRef::Job(id) => jobs
                .find_by_job_id(id)
                .ok_or_else(|| ControlError::NoSuchJob(format!("%{}", id))),
            JobRef::Process(pid) => jobs
                .find_by_pid(pid)
                .ok_or(ControlError::NoSuchProcess(pid.as_raw())),
        }
    }
}

/// Resume the job named by `arg` in the foreground or background.
///
/// The job's group gets SIGCONT before its state changes. Blocking on a
/// foreground job is the caller's business.
pub fn resume(
    jobs: &mut JobTable,
    process: &dyn ProcessControl,
    mode: Resume,
    arg: Option<&str>,
) -> Result<JobInfo, ControlError> {
    let command = mode.command();
    let job = JobRef::parse(command, arg)?.resolve(jobs)?;
    let (pid, previous) = (job.pid(), job.state());

    // The table can lag behind a stop the reaper has not seen yet, so the
    // group is continued whatever its recorded state. SIGCONT to a running
    // group is a no-op.
    process
        .signal_group(pid, Signal::SIGCONT)
        .map_err(|errno| ControlError::Signal { command, errno })?;
    jobs.set_state(pid, mode.target_state())?;

    let job = JobRef::Process(pid).resolve(jobs)?;
    info!(job = %job.id(), pid = %pid, from = ?previous, to = ?job.state(), "{command}");
    Ok(job.info())
}
