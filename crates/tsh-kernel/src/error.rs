//! Error types for the job-control core.
//!
//! Table and controller errors are local: they are reported and the read loop
//! carries on. OS-facility failures outside the child are fatal to the shell.

use nix::errno::Errno;
use thiserror::Error;

use crate::scheduler::ControlError;

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Job Table rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("invalid pid: {0}")]
    InvalidPid(i32),
    #[error("pid {0} is already tracked")]
    DuplicatePid(i32),
    #[error("Tried to create too many jobs")]
    TableFull,
    #[error("pid {0} is not tracked")]
    UnknownPid(i32),
    #[error("job ({0}) already owns the foreground")]
    ForegroundBusy(i32),
}

/// Kernel-level errors.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("fork error: {0}")]
    Fork(#[source] Errno),
    #[error("pipe error: {0}")]
    Pipe(#[source] Errno),
    #[error("failed to install signal handlers: {0}")]
    SignalInstall(#[source] std::io::Error),
    #[error("sigprocmask error: {0}")]
    SignalMask(#[source] Errno),
    #[error("waitpid error: {0}")]
    Wait(#[source] Errno),
    #[error("console write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Control(#[from] ControlError),
}

impl KernelError {
    /// Whether the shell must terminate.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, KernelError::Job(_) | KernelError::Control(_))
    }
}
