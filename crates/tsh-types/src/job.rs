//! Job identification and state types.

use std::fmt;

/// Shell-assigned job identifier (`%N`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run state of a tracked job.
///
/// An empty table slot has no state at all; every tracked job is in exactly
/// one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Running and owning the terminal's control signals. At most one job.
    Foreground,
    /// Running without blocking the read loop.
    Background,
    /// Stopped by a signal (e.g., Ctrl-Z / SIGTSTP).
    Stopped,
}

impl JobState {
    /// Label used by the `jobs` listing.
    pub fn label(self) -> &'static str {
        match self {
            JobState::Foreground => "Foreground",
            JobState::Background => "Running",
            JobState::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Information about a job for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    /// Job ID.
    pub id: JobId,
    /// OS process ID, which is also the job's process group ID.
    pub pid: i32,
    /// Current state.
    pub state: JobState,
    /// Command line as typed.
    pub command: String,
}

impl JobInfo {
    /// The `[jobId] (pid) commandLine` acknowledgement printed for background jobs.
    pub fn banner(&self) -> String {
        format!("[{}] ({}) {}", self.id, self.pid, self.command)
    }
}

/// Renders the `jobs` row: `[jobId] (pid) <state> commandLine`.
impl fmt::Display for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ({}) {} {}", self.id, self.pid, self.state, self.command)
    }
}
