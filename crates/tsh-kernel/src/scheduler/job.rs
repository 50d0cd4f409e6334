//! The Job Table: a fixed-capacity registry of tracked child processes.
//!
//! Slots are kept in a stable order so `jobs` always lists in the same order.
//! Only `state` changes during a job's lifetime; `pid` and `command` are fixed
//! from `add` until the slot is cleared by `remove`.

use nix::unistd::Pid;
use tracing::debug;

use crate::error::JobError;
use tsh_types::{JobId, JobInfo, JobState};

/// Default number of slots.
pub const DEFAULT_CAPACITY: usize = 16;

/// One tracked process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pid: Pid,
    id: JobId,
    state: JobState,
    command: String,
}

impl Job {
    /// Process ID. Also the job's process group ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Command line as typed, retained for display.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            pid: self.pid.as_raw(),
            state: self.state,
            command: self.command.clone(),
        }
    }
}

/// Fixed-capacity job table.
#[derive(Debug)]
pub struct JobTable {
    slots: Vec<Option<Job>>,
    /// Next job ID to hand out; recomputed on every removal.
    next_id: u32,
}

impl JobTable {
    /// Create a table with the default capacity of 16 slots.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            next_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Track a new job and return its assigned job ID.
    pub fn add(&mut self, pid: Pid, state: JobState, command: &str) -> Result<JobId, JobError> {
        if pid.as_raw() < 1 {
            return Err(JobError::InvalidPid(pid.as_raw()));
        }
        if self.find_by_pid(pid).is_some() {
            return Err(JobError::DuplicatePid(pid.as_raw()));
        }
        if state == JobState::Foreground
            && let Some(fg) = self.foreground_pid()
        {
            return Err(JobError::ForegroundBusy(fg.as_raw()));
        }
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return Err(JobError::TableFull);
        };

        let id = self.allocate_id();
        self.slots[index] = Some(Job {
            pid,
            id,
            state,
            command: command.to_string(),
        });
        debug!(job = %id, pid = %pid, ?state, command, "job added");
        Ok(id)
    }

    /// Clear the slot holding `pid`. Returns false if `pid` is not tracked.
    pub fn remove(&mut self, pid: Pid) -> bool {
        if pid.as_raw() < 1 {
            return false;
        }
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|job| job.pid == pid))
        else {
            return false;
        };

        if let Some(job) = slot.take() {
            debug!(job = %job.id, pid = %pid, "job removed");
        }
        self.next_id = self.max_job_id() + 1;
        true
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        if pid.as_raw() < 1 {
            return None;
        }
        self.jobs().find(|job| job.pid == pid)
    }

    pub fn find_by_job_id(&self, id: JobId) -> Option<&Job> {
        if id.0 < 1 {
            return None;
        }
        self.jobs().find(|job| job.id == id)
    }

    /// Change a job's state, keeping the single-foreground invariant.
    pub fn set_state(&mut self, pid: Pid, state: JobState) -> Result<(), JobError> {
        if state == JobState::Foreground
            && let Some(fg) = self.foreground_pid()
            && fg != pid
        {
            return Err(JobError::ForegroundBusy(fg.as_raw()));
        }
        let job = self
            .slots
            .iter_mut()
            .flatten()
            .find(|job| job.pid == pid)
            .ok_or(JobError::UnknownPid(pid.as_raw()))?;
        debug!(job = %job.id, pid = %pid, from = ?job.state, to = ?state, "job state changed");
        job.state = state;
        Ok(())
    }

    /// PID of the sole foreground job, if any.
    pub fn foreground_pid(&self) -> Option<Pid> {
        self.jobs()
            .find(|job| job.state == JobState::Foreground)
            .map(|job| job.pid)
    }

    /// Snapshot of every tracked job in slot order. For display only.
    pub fn list(&self) -> Vec<JobInfo> {
        self.jobs().map(Job::info).collect()
    }

    fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().flatten()
    }

    fn max_job_id(&self) -> u32 {
        self.jobs().map(|job| job.id.0).max().unwrap_or(0)
    }

    /// Hand out `next_id`, wrapping to 1 past the capacity and skipping IDs
    /// still held by live jobs. Callers guarantee a free slot exists, so some
    /// ID in `1..=capacity` is free.
    fn allocate_id(&mut self) -> JobId {
        let limit = self.capacity() as u32;
        let mut candidate = self.next_id;
        for _ in 0..=limit {
            if candidate == 0 || candidate > limit {
                candidate = 1;
            }
            if self.find_by_job_id(JobId(candidate)).is_none() {
                break;
            }
            candidate += 1;
        }
        self.next_id = candidate + 1;
        if self.next_id > limit {
            self.next_id = 1;
        }
        JobId(candidate)
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}
