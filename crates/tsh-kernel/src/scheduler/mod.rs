//! Scheduler: the job table and everything that mutates it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          JobTable                            │
//! │  slots: [Option<Job>; 16]   (pid, job id, state, command)    │
//! └──────────────────────────────────────────────────────────────┘
//!      ▲ add            ▲ set_state(Stopped)    ▲ set_state(Fg/Bg)
//!      │                │ remove                │
//! ┌────┴─────┐     ┌────┴─────┐            ┌────┴───────┐
//! │ launcher │     │  reaper  │            │  control   │
//! │ fork+add │     │ drain    │            │  fg / bg   │
//! └──────────┘     │ waitpid  │            └────────────┘
//!                  └──────────┘
//!      router: foreground_pid() ──▶ killpg(SIGINT | SIGTSTP)
//! ```
//!
//! All of these run on the kernel's main flow, one at a time.

pub mod control;
mod job;
pub mod launcher;
pub mod reaper;
pub mod router;

pub use control::{ControlError, JobRef, Resume};
pub use job::{DEFAULT_CAPACITY, Job, JobTable};
pub use launcher::Launched;
pub use reaper::JobNotice;
