//! Pure data types for tsh: jobs, job states and parsed commands.
//!
//! This crate is a leaf dependency with no async runtime, no parser, no I/O.
//! It exists so that front ends can display job listings and build commands
//! without pulling in tsh-kernel's process and signal machinery.

pub mod command;
pub mod job;

// Flat re-exports for convenience
pub use command::*;
pub use job::*;
