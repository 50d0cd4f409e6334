//! tsh-kernel: the job-control core of tsh.
//!
//! This crate provides:
//!
//! - **Lexer**: Tokenizes command lines using logos
//! - **Parser**: Builds a [`CommandSpec`](tsh_types::CommandSpec) from tokens
//! - **Process**: Fork/exec into a fresh process group, group signals, any-child wait
//! - **Signals**: OS signal deliveries turned into [`ShellEvent`]s
//! - **Scheduler**: Job Table, launcher, reaper, signal router, fg/bg controller
//! - **Kernel**: Ties it together; evaluates lines and runs the foreground waiter

pub mod dispatch;
pub mod error;
pub mod kernel;
pub mod lexer;
pub mod parser;
pub mod process;
pub mod scheduler;
pub mod signals;

pub use error::{JobError, KernelError, KernelResult};
pub use kernel::{Control, Kernel, KernelConfig};
pub use process::{NixProcess, ProcessControl};
pub use scheduler::{ControlError, JobTable};
pub use signals::ShellEvent;

pub use tsh_types;
