//! Child side of the launch protocol.
//!
//! Everything the child touches between `fork` and `execv` is built here in
//! the parent, so the child only performs async-signal-safe system calls:
//! `setpgid`, `sigaction`, `sigprocmask`, `open`, `dup2`, `close`, `write`,
//! `execv`, `_exit`.
//!
//! Pipe ends are wired before redirections, so `a | b > f` sends `b`'s
//! output to `f`.

use std::ffi::CString;
use std::os::fd::{BorrowedFd, RawFd};

use nix::fcntl::{OFlag, open};
use nix::libc;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, sigaction, sigprocmask};
use nix::sys::stat::Mode;
use nix::unistd::{Pid, close, dup2, execv, setpgid, write};

use super::resolve_in_path;
use crate::signals::JOB_CONTROL_SIGNALS;
use tsh_types::{CommandSpec, RedirectKind};

/// Exit status of a child whose program could not be loaded.
pub const EXEC_FAILURE_STATUS: i32 = 127;

fn c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

struct PreparedRedirect {
    path: CString,
    flags: OFlag,
    target: RawFd,
    failure: Vec<u8>,
}

impl PreparedRedirect {
    fn apply(&self) -> nix::Result<()> {
        let fd = open(self.path.as_c_str(), self.flags, Mode::from_bits_truncate(0o666))?;
        if fd != self.target {
            dup2(fd, self.target)?;
            close(fd)?;
        }
        Ok(())
    }
}

/// A command ready to exec in a freshly forked child.
pub(super) struct PreparedExec {
    program: CString,
    argv: Vec<CString>,
    redirects: Vec<PreparedRedirect>,
    not_found: Vec<u8>,
    /// Process group to join. `None` leads a new group.
    group: Option<Pid>,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    /// Every pipe end of the job, closed in the child after wiring.
    pipe_fds: Vec<RawFd>,
}

impl PreparedExec {
    pub(super) fn new(spec: &CommandSpec, path_var: &str) -> Self {
        let name = spec.program().unwrap_or_default();
        let program = resolve_in_path(name, path_var).unwrap_or_else(|| name.to_string());

        let redirects = spec
            .redirects
            .iter()
            .map(|r| {
                let flags = match r.kind {
                    RedirectKind::Stdin => OFlag::O_RDONLY,
                    RedirectKind::Stdout | RedirectKind::Stderr => {
                        OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC
                    }
                    RedirectKind::Append => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
                };
                PreparedRedirect {
                    path: c_string(&r.path),
                    flags,
                    target: r.kind.target_fd(),
                    failure: format!("{}: cannot open\n", r.path).into_bytes(),
                }
            })
            .collect();

        Self {
            program: c_string(&program),
            argv: spec.argv.iter().map(|a| c_string(a)).collect(),
            redirects,
            not_found: format!("{}: Command not found\n", name).into_bytes(),
            group: None,
            stdin: None,
            stdout: None,
            pipe_fds: Vec::new(),
        }
    }

    /// Connect this stage to its neighbours in a pipeline.
    pub(super) fn wire(&mut self, stdin: Option<RawFd>, stdout: Option<RawFd>, pipe_fds: &[RawFd]) {
        self.stdin = stdin;
        self.stdout = stdout;
        self.pipe_fds = pipe_fds.to_vec();
    }

    pub(super) fn join_group(&mut self, pgid: Pid) {
        self.group = Some(pgid);
    }

    pub(super) fn group(&self) -> Option<Pid> {
        self.group
    }

    pub(super) fn program_display(&self) -> std::borrow::Cow<'_, str> {
        self.program.to_string_lossy()
    }

    /// Runs in the child. Never returns to parent-side logic.
    pub(super) fn run_child(&self) -> ! {
        let _ = setpgid(Pid::from_raw(0), self.group.unwrap_or(Pid::from_raw(0)));

        // Handlers installed by the shell must not run in the child, and the
        // mask inherited from the launching thread must not survive exec.
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        for signal in JOB_CONTROL_SIGNALS.iter().copied().chain([Signal::SIGQUIT]) {
            // SAFETY: resetting to SIG_DFL installs no Rust handler.
            let _ = unsafe { sigaction(signal, &default) };
        }
        let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);

        for (source, target) in [(self.stdin, libc::STDIN_FILENO), (self.stdout, libc::STDOUT_FILENO)] {
            if let Some(fd) = source
                && dup2(fd, target).is_err()
            {
                exit_child(1);
            }
        }
        for &fd in &self.pipe_fds {
            if fd > libc::STDERR_FILENO {
                let _ = close(fd);
            }
        }

        for redirect in &self.redirects {
            if redirect.apply().is_err() {
                write_stdout(&redirect.failure);
                exit_child(1);
            }
        }

        let _ = execv(&self.program, &self.argv);
        write_stdout(&self.not_found);
        exit_child(EXEC_FAILURE_STATUS)
    }
}

fn exit_child(status: i32) -> ! {
    // SAFETY: `_exit` skips atexit handlers and stdio flushing, which must
    // not run in a forked child.
    unsafe { libc::_exit(status) }
}

fn write_stdout(bytes: &[u8]) {
    // SAFETY: fd 1 stays open for the lifetime of the child.
    let stdout = unsafe { BorrowedFd::borrow_raw(libc::STDOUT_FILENO) };
    let _ = write(stdout, bytes);
}
