//! Signal delivery for the job-control core.
//!
//! OS-level handlers do nothing but record the delivery (tokio's handlers
//! write to a self-pipe). A listener task turns each delivery into a
//! [`ShellEvent`] on a single-consumer channel, and the kernel's main flow is
//! the only reader of that channel:
//!
//! ```text
//! SIGINT  ─┐
//! SIGTSTP ─┼─▶ listener task ──ShellEvent──▶ mpsc ──▶ Kernel (waiter / pre-prompt drain)
//! SIGCHLD ─┤
//! SIGQUIT ─┘
//! ```
//!
//! Since the Reaper, the Router and the Controller all run in the main flow,
//! no job-table mutation can interleave with another.

use nix::libc;
use nix::sys::signal::{SigSet, SigmaskHow, Signal, pthread_sigmask};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{KernelError, KernelResult};

/// Signals whose arrival changes job state.
pub const JOB_CONTROL_SIGNALS: [Signal; 3] = [Signal::SIGCHLD, Signal::SIGINT, Signal::SIGTSTP];

/// A signal delivery, translated for the main flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellEvent {
    /// Ctrl-C at the terminal.
    Interrupt,
    /// Ctrl-Z at the terminal.
    Suspend,
    /// One or more children changed state. Deliveries coalesce.
    ChildStateChanged,
    /// SIGQUIT: terminate the shell.
    Quit,
}

impl ShellEvent {
    /// The signal forwarded to the foreground group, for terminal events.
    pub fn forwarded_signal(self) -> Option<Signal> {
        match self {
            ShellEvent::Interrupt => Some(Signal::SIGINT),
            ShellEvent::Suspend => Some(Signal::SIGTSTP),
            ShellEvent::ChildStateChanged | ShellEvent::Quit => None,
        }
    }
}

/// Install handlers and spawn the listener task.
///
/// Must be called from within a tokio runtime.
pub fn spawn_listener(tx: UnboundedSender<ShellEvent>) -> KernelResult<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt()).map_err(KernelError::SignalInstall)?;
    let mut suspend = signal(SignalKind::from_raw(libc::SIGTSTP)).map_err(KernelError::SignalInstall)?;
    let mut child = signal(SignalKind::child()).map_err(KernelError::SignalInstall)?;
    let mut quit = signal(SignalKind::quit()).map_err(KernelError::SignalInstall)?;

    debug!("signal listener installed");
    Ok(tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(()) = interrupt.recv() => ShellEvent::Interrupt,
                Some(()) = suspend.recv() => ShellEvent::Suspend,
                Some(()) = child.recv() => ShellEvent::ChildStateChanged,
                Some(()) = quit.recv() => ShellEvent::Quit,
                else => break,
            };
            trace!(?event, "signal received");
            if tx.send(event).is_err() {
                break;
            }
        }
        debug!("signal listener stopped");
    }))
}

/// Blocks the job-control signals on the current thread until dropped.
///
/// Held by the launcher across fork-then-register, so the child starts with
/// them blocked (it clears its mask before exec) and the launching thread
/// never runs a handler mid-launch.
#[must_use]
pub struct SignalMask {
    previous: SigSet,
}

impl SignalMask {
    pub fn block_job_control() -> KernelResult<Self> {
        let mut set = SigSet::empty();
        for signal in JOB_CONTROL_SIGNALS {
            set.add(signal);
        }
        let mut previous = SigSet::empty();
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut previous))
            .map_err(KernelError::SignalMask)?;
        Ok(Self { previous })
    }
}

impl Drop for SignalMask {
    fn drop(&mut self) {
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}
