//! Scripted process control for scheduler tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use super::ProcessControl;
use crate::error::{KernelError, KernelResult};
use tsh_types::CommandSpec;

/// First PID handed out by [`MockProcess`].
pub const FIRST_MOCK_PID: i32 = 1000;

#[derive(Debug)]
struct MockState {
    next_pid: i32,
    spawned: Vec<(Pid, CommandSpec)>,
    signals: Vec<(Pid, Signal)>,
    pending: VecDeque<WaitStatus>,
    fail_spawn: bool,
}

/// Fake process control: predictable PIDs, recorded signals, queued statuses.
pub struct MockProcess {
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle onto a [`MockProcess`] owned by a kernel.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockProcess {
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState {
            next_pid: FIRST_MOCK_PID,
            spawned: Vec::new(),
            signals: Vec::new(),
            pending: VecDeque::new(),
            fail_spawn: false,
        }));
        (Self { state: state.clone() }, MockHandle { state })
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProcessControl for MockProcess {
    fn spawn(&self, spec: &CommandSpec) -> KernelResult<Pid> {
        let mut state = lock(&self.state);
        if state.fail_spawn {
            return Err(KernelError::Fork(Errno::EAGAIN));
        }
        let pid = Pid::from_raw(state.next_pid);
        state.next_pid += 1;
        state.spawned.push((pid, spec.clone()));
        Ok(pid)
    }

    fn signal_group(&self, pgid: Pid, signal: Signal) -> nix::Result<()> {
        lock(&self.state).signals.push((pgid, signal));
        Ok(())
    }

    fn try_wait(&self) -> KernelResult<Option<WaitStatus>> {
        Ok(lock(&self.state).pending.pop_front())
    }
}

impl MockHandle {
    /// Queue a status for the next `try_wait`.
    pub fn push_status(&self, status: WaitStatus) {
        lock(&self.state).pending.push_back(status);
    }

    pub fn exit(&self, pid: i32, code: i32) {
        self.push_status(WaitStatus::Exited(Pid::from_raw(pid), code));
    }

    pub fn kill(&self, pid: i32, signal: Signal) {
        self.push_status(WaitStatus::Signaled(Pid::from_raw(pid), signal, false));
    }

    pub fn stop(&self, pid: i32, signal: Signal) {
        self.push_status(WaitStatus::Stopped(Pid::from_raw(pid), signal));
    }

    pub fn fail_spawn(&self, fail: bool) {
        lock(&self.state).fail_spawn = fail;
    }

    /// Group signals delivered so far, as `(pgid, signal)`.
    pub fn signals(&self) -> Vec<(i32, Signal)> {
        lock(&self.state)
            .signals
            .iter()
            .map(|(pid, sig)| (pid.as_raw(), *sig))
            .collect()
    }

    pub fn spawned(&self) -> Vec<(i32, CommandSpec)> {
        lock(&self.state)
            .spawned
            .iter()
            .map(|(pid, spec)| (pid.as_raw(), spec.clone()))
            .collect()
    }

    pub fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }
}
