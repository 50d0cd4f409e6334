//! The Kernel: one shell session's job-control state and the entry point for
//! command lines.
//!
//! The kernel owns the Job Table, the process-control backend, the console
//! the user-facing reports go to, and the receiving end of the signal event
//! channel. Everything that touches the table runs here, on whichever task
//! calls [`Kernel::execute`] or [`Kernel::drain_events`].
//!
//! # Example
//!
//! ```ignore
//! let mut kernel = Kernel::new(KernelConfig::default())?;
//! match kernel.execute("sleep 1 &").await? {
//!     Control::Continue => {}
//!     Control::Exit(code) => std::process::exit(code),
//! }
//! ```

use std::fmt;
use std::io::{self, Write};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dispatch::Builtin;
use crate::error::KernelResult;
use crate::parser::parse;
use crate::process::{NixProcess, ProcessControl};
use crate::scheduler::{DEFAULT_CAPACITY, JobTable, Resume, control, launcher, reaper, router};
use crate::signals::{ShellEvent, spawn_listener};
use nix::unistd::Pid;
use tsh_types::{CommandSpec, JobState};

/// Printed when SIGQUIT arrives.
pub const QUIT_MESSAGE: &str = "Terminating after receipt of SIGQUIT signal";

/// Kernel configuration.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Job Table capacity.
    pub capacity: usize,

    /// Prompt shown before each line.
    pub prompt: String,

    /// When false the prompt is the empty string (`-p`, for scripted runs).
    pub emit_prompt: bool,

    /// Print `Added job ...` on every table insertion (`-v`).
    pub verbose: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            prompt: "tsh> ".to_string(),
            emit_prompt: true,
            verbose: false,
        }
    }
}

impl KernelConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_emit_prompt(mut self, emit: bool) -> Self {
        self.emit_prompt = emit;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// What the read loop should do after a line or an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Exit(i32),
}

pub struct Kernel {
    config: KernelConfig,
    jobs: JobTable,
    process: Box<dyn ProcessControl>,
    console: Box<dyn Write + Send>,
    events_tx: UnboundedSender<ShellEvent>,
    events_rx: UnboundedReceiver<ShellEvent>,
    listener: Option<JoinHandle<()>>,
}

impl Kernel {
    /// Create a kernel that forks real processes, reports to stdout and
    /// listens for signals.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: KernelConfig) -> KernelResult<Self> {
        let mut kernel = Self::with_parts(config, Box::new(NixProcess), Box::new(io::stdout()));
        kernel.listen()?;
        Ok(kernel)
    }

    /// Create a kernel over an arbitrary backend and console, without a
    /// signal listener. Events can still be injected through
    /// [`event_sender`](Self::event_sender).
    pub fn with_parts(
        config: KernelConfig,
        process: Box<dyn ProcessControl>,
        console: Box<dyn Write + Send>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            jobs: JobTable::with_capacity(config.capacity),
            config,
            process,
            console,
            events_tx,
            events_rx,
            listener: None,
        }
    }

    /// Install the OS signal handlers and start forwarding them as events.
    pub fn listen(&mut self) -> KernelResult<()> {
        if self.listener.is_none() {
            self.listener = Some(spawn_listener(self.events_tx.clone())?);
        }
        Ok(())
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// The prompt to show, honouring `emit_prompt`.
    pub fn prompt(&self) -> &str {
        if self.config.emit_prompt {
            &self.config.prompt
        } else {
            ""
        }
    }

    /// A sender onto the kernel's event channel.
    pub fn event_sender(&self) -> UnboundedSender<ShellEvent> {
        self.events_tx.clone()
    }

    /// Evaluate one command line.
    ///
    /// Local errors (bad syntax, full table, unknown job) are reported on the
    /// console and evaluation continues. Only fatal errors are returned.
    pub async fn execute(&mut self, line: &str) -> KernelResult<Control> {
        let command_line = line.trim();
        let spec = match parse(command_line) {
            Ok(Some(spec)) => spec,
            Ok(None) => return Ok(Control::Continue),
            Err(e) => {
                self.say(format_args!("tsh: {}", e))?;
                return Ok(Control::Continue);
            }
        };

        match spec.program().and_then(Builtin::from_name) {
            Some(builtin) => self.run_builtin(builtin, &spec).await,
            None => self.launch(&spec, command_line).await,
        }
    }

    /// Handle every event already queued, without blocking.
    pub fn drain_events(&mut self) -> KernelResult<Control> {
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => {
                    if let Control::Exit(code) = self.handle_event(event)? {
                        return Ok(Control::Exit(code));
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(Control::Continue),
            }
        }
    }

    async fn launch(&mut self, spec: &CommandSpec, command_line: &str) -> KernelResult<Control> {
        let launched = match launcher::launch(&mut self.jobs, self.process.as_ref(), spec, command_line) {
            Ok(launched) => launched,
            Err(e) if !e.is_fatal() => {
                self.say(e)?;
                return Ok(Control::Continue);
            }
            Err(e) => return Err(e),
        };

        if self.config.verbose {
            self.say(format_args!("Added job [{}] {} {}", launched.id, launched.pid, command_line))?;
        }

        match launched.state {
            JobState::Foreground => self.wait_foreground(launched.pid).await,
            _ => {
                self.say(format_args!("[{}] ({}) {}", launched.id, launched.pid, command_line))?;
                Ok(Control::Continue)
            }
        }
    }

    /// Foreground Waiter: handle events until `pid` no longer owns the
    /// foreground, because it was reaped or stopped.
    async fn wait_foreground(&mut self, pid: Pid) -> KernelResult<Control> {
        debug!(pid = %pid, "waiting for foreground job");
        while self.jobs.foreground_pid() == Some(pid) {
            let Some(event) = self.events_rx.recv().await else {
                break;
            };
            if let Control::Exit(code) = self.handle_event(event)? {
                return Ok(Control::Exit(code));
            }
        }
        debug!(pid = %pid, "foreground released");
        Ok(Control::Continue)
    }

    fn handle_event(&mut self, event: ShellEvent) -> KernelResult<Control> {
        debug!(?event, "handling event");
        match event {
            ShellEvent::Interrupt | ShellEvent::Suspend => {
                if let Some(signal) = event.forwarded_signal() {
                    router::forward_to_foreground(&self.jobs, self.process.as_ref(), signal);
                }
            }
            ShellEvent::ChildStateChanged => self.reap()?,
            ShellEvent::Quit => {
                info!("SIGQUIT received");
                self.say(QUIT_MESSAGE)?;
                return Ok(Control::Exit(1));
            }
        }
        Ok(Control::Continue)
    }

    fn reap(&mut self) -> KernelResult<()> {
        for notice in reaper::reap(&mut self.jobs, self.process.as_ref())? {
            self.say(notice)?;
        }
        Ok(())
    }

    async fn run_builtin(&mut self, builtin: Builtin, spec: &CommandSpec) -> KernelResult<Control> {
        let arg = spec.argv.get(1).map(String::as_str);
        match builtin {
            Builtin::Quit => {
                if let Control::Exit(code) = self.drain_events()? {
                    return Ok(Control::Exit(code));
                }
                self.reap()?;
                Ok(Control::Exit(0))
            }
            Builtin::Jobs => {
                for row in self.jobs.list() {
                    self.say(row)?;
                }
                Ok(Control::Continue)
            }
            Builtin::Bg => {
                match control::resume(&mut self.jobs, self.process.as_ref(), Resume::Background, arg) {
                    Ok(job) => self.say(job.banner())?,
                    Err(e) => self.say(e)?,
                }
                Ok(Control::Continue)
            }
            Builtin::Fg => {
                match control::resume(&mut self.jobs, self.process.as_ref(), Resume::Foreground, arg) {
                    Ok(job) => self.wait_foreground(Pid::from_raw(job.pid)).await,
                    Err(e) => {
                        self.say(e)?;
                        Ok(Control::Continue)
                    }
                }
            }
        }
    }

    /// Write one line to the console.
    fn say(&mut self, line: impl fmt::Display) -> KernelResult<()> {
        writeln!(self.console, "{}", line)?;
        self.console.flush()?;
        Ok(())
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{MockHandle, MockProcess};
    use nix::sys::signal::Signal;
    use std::sync::{Arc, Mutex};
    use tsh_types::JobId;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn take(&self) -> String {
            let mut bytes = self.0.lock().unwrap();
            String::from_utf8(std::mem::take(&mut *bytes)).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn kernel_with(config: KernelConfig) -> (Kernel, MockHandle, SharedBuffer) {
        let (process, handle) = MockProcess::new();
        let console = SharedBuffer::default();
        let kernel = Kernel::with_parts(config, Box::new(process), Box::new(console.clone()));
        (kernel, handle, console)
    }

    fn kernel() -> (Kernel, MockHandle, SharedBuffer) {
        kernel_with(KernelConfig::default())
    }

    fn send(kernel: &Kernel, event: ShellEvent) {
        kernel.event_sender().send(event).unwrap();
    }

    #[tokio::test]
    async fn test_foreground_blocks_until_reaped() {
        let (mut kernel, handle, console) = kernel();
        handle.exit(1000, 0);
        send(&kernel, ShellEvent::ChildStateChanged);

        let control = kernel.execute("sleep 1").await.unwrap();
        assert_eq!(control, Control::Continue);
        assert!(kernel.jobs().is_empty());
        assert_eq!(handle.spawned()[0].1.argv, vec!["sleep", "1"]);
        assert_eq!(console.take(), "");
    }

    #[tokio::test]
    async fn test_background_launch_prints_banner() {
        let (mut kernel, handle, console) = kernel();

        kernel.execute("sleep 100 &").await.unwrap();
        assert_eq!(console.take(), "[1] (1000) sleep 100 &\n");
        assert_eq!(kernel.jobs().foreground_pid(), None);
        assert!(handle.spawned()[0].1.background);
    }

    #[tokio::test]
    async fn test_interrupt_reaches_foreground_only() {
        let (mut kernel, handle, console) = kernel();
        kernel.execute("sleep 100 &").await.unwrap();
        console.take();

        send(&kernel, ShellEvent::Interrupt);
        handle.kill(1001, Signal::SIGINT);
        send(&kernel, ShellEvent::ChildStateChanged);
        kernel.execute("sleep 50").await.unwrap();

        assert_eq!(handle.signals(), vec![(1001, Signal::SIGINT)]);
        assert_eq!(console.take(), "Job [2] (1001) terminated by signal 2\n");
        let survivor = kernel.jobs().find_by_pid(Pid::from_raw(1000)).unwrap();
        assert_eq!(survivor.state(), JobState::Background);
    }

    #[tokio::test]
    async fn test_interrupt_without_foreground_is_swallowed() {
        let (mut kernel, handle, console) = kernel();
        kernel.execute("sleep 100 &").await.unwrap();
        console.take();

        send(&kernel, ShellEvent::Interrupt);
        send(&kernel, ShellEvent::Suspend);
        assert_eq!(kernel.drain_events().unwrap(), Control::Continue);
        assert!(handle.signals().is_empty());
        assert_eq!(console.take(), "");
    }

    #[tokio::test]
    async fn test_stop_then_bg_then_fg() {
        let (mut kernel, handle, console) = kernel();

        send(&kernel, ShellEvent::Suspend);
        handle.stop(1000, Signal::SIGTSTP);
        send(&kernel, ShellEvent::ChildStateChanged);
        kernel.execute("vi notes").await.unwrap();
        assert_eq!(
            console.take(),
            format!("Job [1] (1000) stopped by signal {}\n", Signal::SIGTSTP as i32)
        );
        assert_eq!(handle.signals(), vec![(1000, Signal::SIGTSTP)]);

        kernel.execute("jobs").await.unwrap();
        assert_eq!(console.take(), "[1] (1000) Stopped vi notes\n");

        kernel.execute("bg %1").await.unwrap();
        assert_eq!(console.take(), "[1] (1000) vi notes\n");
        assert_eq!(handle.signals().last(), Some(&(1000, Signal::SIGCONT)));

        kernel.execute("jobs").await.unwrap();
        assert_eq!(console.take(), "[1] (1000) Running vi notes\n");

        handle.exit(1000, 0);
        send(&kernel, ShellEvent::ChildStateChanged);
        kernel.execute("fg %1").await.unwrap();
        assert!(kernel.jobs().is_empty());
        assert_eq!(
            handle.signals(),
            vec![
                (1000, Signal::SIGTSTP),
                (1000, Signal::SIGCONT),
                (1000, Signal::SIGCONT),
            ]
        );
    }

    #[tokio::test]
    async fn test_fg_continues_job_whose_stop_is_not_reaped_yet() {
        let (mut kernel, handle, console) = kernel();
        kernel.execute("cat &").await.unwrap();
        console.take();

        // The job stopped on terminal input, but no event has been handled,
        // so the table still records it as running in the background.
        assert_eq!(kernel.jobs().list()[0].state, JobState::Background);
        handle.exit(1000, 0);
        send(&kernel, ShellEvent::ChildStateChanged);

        kernel.execute("fg %1").await.unwrap();
        assert_eq!(handle.signals(), vec![(1000, Signal::SIGCONT)]);
        assert!(kernel.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_is_one_job_under_the_leader() {
        let (mut kernel, handle, console) = kernel();
        kernel.execute("sleep 30 | cat &").await.unwrap();
        assert_eq!(console.take(), "[1] (1000) sleep 30 | cat &\n");

        let spawned = handle.spawned();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].1.pipeline[0].argv, vec!["cat"]);
        assert_eq!(kernel.jobs().len(), 1);

        send(&kernel, ShellEvent::Interrupt);
        handle.kill(1001, Signal::SIGINT);
        send(&kernel, ShellEvent::ChildStateChanged);
        kernel.execute("yes | head -1").await.unwrap();
        assert_eq!(handle.signals(), vec![(1001, Signal::SIGINT)]);
        assert_eq!(console.take(), "Job [2] (1001) terminated by signal 2\n");
    }

    #[tokio::test]
    async fn test_fg_continues_stopped_job_by_pid() {
        let (mut kernel, handle, console) = kernel();
        send(&kernel, ShellEvent::Suspend);
        handle.stop(1000, Signal::SIGTSTP);
        send(&kernel, ShellEvent::ChildStateChanged);
        kernel.execute("cat").await.unwrap();
        console.take();

        handle.exit(1000, 0);
        send(&kernel, ShellEvent::ChildStateChanged);
        kernel.execute("fg 1000").await.unwrap();
        assert_eq!(handle.signals().last(), Some(&(1000, Signal::SIGCONT)));
        assert!(kernel.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_table_full_rejects_seventeenth_job() {
        let (mut kernel, handle, console) = kernel();
        for _ in 0..DEFAULT_CAPACITY {
            kernel.execute("sleep 100 &").await.unwrap();
        }
        console.take();

        let control = kernel.execute("sleep 100 &").await.unwrap();
        assert_eq!(control, Control::Continue);
        assert_eq!(console.take(), "Tried to create too many jobs\n");
        assert_eq!(handle.spawned().len(), DEFAULT_CAPACITY);
        assert_eq!(kernel.jobs().len(), DEFAULT_CAPACITY);
    }

    #[tokio::test]
    async fn test_configured_capacity() {
        let (mut kernel, handle, console) = kernel_with(KernelConfig::default().with_capacity(2));
        for _ in 0..3 {
            kernel.execute("sleep 100 &").await.unwrap();
        }
        assert!(console.take().ends_with("Tried to create too many jobs\n"));
        assert_eq!(handle.spawned().len(), 2);
    }

    #[tokio::test]
    async fn test_coalesced_child_events() {
        let (mut kernel, handle, console) = kernel();
        kernel.execute("a &").await.unwrap();
        kernel.execute("b &").await.unwrap();
        console.take();

        handle.kill(1000, Signal::SIGTERM);
        handle.kill(1001, Signal::SIGKILL);
        send(&kernel, ShellEvent::ChildStateChanged);
        send(&kernel, ShellEvent::ChildStateChanged);
        kernel.drain_events().unwrap();

        assert_eq!(
            console.take(),
            format!(
                "Job [1] (1000) terminated by signal {}\nJob [2] (1001) terminated by signal {}\n",
                Signal::SIGTERM as i32,
                Signal::SIGKILL as i32
            )
        );
        assert!(kernel.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_builtin_errors_leave_table_alone() {
        let (mut kernel, handle, console) = kernel();
        kernel.execute("sleep 100 &").await.unwrap();
        console.take();
        let before = kernel.jobs().list();

        for (line, expected) in [
            ("fg", "fg command requires PID or %jobid argument"),
            ("bg", "bg command requires PID or %jobid argument"),
            ("bg abc", "bg: argument must be a PID or %jobid"),
            ("fg %x", "fg: argument must be a PID or %jobid"),
            ("fg 9999", "(9999): No such process"),
            ("bg %9", "%9: No such job"),
        ] {
            assert_eq!(kernel.execute(line).await.unwrap(), Control::Continue);
            assert_eq!(console.take(), format!("{expected}\n"), "{line}");
        }
        assert_eq!(kernel.jobs().list(), before);
        assert!(handle.signals().is_empty());
    }

    #[tokio::test]
    async fn test_quit_reaps_and_exits() {
        let (mut kernel, handle, console) = kernel();
        kernel.execute("sleep 100 &").await.unwrap();
        console.take();

        handle.kill(1000, Signal::SIGKILL);
        assert_eq!(kernel.execute("quit").await.unwrap(), Control::Exit(0));
        assert!(console.take().contains("terminated by signal"));
        assert!(kernel.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_sigquit_terminates() {
        let (mut kernel, _handle, console) = kernel();
        send(&kernel, ShellEvent::Quit);
        assert_eq!(kernel.drain_events().unwrap(), Control::Exit(1));
        assert_eq!(console.take(), format!("{QUIT_MESSAGE}\n"));
    }

    #[tokio::test]
    async fn test_verbose_reports_additions() {
        let (mut kernel, _handle, console) = kernel_with(KernelConfig::default().with_verbose(true));
        kernel.execute("  sleep 5 &  ").await.unwrap();
        assert_eq!(console.take(), "Added job [1] 1000 sleep 5 &\n[1] (1000) sleep 5 &\n");
        assert_eq!(kernel.jobs().find_by_job_id(JobId(1)).unwrap().command(), "sleep 5 &");
    }

    #[tokio::test]
    async fn test_parse_errors_are_reported() {
        let (mut kernel, handle, console) = kernel();
        assert_eq!(kernel.execute("ls |").await.unwrap(), Control::Continue);
        assert_eq!(console.take(), "tsh: missing command\n");
        assert_eq!(kernel.execute("   ").await.unwrap(), Control::Continue);
        assert_eq!(console.take(), "");
        assert!(handle.spawned().is_empty());
    }

    #[tokio::test]
    async fn test_fork_failure_is_returned() {
        let (mut kernel, handle, _console) = kernel();
        handle.fail_spawn(true);
        let err = kernel.execute("ls").await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_prompt_follows_config() {
        let (kernel, _, _) = kernel();
        assert_eq!(kernel.prompt(), "tsh> ");
        let (quiet, _, _) = kernel_with(KernelConfig::default().with_emit_prompt(false));
        assert_eq!(quiet.prompt(), "");
    }
}
