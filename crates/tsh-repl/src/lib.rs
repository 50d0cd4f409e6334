//! tsh REPL: the read-eval loop around the job-control kernel.
//!
//! It handles:
//! - Command-line flags (`-h`, `-v`, `-p`)
//! - Line editing and history via rustyline when attached to a terminal
//! - Plain line reading when stdin is a pipe or file
//! - Reporting background job changes before each prompt

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use tokio::runtime::Runtime;

use tsh_kernel::{Control, Kernel, KernelConfig};

pub const USAGE: &str = "\
Usage: tsh [-hvp]
   -h   print this message
   -v   print additional diagnostic information
   -p   do not emit a command prompt
";

/// What the command line asked for.
#[derive(Debug)]
pub enum Invocation {
    Run(KernelConfig),
    Usage,
}

/// Parse the flags after the program name. Flags may be combined (`-vp`).
pub fn parse_args<I, S>(args: I) -> Invocation
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut config = KernelConfig::default();
    for arg in args {
        let Some(flags) = arg.as_ref().strip_prefix('-') else {
            return Invocation::Usage;
        };
        if flags.is_empty() {
            return Invocation::Usage;
        }
        for flag in flags.chars() {
            match flag {
                'v' => config = config.with_verbose(true),
                'p' => config = config.with_emit_prompt(false),
                _ => return Invocation::Usage,
            }
        }
    }
    Invocation::Run(config)
}

/// REPL state: the kernel and the runtime its listener runs on.
pub struct Repl {
    kernel: Kernel,
    runtime: Runtime,
}

impl Repl {
    pub fn with_config(config: KernelConfig) -> Result<Self> {
        let runtime = Runtime::new().context("Failed to create tokio runtime")?;
        let kernel = {
            let _guard = runtime.enter();
            Kernel::new(config).context("Failed to start job control")?
        };
        Ok(Self { kernel, runtime })
    }

    pub fn prompt(&self) -> &str {
        self.kernel.prompt()
    }

    /// Evaluate one line, blocking while a foreground job runs.
    pub fn process_line(&mut self, line: &str) -> Result<Control> {
        Ok(self.runtime.block_on(self.kernel.execute(line))?)
    }

    /// Report anything that happened to background jobs since the last line.
    pub fn drain(&mut self) -> Result<Control> {
        Ok(self.kernel.drain_events()?)
    }
}

/// Run the shell until `quit`, end of input, or SIGQUIT. Returns the exit
/// status.
pub fn run(config: KernelConfig) -> Result<i32> {
    let mut repl = Repl::with_config(config)?;
    if io::stdin().is_terminal() {
        run_interactive(&mut repl)
    } else {
        run_piped(&mut repl, io::stdin().lock())
    }
}

/// Read lines from `input` until it is exhausted.
pub fn run_piped(repl: &mut Repl, mut input: impl BufRead) -> Result<i32> {
    let mut line = String::new();
    loop {
        if let Control::Exit(code) = repl.drain()? {
            return Ok(code);
        }
        let prompt = repl.prompt();
        if !prompt.is_empty() {
            let mut stdout = io::stdout().lock();
            write!(stdout, "{prompt}").context("Failed to write prompt")?;
            stdout.flush().context("Failed to write prompt")?;
        }

        line.clear();
        if input.read_line(&mut line).context("Failed to read command")? == 0 {
            return Ok(0);
        }
        if let Control::Exit(code) = repl.process_line(&line)? {
            return Ok(code);
        }
    }
}

fn history_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.data_dir().join("tsh").join("history.txt"))
}

/// Save REPL history to disk.
fn save_history(rl: &mut Editor<(), DefaultHistory>, history_path: &Option<PathBuf>) {
    if let Some(path) = history_path {
        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            tracing::warn!("Failed to create history directory: {}", e);
        }
        if let Err(e) = rl.save_history(path) {
            tracing::warn!("Failed to save history: {}", e);
        }
    }
}

fn run_interactive(repl: &mut Repl) -> Result<i32> {
    let mut rl: Editor<(), DefaultHistory> = Editor::new().context("Failed to create editor")?;

    let history_path = history_path();
    if let Some(ref path) = history_path
        && let Err(e) = rl.load_history(path)
    {
        // Missing on first run
        let is_not_found =
            matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound);
        if !is_not_found {
            tracing::warn!("Failed to load history: {}", e);
        }
    }

    let code = loop {
        if let Control::Exit(code) = repl.drain()? {
            break code;
        }
        let prompt = repl.prompt().to_string();

        match rl.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty()
                    && let Err(e) = rl.add_history_entry(line.as_str())
                {
                    tracing::warn!("Failed to add history entry: {}", e);
                }
                if let Control::Exit(code) = repl.process_line(&line)? {
                    break code;
                }
            }
            // Ctrl-C at the prompt with no foreground job.
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break 0,
            Err(err) => {
                save_history(&mut rl, &history_path);
                return Err(err).context("Failed to read command");
            }
        }
    };

    save_history(&mut rl, &history_path);
    Ok(code)
}
