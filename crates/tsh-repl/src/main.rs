//! tsh entry point.
//!
//! Usage:
//!   tsh          # Interactive shell with prompt
//!   tsh -p       # No prompt (for driving from a pipe)
//!   tsh -v       # Report every job added to the table
//!   tsh -h       # Usage

use std::env;
use std::process::ExitCode;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tsh_repl::{Invocation, USAGE};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("tsh: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    match tsh_repl::parse_args(env::args().skip(1)) {
        Invocation::Usage => {
            print!("{USAGE}");
            Ok(ExitCode::FAILURE)
        }
        Invocation::Run(config) => {
            let code = tsh_repl::run(config)?;
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
    }
}
