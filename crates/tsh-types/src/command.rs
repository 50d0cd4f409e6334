//! Parsed command line handed from the tokenizer to the job-control core.

use std::fmt;

/// Which standard stream a redirection rewires, and how the target is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `< path`: stdin from a file.
    Stdin,
    /// `> path`: stdout to a file, truncating.
    Stdout,
    /// `>> path`: stdout to a file, appending.
    Append,
    /// `2> path`: stderr to a file, truncating.
    Stderr,
}

impl RedirectKind {
    /// File descriptor replaced in the child.
    pub fn target_fd(self) -> i32 {
        match self {
            RedirectKind::Stdin => 0,
            RedirectKind::Stdout | RedirectKind::Append => 1,
            RedirectKind::Stderr => 2,
        }
    }
}

impl fmt::Display for RedirectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectKind::Stdin => write!(f, "<"),
            RedirectKind::Stdout => write!(f, ">"),
            RedirectKind::Append => write!(f, ">>"),
            RedirectKind::Stderr => write!(f, "2>"),
        }
    }
}

/// A single I/O redirection applied in the child before exec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub path: String,
}

impl Redirect {
    pub fn new(kind: RedirectKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// One external command: argument vector, background flag and redirections.
///
/// The trailing `&` has already been stripped from `argv` and recorded in
/// `background`. A pipeline is the head command plus the stages in
/// `pipeline`, each reading the previous stage's stdout; the whole pipeline
/// is one job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub background: bool,
    pub redirects: Vec<Redirect>,
    pub pipeline: Vec<CommandSpec>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            background: false,
            redirects: Vec::new(),
            pipeline: Vec::new(),
        }
    }

    pub fn in_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn with_redirect(mut self, redirect: Redirect) -> Self {
        self.redirects.push(redirect);
        self
    }

    /// Append a stage reading this command's (or the last stage's) stdout.
    pub fn pipe_into(mut self, stage: CommandSpec) -> Self {
        self.pipeline.push(stage);
        self
    }

    /// Every stage in order, starting with this command.
    pub fn stages(&self) -> impl Iterator<Item = &CommandSpec> {
        std::iter::once(self).chain(&self.pipeline)
    }

    /// The command name (`argv[0]`).
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_start_with_the_head() {
        let spec = CommandSpec::new(["sleep", "30"])
            .pipe_into(CommandSpec::new(["cat"]))
            .pipe_into(CommandSpec::new(["wc", "-l"]));
        let programs: Vec<_> = spec.stages().filter_map(CommandSpec::program).collect();
        assert_eq!(programs, vec!["sleep", "cat", "wc"]);
        assert_eq!(CommandSpec::new(["ls"]).stages().count(), 1);
    }
}
