//! Built-in command names.

/// Commands the shell runs itself instead of launching a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Quit,
    Jobs,
    Bg,
    Fg,
}

impl Builtin {
    /// Exact match on `argv[0]`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "quit" => Some(Builtin::Quit),
            "jobs" => Some(Builtin::Jobs),
            "bg" => Some(Builtin::Bg),
            "fg" => Some(Builtin::Fg),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Quit => "quit",
            Builtin::Jobs => "jobs",
            Builtin::Bg => "bg",
            Builtin::Fg => "fg",
        }
    }
}
