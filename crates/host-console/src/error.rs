use host_common::error::HostError;
use thiserror::Error;

/// Errors that abort a console line.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConsoleError {
    /// Malformed input.
    #[error("syntax: {0}")]
    Syntax(String),

    /// Name is neither a function nor a stored macro.
    #[error("unknown name '{0}'")]
    UnknownName(String),

    /// Macros called macros too deeply.
    #[error("recursion deeper than {0}")]
    RecursionLimit(usize),

    /// Every task slot is in use.
    #[error("too many tasks (max {0})")]
    TooManyTasks(usize),

    /// Failure reported by the host services.
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Result type for console operations.
pub type ConsoleResult<T> = Result<T, ConsoleError>;

impl ConsoleError {
    pub(crate) fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }
}
