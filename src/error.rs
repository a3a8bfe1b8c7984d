//! Error taxonomy surfaced to the shell.

use std::fmt;

/// Which store write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Add,
    Update,
    Toggle,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Toggle => "toggle",
            Self::Delete => "delete",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TodoError {
    /// A required field was empty. Never reaches the store.
    #[error("{0}")]
    Validation(&'static str),

    #[error("failed to load tasks: {0}")]
    Read(String),

    #[error("failed to {op} task: {reason}")]
    Write { op: WriteOp, reason: String },

    #[error("store did not generate a task id")]
    KeyGeneration,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("registration failed: {0}")]
    Registration(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("config error: {0}")]
    Config(String),
}

impl TodoError {
    pub(crate) fn read(err: anyhow::Error) -> Self {
        Self::Read(format!("{err:#}"))
    }

    pub(crate) fn write(op: WriteOp, err: anyhow::Error) -> Self {
        Self::Write {
            op,
            reason: format!("{err:#}"),
        }
    }

    /// Short transient message for the user. Detail stays in `Display`.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(msg) => msg,
            Self::Read(_) => "Error loading tasks",
            Self::Write { op, .. } => match op {
                WriteOp::Add => "Error adding task",
                WriteOp::Update => "Error updating task",
                WriteOp::Toggle => "Error updating task",
                WriteOp::Delete => "Error deleting task",
            },
            Self::KeyGeneration => "Error generating task id",
            Self::Auth(_) => "Authentication failed",
            Self::Registration(_) => "Registration failed",
            Self::NotSignedIn => "Please sign in first",
            Self::Config(_) => "Invalid configuration",
        }
    }
}

pub type Result<T> = std::result::Result<T, TodoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_errors_keep_the_cause() {
        let err = TodoError::write(WriteOp::Delete, anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "failed to delete task: disk full");
        assert_eq!(err.user_message(), "Error deleting task");
    }

    #[test]
    fn validation_message_is_the_user_message() {
        let err = TodoError::Validation("Title cannot be empty");
        assert_eq!(err.to_string(), err.user_message());
    }
}
