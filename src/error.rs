use std::fmt;
use std::io;

use crate::process::ExitStatus;

/// Which of the child's output pipes an I/O error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Failures of a git invocation.
///
/// `Spawn` is returned synchronously by whoever starts the process. Every
/// other kind is delivered exactly once through a completion callback.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{message}")]
    Exit { status: ExitStatus, message: String },

    #[error("error reading git {stream}: {source}")]
    Read {
        stream: StreamKind,
        #[source]
        source: io::Error,
    },

    #[error("error waiting for git: {0}")]
    Wait(#[source] io::Error),

    #[error("malformed git output at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

impl GitError {
    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        GitError::Parse {
            line,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
