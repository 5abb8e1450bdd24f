//! Error taxonomy shared by every command.
//!
//! Each error maps to one [`ErrorKind`] and a stable process exit code.
//! Recoverable per-log conditions (reversed record windows, corrupt
//! files) are not errors here: they travel as result variants and
//! warnings so the caller can carry on with the remaining log types.

use std::{io, path::PathBuf};

use crate::time::TimeError;

/// Coarse classification of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or contradictory invocation.
    Usage,
    /// A CP, log type, or endpoint name does not resolve.
    NotFound,
    /// A valid name that does not apply to this CP.
    NotApplicable,
    /// Filesystem or subprocess failure.
    SystemIo,
    /// Another transfer holds the destination.
    AlreadyRunning,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Usage => 2,
            Self::NotFound => 3,
            Self::NotApplicable => 4,
            Self::SystemIo => 5,
            Self::AlreadyRunning => 6,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error("CP not defined: {0}")]
    UnknownCp(String),

    #[error("unknown log type: {0}")]
    UnknownLogType(String),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("log type {log} is not applicable to {cp}")]
    LogTypeNotApplicable { log: String, cp: String },

    #[error("CP {0} has no MAUS endpoints")]
    EndpointsNotApplicable(String),

    #[error("log type {0} does not take an endpoint")]
    IllegalEndpointForLogType(String),

    #[error("log type {0} requires an endpoint")]
    MissingEndpointForLogType(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("archiver failed: {0}")]
    Archive(String),

    #[error("invalid config at {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error("another transfer is already running (lock {})", .0.display())]
    AlreadyRunning(PathBuf),
}

impl LogError {
    /// Wraps an I/O error with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Usage(_)
            | Self::Time(_)
            | Self::IllegalEndpointForLogType(_)
            | Self::MissingEndpointForLogType(_) => ErrorKind::Usage,
            Self::UnknownCp(_) | Self::UnknownLogType(_) | Self::UnknownEndpoint(_) => {
                ErrorKind::NotFound
            }
            Self::LogTypeNotApplicable { .. } | Self::EndpointsNotApplicable(_) => {
                ErrorKind::NotApplicable
            }
            Self::Io { .. } | Self::Archive(_) | Self::Config { .. } => ErrorKind::SystemIo,
            Self::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}
