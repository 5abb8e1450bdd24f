//! Non-fatal warnings raised while scanning logs.
//!
//! Partial corruption never aborts a command. Every affected artifact
//! produces exactly one warning through a [`WarningSink`], and the
//! artifact (or the bad records in it) is left out of the results.

use std::{fmt, path::PathBuf};

use crate::time::StartGreaterThanStop;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The artifact could not be opened or read; it is excluded.
    UnreadableArtifact { path: PathBuf, reason: String },

    /// Some records could not be parsed and were skipped.
    CorruptRecords { path: PathBuf, skipped: usize },

    /// Nothing in the file parsed as a record; it is excluded.
    NoReadableRecords { path: PathBuf },

    /// An event file or crash directory name carries no timestamp.
    UnparseableName { path: PathBuf },

    /// A whole log came back in reversed order and was left out.
    ReversedLog {
        log: String,
        detail: StartGreaterThanStop,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnreadableArtifact { path, reason } => {
                write!(f, "cannot read {}: {reason}", path.display())
            }
            Self::CorruptRecords { path, skipped } => {
                write!(f, "skipped {skipped} corrupt record(s) in {}", path.display())
            }
            Self::NoReadableRecords { path } => {
                write!(f, "no readable records in {}", path.display())
            }
            Self::UnparseableName { path } => {
                write!(f, "no timestamp in name of {}", path.display())
            }
            Self::ReversedLog { log, detail } => write!(f, "{log}: {detail}"),
        }
    }
}

/// Receiver for warnings. Part of every scanning operation's contract.
pub trait WarningSink {
    fn warn(&mut self, warning: Warning);
}

impl WarningSink for Vec<Warning> {
    fn warn(&mut self, warning: Warning) {
        self.push(warning);
    }
}

/// Prints warnings to stderr and mirrors them as tracing events.
#[derive(Debug, Default)]
pub struct TerminalWarnings {
    count: usize,
}

impl TerminalWarnings {
    pub fn count(&self) -> usize {
        self.count
    }
}

impl WarningSink for TerminalWarnings {
    fn warn(&mut self, warning: Warning) {
        self.count += 1;
        tracing::warn!(%warning, "scan warning");
        eprintln!("Warning: {warning}");
    }
}
