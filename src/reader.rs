//! Log record readers, one per storage layout.
//!
//! A reader knows where a log's physical artifacts are and how to scan
//! record headers out of each one. Scanning is header-only and lazy:
//! payloads are fetched on demand, so finding the first and last record
//! of an arbitrarily large append-log never loads the file into memory.
//!
//! Within one artifact, records come back in storage order, which the
//! producers keep non-decreasing in CP time. Ordering across rotated
//! artifacts (including generation wrap) is resolved by the caller.

mod append;
mod event_group;
mod rotating;

use std::{
    fmt,
    fs::File,
    io::{self, BufRead, BufReader, Seek, SeekFrom},
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{catalog::Layout, time::Time, warning::WarningSink};

use append::AppendLogReader;
use event_group::{EntryKind, EventGroupReader};
use rotating::RotatingReader;

#[cfg(test)]
pub(crate) use append::encode_clh;
#[cfg(test)]
pub(crate) use rotating::encode_tesrv;

/// Physical board address carried by hardware-originated records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Board {
    pub subrack: u8,
    pub slot: u8,
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.subrack, self.slot)
    }
}

impl FromStr for Board {
    type Err = String;

    /// Parses `<subrack>.<slot>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (subrack, slot) = s
            .split_once('.')
            .ok_or_else(|| format!("invalid board '{s}', expected <subrack>.<slot>"))?;
        Ok(Self {
            subrack: subrack
                .parse()
                .map_err(|_| format!("invalid subrack in '{s}'"))?,
            slot: slot.parse().map_err(|_| format!("invalid slot in '{s}'"))?,
        })
    }
}

/// Where a record's payload lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// A byte range inside the artifact.
    Span { offset: u64, len: u64 },
    /// The artifact itself is the record.
    Whole,
}

/// Metadata of one record, without its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub cp_time: Time,
    pub ap_time: Option<Time>,
    pub board: Option<Board>,
    pub location: Location,
}

/// One emitted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub cp_time: Time,
    pub ap_time: Option<Time>,
    pub payload: Vec<u8>,
    pub path: PathBuf,
}

/// A lazy header scan over one artifact.
///
/// Iteration ends silently at end of file, including a truncated record
/// left by a producer that is still appending. Hard read errors also end
/// iteration and are kept for [`RecordScan::take_error`].
pub trait RecordScan: Iterator<Item = RecordHeader> {
    /// Corrupt candidates skipped so far.
    fn skipped(&self) -> usize;

    /// The I/O error that ended the scan, if any.
    fn take_error(&mut self) -> Option<io::Error>;

    /// Reads the payload of a header produced by this scan.
    fn payload(&mut self, header: &RecordHeader) -> io::Result<Vec<u8>>;
}

/// Capability shared by every storage layout.
pub trait LogRecordReader {
    /// Directory the log lives in.
    fn root(&self) -> &Path;

    /// Physical artifacts in generation order. A missing root is empty.
    fn artifacts(&self, warnings: &mut dyn WarningSink) -> io::Result<Vec<PathBuf>>;

    /// Opens a header scan over one artifact. Re-opening restarts it.
    fn scan(&self, artifact: &Path) -> io::Result<Box<dyn RecordScan>>;

    /// Whether generation numbers can wrap, so that artifact order needs
    /// correcting from timestamps.
    fn generations_may_wrap(&self) -> bool {
        false
    }
}

/// Builds the reader for a layout, rooted at the log's resolved directory.
pub fn reader_for(layout: Layout, root: PathBuf) -> Box<dyn LogRecordReader> {
    match layout {
        Layout::AppendLog { file } => Box::new(AppendLogReader::new(root, file)),
        Layout::Rotating { base } => Box::new(RotatingReader::new(root, base)),
        Layout::EventFiles { prefix } => {
            Box::new(EventGroupReader::new(root, prefix, EntryKind::File))
        }
        Layout::CrashDirectories { prefix } => {
            Box::new(EventGroupReader::new(root, prefix, EntryKind::Directory))
        }
    }
}

/// Lists a directory, treating a missing directory as empty.
fn read_dir_or_empty(root: &Path) -> io::Result<Vec<std::fs::DirEntry>> {
    match std::fs::read_dir(root) {
        Ok(entries) => entries.collect(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Finds the next `tag` at or after `from`, leaving the reader there.
fn find_tag(reader: &mut BufReader<File>, from: u64, tag: &[u8]) -> io::Result<Option<u64>> {
    reader.seek(SeekFrom::Start(from))?;
    let mut base = from;
    let mut window = Vec::new();
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            return Ok(None);
        }
        let n = chunk.len();
        window.extend_from_slice(chunk);
        reader.consume(n);

        if let Some(i) = window.windows(tag.len()).position(|w| w == tag) {
            let at = base + i as u64;
            reader.seek(SeekFrom::Start(at))?;
            return Ok(Some(at));
        }

        // Keep a tail in case the tag straddles two chunks.
        let keep_from = window.len().saturating_sub(tag.len() - 1);
        base += keep_from as u64;
        window.drain(..keep_from);
    }
}
