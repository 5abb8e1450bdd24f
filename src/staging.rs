//! Transfer staging: temp directory lifecycle, archiving, and the transfer lock.
//!
//! A [`Staging`] owns a fresh temp directory for one transfer. Matching
//! artifacts are copied into per-log subdirectories, an external
//! [`Archiver`] packs them into one archive, and the archive is moved to
//! its destination. The temp directory is removed when the `Staging` is
//! finalized or dropped, whether the transfer succeeded or not.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    process::Command,
};

use ignore::WalkBuilder;
use tempfile::TempDir;

use crate::error::LogError;

/// Name of the archive inside the staging directory.
const ARCHIVE_NAME: &str = "archive.zip";

const LOCK_NAME: &str = ".cplog-transfer.lock";

/// Packs staged entries into one archive.
pub trait Archiver {
    /// Archives `entries` (relative to `workdir`) into `output`.
    fn archive(&self, workdir: &Path, entries: &[PathBuf], output: &Path) -> Result<(), LogError>;
}

/// Archives by running an external zip-compatible program.
#[derive(Debug, Clone)]
pub struct ZipCommand {
    program: String,
}

impl ZipCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Archiver for ZipCommand {
    fn archive(&self, workdir: &Path, entries: &[PathBuf], output: &Path) -> Result<(), LogError> {
        tracing::info!(program = %self.program, entries = entries.len(), "running archiver");

        let result = Command::new(&self.program)
            .arg("-r")
            .arg("-q")
            .arg(output)
            .args(entries)
            .current_dir(workdir)
            .output()
            .map_err(|e| LogError::Archive(format!("failed to run {}: {e}", self.program)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(LogError::Archive(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Temp directory holding the files of one transfer.
pub struct Staging {
    dir: TempDir,
    /// Top-level entries, relative to the staging directory.
    entries: Vec<PathBuf>,
}

impl Staging {
    /// Creates a fresh staging directory under `parent`.
    pub fn begin(parent: &Path) -> Result<Self, LogError> {
        fs::create_dir_all(parent)
            .map_err(|e| LogError::io(format!("cannot create {}", parent.display()), e))?;
        let dir = tempfile::Builder::new()
            .prefix("cplog-")
            .tempdir_in(parent)
            .map_err(|e| LogError::io("cannot create staging directory", e))?;
        let staging = Self {
            dir,
            entries: Vec::new(),
        };
        tracing::debug!(dir = %staging.path().display(), "staging started");
        Ok(staging)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies a file or directory into the `group` subdirectory.
    ///
    /// The original entry name is kept. Returns the group directory.
    pub fn stage(&mut self, group: &str, source: &Path) -> Result<PathBuf, LogError> {
        let group_dir = self.dir.path().join(group);
        let name = source.file_name().ok_or_else(|| {
            LogError::Usage(format!("cannot stage {}: no file name", source.display()))
        })?;
        let target = group_dir.join(name);

        let copied = if source.is_dir() {
            copy_tree(source, &target)
        } else {
            fs::create_dir_all(&group_dir).and_then(|()| fs::copy(source, &target).map(drop))
        };
        copied.map_err(|e| LogError::io(format!("cannot stage {}", source.display()), e))?;

        let relative = PathBuf::from(group);
        if !self.entries.contains(&relative) {
            self.entries.push(relative);
        }
        Ok(group_dir)
    }

    /// Archives everything staged and moves the archive to `destination`.
    ///
    /// Returns `None` without running the archiver when nothing was
    /// staged. The staging directory is gone when this returns.
    pub fn finalize(
        self,
        archiver: &dyn Archiver,
        destination: &Path,
    ) -> Result<Option<PathBuf>, LogError> {
        if self.is_empty() {
            return Ok(None);
        }

        let output = self.dir.path().join(ARCHIVE_NAME);
        archiver.archive(self.dir.path(), &self.entries, &output)?;
        if !output.is_file() {
            return Err(LogError::Archive(format!(
                "archiver produced no {ARCHIVE_NAME}"
            )));
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LogError::io(format!("cannot create {}", parent.display()), e))?;
        }
        move_file(&output, destination)
            .map_err(|e| LogError::io(format!("cannot move archive to {}", destination.display()), e))?;

        self.dir
            .close()
            .map_err(|e| LogError::io("cannot remove staging directory", e))?;
        Ok(Some(destination.to_path_buf()))
    }
}

/// Recursively copies `source` to `target`.
fn copy_tree(source: &Path, target: &Path) -> io::Result<()> {
    for entry in WalkBuilder::new(source).standard_filters(false).build() {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let dest = target.join(relative);
        if entry.file_type().is_some_and(|ft| ft.is_dir()) {
            fs::create_dir_all(&dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Renames, falling back to copy and remove across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

/// Exclusive claim on a transfer destination, released on drop.
#[derive(Debug)]
pub struct TransferLock {
    path: PathBuf,
}

impl TransferLock {
    /// Claims `dir` for one transfer. Fails if another transfer holds it.
    pub fn acquire(dir: &Path) -> Result<Self, LogError> {
        fs::create_dir_all(dir)
            .map_err(|e| LogError::io(format!("cannot create {}", dir.display()), e))?;
        let path = dir.join(LOCK_NAME);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Dropping the claim on a failed write removes the file again.
                let lock = Self { path };
                // Owner pid, for operators clearing a stale lock.
                writeln!(file, "{}", std::process::id()).map_err(|e| {
                    LogError::io(format!("cannot write {}", lock.path.display()), e)
                })?;
                Ok(lock)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(LogError::AlreadyRunning(path))
            }
            Err(e) => Err(LogError::io(format!("cannot create {}", path.display()), e)),
        }
    }
}

impl Drop for TransferLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release transfer lock");
        }
    }
}

/// Test archiver that writes a listing instead of a real archive.
#[cfg(test)]
pub(crate) struct RecordingArchiver {
    pub calls: std::cell::RefCell<Vec<Vec<PathBuf>>>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingArchiver {
    pub fn new() -> Self {
        Self {
            calls: std::cell::RefCell::new(Vec::new()),
            fail: false,
        }
    }
}

#[cfg(test)]
impl Archiver for RecordingArchiver {
    fn archive(&self, workdir: &Path, entries: &[PathBuf], output: &Path) -> Result<(), LogError> {
        self.calls.borrow_mut().push(entries.to_vec());
        if self.fail {
            return Err(LogError::Archive("simulated failure".into()));
        }
        let mut listing = String::new();
        for entry in entries {
            for file in WalkBuilder::new(workdir.join(entry))
                .standard_filters(false)
                .sort_by_file_name(Ord::cmp)
                .build()
                .flatten()
            {
                if file.file_type().is_some_and(|ft| ft.is_file()) {
                    let rel = file.path().strip_prefix(workdir).unwrap();
                    listing.push_str(&format!("{}\n", rel.display()));
                }
            }
        }
        fs::write(output, listing).unwrap();
        Ok(())
    }
}
