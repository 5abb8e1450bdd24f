//! Event groups: each file (core dump) or directory (crash dump) is one record.
//!
//! The record's CP time comes from the timestamp embedded in the entry
//! name right after the group prefix, e.g. `core_cpub_20240101_080000.dmp`
//! or `crash_cpbb_20240101_080000_000123/`. File contents are never
//! parsed. There is no AP time.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use ignore::WalkBuilder;

use crate::{
    time::Time,
    warning::{Warning, WarningSink},
};

use super::{Location, LogRecordReader, RecordHeader, RecordScan, read_dir_or_empty};

/// What kind of directory entry forms one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

pub struct EventGroupReader {
    root: PathBuf,
    prefix: &'static str,
    kind: EntryKind,
}

impl EventGroupReader {
    pub fn new(root: PathBuf, prefix: &'static str, kind: EntryKind) -> Self {
        Self { root, prefix, kind }
    }

    fn timestamp(&self, path: &Path) -> Option<Time> {
        let name = path.file_name()?.to_str()?;
        let (time, _) = Time::parse_prefix(name.strip_prefix(self.prefix)?)?;
        Some(time)
    }
}

impl LogRecordReader for EventGroupReader {
    fn root(&self) -> &Path {
        &self.root
    }

    /// Entries with the group prefix, oldest first.
    ///
    /// Entries whose name has the prefix but no readable timestamp are
    /// reported and left out.
    fn artifacts(&self, warnings: &mut dyn WarningSink) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in read_dir_or_empty(&self.root)? {
            let file_type = entry.file_type()?;
            let matches_kind = match self.kind {
                EntryKind::File => file_type.is_file(),
                EntryKind::Directory => file_type.is_dir(),
            };
            if !matches_kind || !entry.file_name().to_string_lossy().starts_with(self.prefix) {
                continue;
            }

            let path = entry.path();
            match self.timestamp(&path) {
                Some(time) => entries.push((time, path)),
                None => warnings.warn(Warning::UnparseableName { path }),
            }
        }
        entries.sort();
        Ok(entries.into_iter().map(|(_, path)| path).collect())
    }

    fn scan(&self, artifact: &Path) -> io::Result<Box<dyn RecordScan>> {
        let cp_time = self.timestamp(artifact).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no timestamp in {}", artifact.display()),
            )
        })?;
        Ok(Box::new(EntryScan {
            path: artifact.to_path_buf(),
            kind: self.kind,
            header: Some(RecordHeader {
                cp_time,
                ap_time: None,
                board: None,
                location: Location::Whole,
            }),
        }))
    }
}

/// Single-record scan over one event entry.
struct EntryScan {
    path: PathBuf,
    kind: EntryKind,
    header: Option<RecordHeader>,
}

impl Iterator for EntryScan {
    type Item = RecordHeader;

    fn next(&mut self) -> Option<RecordHeader> {
        self.header.take()
    }
}

impl RecordScan for EntryScan {
    fn skipped(&self) -> usize {
        0
    }

    fn take_error(&mut self) -> Option<io::Error> {
        None
    }

    /// A one-line summary of the entry; dump contents are not streamed.
    fn payload(&mut self, _header: &RecordHeader) -> io::Result<Vec<u8>> {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let summary = match self.kind {
            EntryKind::File => format!("{name}  {} bytes", fs::metadata(&self.path)?.len()),
            EntryKind::Directory => {
                let (files, bytes) = directory_usage(&self.path);
                format!("{name}/  {files} file(s), {bytes} bytes")
            }
        };
        Ok(summary.into_bytes())
    }
}

/// Counts regular files and their total size below `dir`.
fn directory_usage(dir: &Path) -> (usize, u64) {
    WalkBuilder::new(dir)
        .standard_filters(false)
        .build()
        .flatten()
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
        .fold((0, 0), |(files, bytes), e| {
            let size = e.metadata().map(|m| m.len()).unwrap_or(0);
            (files + 1, bytes + size)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::time::t;

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn core_files_sorted_by_embedded_time() {
        let dir = TempDir::new().unwrap();
        for name in [
            "core_cpub_20240102_000000.dmp",
            "core_cpub_20240101_120000_000001",
            "core_cpbb_20231231_000000.dmp",
            "readme.txt",
        ] {
            fs::write(dir.path().join(name), b"dump").unwrap();
        }
        fs::create_dir(dir.path().join("core_cpub_20240103_000000")).unwrap();

        let reader = EventGroupReader::new(dir.path().to_path_buf(), "core_cpub_", EntryKind::File);
        let mut warnings: Vec<Warning> = Vec::new();
        let artifacts = reader.artifacts(&mut warnings).unwrap();

        assert_eq!(
            names(&artifacts),
            ["core_cpub_20240101_120000_000001", "core_cpub_20240102_000000.dmp"]
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn unparseable_names_warn_and_are_excluded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("core_cpub_garbage"), b"").unwrap();
        fs::write(dir.path().join("core_cpub_20240101_000000"), b"").unwrap();

        let reader = EventGroupReader::new(dir.path().to_path_buf(), "core_cpub_", EntryKind::File);
        let mut warnings: Vec<Warning> = Vec::new();
        let artifacts = reader.artifacts(&mut warnings).unwrap();

        assert_eq!(names(&artifacts), ["core_cpub_20240101_000000"]);
        assert_eq!(
            warnings,
            [Warning::UnparseableName {
                path: dir.path().join("core_cpub_garbage")
            }]
        );
    }

    #[test]
    fn crash_directory_is_one_record() {
        let dir = TempDir::new().unwrap();
        let crash = dir.path().join("crash_20240101_080000");
        fs::create_dir_all(crash.join("sub")).unwrap();
        fs::write(crash.join("a.txt"), b"12345").unwrap();
        fs::write(crash.join("sub").join("b.bin"), b"123").unwrap();

        let reader = EventGroupReader::new(dir.path().to_path_buf(), "crash_", EntryKind::Directory);
        let mut warnings: Vec<Warning> = Vec::new();
        let artifacts = reader.artifacts(&mut warnings).unwrap();
        assert_eq!(artifacts, [crash.clone()]);

        let mut scan = reader.scan(&crash).unwrap();
        let header = scan.next().unwrap();
        assert!(scan.next().is_none());
        assert_eq!(header.cp_time, t("20240101_080000"));
        assert_eq!(header.location, Location::Whole);

        let payload = scan.payload(&header).unwrap();
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            "crash_20240101_080000/  2 file(s), 8 bytes"
        );
    }
}
