//! Rotating binary log reader: `<base>.<generation>` files of TESRV records.
//!
//! Record layout, all integers big-endian:
//!
//! ```text
//! "TESRV" | cp time: i64 µs since 1970-01-01 | size: u64 | 0x0A | payload[size]
//! ```
//!
//! A candidate with a bad terminator, an unrepresentable time, or an
//! implausible size is skipped by searching for the next tag. So is a
//! payload that runs past the end of the file while another tag follows
//! it; with no later tag it is a write in progress and ends the scan
//! quietly.

use std::{
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use crate::{time::Time, warning::WarningSink};

use super::{Location, LogRecordReader, RecordHeader, RecordScan, find_tag, read_dir_or_empty};

const TAG: &[u8; 5] = b"TESRV";
const TERMINATOR: u8 = 0x0A;
const HEADER_LEN: u64 = 22;
const MAX_PAYLOAD: u64 = 64 << 20;

pub struct RotatingReader {
    root: PathBuf,
    base: &'static str,
}

impl RotatingReader {
    pub fn new(root: PathBuf, base: &'static str) -> Self {
        Self { root, base }
    }

    /// Generation number of a file named `<base>.<digits>`.
    fn generation(&self, name: &str) -> Option<u64> {
        let digits = name.strip_prefix(self.base)?.strip_prefix('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl LogRecordReader for RotatingReader {
    fn root(&self) -> &Path {
        &self.root
    }

    fn artifacts(&self, _warnings: &mut dyn WarningSink) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in read_dir_or_empty(&self.root)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(generation) = self.generation(&name) else {
                tracing::debug!(file = %name, "not a generation file, ignored");
                continue;
            };
            if entry.file_type()?.is_file() {
                files.push((generation, entry.path()));
            }
        }
        files.sort();
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    fn scan(&self, artifact: &Path) -> io::Result<Box<dyn RecordScan>> {
        Ok(Box::new(TesrvScan::open(artifact)?))
    }

    fn generations_may_wrap(&self) -> bool {
        true
    }
}

struct TesrvScan {
    reader: BufReader<File>,
    /// Offset of the reader's current position.
    pos: u64,
    len: u64,
    skipped: usize,
    resyncing: bool,
    error: Option<io::Error>,
    done: bool,
}

impl TesrvScan {
    fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            pos: 0,
            len,
            skipped: 0,
            resyncing: false,
            error: None,
            done: false,
        })
    }

    /// Counts one skip per run of unusable bytes.
    fn skip(&mut self) {
        if !self.resyncing {
            self.skipped += 1;
            self.resyncing = true;
        }
    }

    /// Offset of the next tag after the current candidate, within the
    /// length seen at open.
    fn next_tag(&mut self) -> io::Result<Option<u64>> {
        let len = self.len;
        Ok(find_tag(&mut self.reader, self.pos + 1, TAG)?.filter(|&at| at < len))
    }

    fn next_header(&mut self) -> io::Result<Option<RecordHeader>> {
        loop {
            if self.pos + HEADER_LEN > self.len {
                return Ok(None);
            }

            let mut head = [0u8; HEADER_LEN as usize];
            self.reader.read_exact(&mut head)?;

            if let Some((cp_time, size)) = decode_header(&head) {
                let offset = self.pos + HEADER_LEN;
                if offset + size > self.len {
                    let Some(at) = self.next_tag()? else {
                        return Ok(None);
                    };
                    self.resyncing = false;
                    self.skip();
                    self.pos = at;
                    continue;
                }
                self.reader.seek_relative(i64::try_from(size).map_err(io::Error::other)?)?;
                self.pos = offset + size;
                self.resyncing = false;
                return Ok(Some(RecordHeader {
                    cp_time,
                    ap_time: None,
                    board: None,
                    location: Location::Span { offset, len: size },
                }));
            }

            self.skip();
            match self.next_tag()? {
                Some(at) => self.pos = at,
                None => return Ok(None),
            }
        }
    }
}

/// Validates a fixed-size header, returning CP time and payload size.
fn decode_header(head: &[u8; HEADER_LEN as usize]) -> Option<(Time, u64)> {
    if &head[..5] != TAG || head[21] != TERMINATOR {
        return None;
    }
    let micros = i64::from_be_bytes(head[5..13].try_into().ok()?);
    let size = u64::from_be_bytes(head[13..21].try_into().ok()?);
    if size > MAX_PAYLOAD {
        return None;
    }
    Some((Time::from_epoch_micros(micros)?, size))
}

impl Iterator for TesrvScan {
    type Item = RecordHeader;

    fn next(&mut self) -> Option<RecordHeader> {
        if self.done {
            return None;
        }
        match self.next_header() {
            Ok(Some(header)) => Some(header),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                self.error = Some(e);
                None
            }
        }
    }
}

impl RecordScan for TesrvScan {
    fn skipped(&self) -> usize {
        self.skipped
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    fn payload(&mut self, header: &RecordHeader) -> io::Result<Vec<u8>> {
        let Location::Span { offset, len } = header.location else {
            return Ok(Vec::new());
        };
        let mut buf = vec![0; usize::try_from(len).map_err(io::Error::other)?];
        self.reader.seek(SeekFrom::Start(offset))?;
        self.reader.read_exact(&mut buf)?;
        self.reader.seek(SeekFrom::Start(self.pos))?;
        Ok(buf)
    }
}

/// Frames one record the way producers write it.
#[cfg(test)]
pub(crate) fn encode_tesrv(cp_time: Time, payload: &[u8]) -> Vec<u8> {
    let mut out = TAG.to_vec();
    out.extend_from_slice(&cp_time.to_epoch_micros().to_be_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    out.push(TERMINATOR);
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    use crate::{time::t, warning::Warning};

    fn scan_bytes(bytes: &[u8]) -> (Vec<(Time, Vec<u8>)>, usize) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.0001");
        fs::write(&path, bytes).unwrap();

        let mut scan = TesrvScan::open(&path).unwrap();
        let mut out = Vec::new();
        while let Some(header) = scan.next() {
            let payload = scan.payload(&header).unwrap();
            out.push((header.cp_time, payload));
        }
        assert!(scan.take_error().is_none());
        (out, scan.skipped())
    }

    #[test]
    fn reads_concatenated_records() {
        let mut bytes = encode_tesrv(t("20240101_080000"), b"one");
        bytes.extend(encode_tesrv(t("20240101_080001_500000"), b""));
        bytes.extend(encode_tesrv(t("20240101_080002"), b"three"));

        let (records, skipped) = scan_bytes(&bytes);

        assert_eq!(skipped, 0);
        assert_eq!(
            records,
            [
                (t("20240101_080000"), b"one".to_vec()),
                (t("20240101_080001_500000"), Vec::new()),
                (t("20240101_080002"), b"three".to_vec()),
            ]
        );
    }

    #[test]
    fn missing_terminator_skips_to_next_tag() {
        let mut broken = encode_tesrv(t("20240101_080000"), b"bad");
        broken[21] = 0xEE;
        let mut bytes = broken;
        bytes.extend(encode_tesrv(t("20240101_080001"), b"good"));

        let (records, skipped) = scan_bytes(&bytes);

        assert_eq!(records, [(t("20240101_080001"), b"good".to_vec())]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn implausible_size_skips_to_next_tag() {
        let mut broken = encode_tesrv(t("20240101_080000"), b"bad");
        broken[13..21].copy_from_slice(&u64::MAX.to_be_bytes());
        let mut bytes = b"junk".to_vec();
        bytes.extend(broken);
        bytes.extend(encode_tesrv(t("20240101_080001"), b"good"));

        let (records, skipped) = scan_bytes(&bytes);

        assert_eq!(records, [(t("20240101_080001"), b"good".to_vec())]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn payload_past_end_of_file_ends_quietly() {
        let mut bytes = encode_tesrv(t("20240101_080000"), b"kept");
        let tail = encode_tesrv(t("20240101_080001"), b"half written");
        bytes.extend_from_slice(&tail[..tail.len() - 5]);

        let (records, skipped) = scan_bytes(&bytes);

        assert_eq!(records, [(t("20240101_080000"), b"kept".to_vec())]);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn oversized_payload_followed_by_records_skips_to_next_tag() {
        let mut broken = encode_tesrv(t("20240102_000000"), b"lost");
        broken[13..21].copy_from_slice(&4096u64.to_be_bytes());
        let mut bytes = encode_tesrv(t("20240101_000000"), b"one");
        bytes.extend(broken);
        bytes.extend(encode_tesrv(t("20240103_000000"), b"three"));
        bytes.extend(encode_tesrv(t("20240104_000000"), b"four"));

        let (records, skipped) = scan_bytes(&bytes);

        assert_eq!(
            records,
            [
                (t("20240101_000000"), b"one".to_vec()),
                (t("20240103_000000"), b"three".to_vec()),
                (t("20240104_000000"), b"four".to_vec()),
            ]
        );
        assert_eq!(skipped, 1);
    }

    #[test]
    fn partial_header_at_end_is_ignored() {
        let mut bytes = encode_tesrv(t("20240101_080000"), b"kept");
        bytes.extend_from_slice(b"TESRV\x00\x00");

        let (records, skipped) = scan_bytes(&bytes);

        assert_eq!(records.len(), 1);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn file_of_garbage_yields_nothing() {
        let (records, skipped) = scan_bytes(&[0x55; 100]);

        assert!(records.is_empty());
        assert_eq!(skipped, 1);
    }

    #[test]
    fn artifacts_sorted_by_generation_number() {
        let dir = TempDir::new().unwrap();
        for name in ["trace.10", "trace.2", "trace.0001", "trace.tmp", "other.3"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let reader = RotatingReader::new(dir.path().to_path_buf(), "trace");
        let mut warnings: Vec<Warning> = Vec::new();

        let names: Vec<_> = reader
            .artifacts(&mut warnings)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, ["trace.0001", "trace.2", "trace.10"]);
        assert!(warnings.is_empty());
    }
}
