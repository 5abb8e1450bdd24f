//! Append-log reader: one growing file of CLH-framed records.
//!
//! Each record is a header line followed by exactly `size` payload bytes
//! and an optional newline separator:
//!
//! ```text
//! @CLH cp=20240101_080000_000000 ap=20240101_080001_000000 size=5 board=1.3
//! hello
//! ```
//!
//! `ap` is `-` when the producer had no AP clock. `board` is optional.
//! Bytes that do not form a header are skipped up to the next line that
//! carries the tag. A malformed header whose `size` still parses has its
//! payload stepped over when a tag or the end of the file follows it.
//!
//! A header whose payload runs past the end of the file is a write still
//! in progress and ends the scan quietly, unless another tag follows; then
//! the size is corrupt and the scan resumes at that tag.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use crate::{time::Time, warning::WarningSink};

use super::{Board, Location, LogRecordReader, RecordHeader, RecordScan, find_tag};

const TAG: &[u8] = b"@CLH ";

/// Longest header line accepted; longer lines are garbage.
const MAX_HEADER_LINE: u64 = 512;

/// Largest payload a producer writes; anything bigger is a corrupt size.
const MAX_PAYLOAD: u64 = 64 << 20;

pub struct AppendLogReader {
    root: PathBuf,
    file: &'static str,
}

impl AppendLogReader {
    pub fn new(root: PathBuf, file: &'static str) -> Self {
        Self { root, file }
    }
}

impl LogRecordReader for AppendLogReader {
    fn root(&self) -> &Path {
        &self.root
    }

    fn artifacts(&self, _warnings: &mut dyn WarningSink) -> io::Result<Vec<PathBuf>> {
        let path = self.root.join(self.file);
        match path.metadata() {
            Ok(meta) if meta.is_file() => Ok(vec![path]),
            Ok(_) => Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn scan(&self, artifact: &Path) -> io::Result<Box<dyn RecordScan>> {
        Ok(Box::new(ClhScan::open(artifact)?))
    }
}

/// Header scan over one CLH file.
struct ClhScan {
    reader: BufReader<File>,
    /// Offset of the reader's current position.
    pos: u64,
    /// File length when the scan was opened; later appends are ignored.
    len: u64,
    skipped: usize,
    resyncing: bool,
    error: Option<io::Error>,
    done: bool,
    line: Vec<u8>,
}

impl ClhScan {
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
            line: Vec::new(),
        })
    }

    /// Counts one skip per run of unusable bytes.
    fn skip(&mut self) {
        if !self.resyncing {
            self.skipped += 1;
            self.resyncing = true;
        }
    }

    /// Whether a tag starts anywhere in the rest of the file.
    fn tag_ahead(&mut self) -> io::Result<bool> {
        let found = find_tag(&mut self.reader, self.pos, TAG)?;
        self.reader.seek(SeekFrom::Start(self.pos))?;
        Ok(found.is_some_and(|at| at < self.len))
    }

    /// Steps over the payload of a malformed header when the bytes after it
    /// look like the next record or the end of the file.
    fn step_over_payload(&mut self, size: u64) -> io::Result<()> {
        let end = self.pos + size;
        if end > self.len {
            return Ok(());
        }
        self.reader.seek(SeekFrom::Start(end))?;
        let mut next = Vec::with_capacity(TAG.len() + 1);
        (&mut self.reader)
            .take((TAG.len() as u64 + 1).min(self.len - end))
            .read_to_end(&mut next)?;
        let after = next.strip_prefix(b"\n").unwrap_or(&next[..]);
        if after.is_empty() || after.starts_with(TAG) {
            self.pos = end;
        }
        self.reader.seek(SeekFrom::Start(self.pos))?;
        Ok(())
    }

    fn next_header(&mut self) -> io::Result<Option<RecordHeader>> {
        loop {
            if self.pos >= self.len {
                return Ok(None);
            }

            self.line.clear();
            let limit = MAX_HEADER_LINE.min(self.len - self.pos);
            let n = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.line)?;
            if n == 0 {
                return Ok(None);
            }
            self.pos += n as u64;

            if self.line.last() != Some(&b'\n') {
                if self.pos >= self.len {
                    // Header cut off by the end of the file.
                    return Ok(None);
                }
                self.skip();
                continue;
            }

            let Some(at) = find(&self.line, TAG) else {
                self.skip();
                continue;
            };
            if at > 0 {
                self.skip();
            }

            let fields = &self.line[at + TAG.len()..self.line.len() - 1];
            let Some((cp_time, ap_time, size, board)) = parse_fields(fields) else {
                let declared = declared_size(fields);
                self.resyncing = false;
                self.skip();
                if let Some(size) = declared {
                    self.step_over_payload(size)?;
                }
                continue;
            };

            let offset = self.pos;
            if offset + size > self.len {
                if !self.tag_ahead()? {
                    return Ok(None);
                }
                self.resyncing = false;
                self.skip();
                continue;
            }
            self.reader.seek_relative(i64::try_from(size).map_err(io::Error::other)?)?;
            self.pos += size;

            if self.pos < self.len && self.reader.fill_buf()?.first() == Some(&b'\n') {
                self.reader.consume(1);
                self.pos += 1;
            }

            self.resyncing = false;
            return Ok(Some(RecordHeader {
                cp_time,
                ap_time,
                board,
                location: Location::Span { offset, len: size },
            }));
        }
    }
}

impl Iterator for ClhScan {
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

impl RecordScan for ClhScan {
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

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parses `cp=<time> ap=<time|-> size=<n> [board=<sr>.<sl>]`.
///
/// Unknown keys are ignored. `cp` and `size` are mandatory.
fn parse_fields(fields: &[u8]) -> Option<(Time, Option<Time>, u64, Option<Board>)> {
    let text = std::str::from_utf8(fields).ok()?;

    let mut cp_time = None;
    let mut ap_time = None;
    let mut size = None;
    let mut board = None;

    for field in text.split_ascii_whitespace() {
        let (key, value) = field.split_once('=')?;
        match key {
            "cp" => cp_time = Some(Time::parse_compact(value)?),
            "ap" if value == "-" => ap_time = None,
            "ap" => ap_time = Some(Time::parse_compact(value)?),
            "size" => size = Some(value.parse::<u64>().ok().filter(|&s| s <= MAX_PAYLOAD)?),
            "board" => board = Some(value.parse().ok()?),
            _ => {}
        }
    }

    Some((cp_time?, ap_time, size?, board))
}

/// The `size` field alone, for stepping over the payload of a header that
/// failed to parse.
fn declared_size(fields: &[u8]) -> Option<u64> {
    std::str::from_utf8(fields)
        .ok()?
        .split_ascii_whitespace()
        .find_map(|field| field.strip_prefix("size="))?
        .parse()
        .ok()
        .filter(|&size| size <= MAX_PAYLOAD)
}

/// Frames one record the way producers write it.
#[cfg(test)]
pub(crate) fn encode_clh(
    cp_time: Time,
    ap_time: Option<Time>,
    board: Option<Board>,
    payload: &[u8],
) -> Vec<u8> {
    let ap = ap_time.map_or_else(|| "-".to_string(), |t| t.to_string());
    let mut header = format!("@CLH cp={cp_time} ap={ap} size={}", payload.len());
    if let Some(board) = board {
        header.push_str(&format!(" board={board}"));
    }
    header.push('\n');

    let mut out = header.into_bytes();
    out.extend_from_slice(payload);
    out.push(b'\n');
    out
}
