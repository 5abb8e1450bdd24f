//! Output formatting for CLI display.

use std::io::{self, Write};

use serde::Serialize;

use crate::catalog::{HeaderKind, Layout, LogDescriptor};
use crate::cp::{CpInfo, MauType, Side};
use crate::endpoint::all_endpoints;
use crate::reader::LogRecord;
use crate::task::RecordSink;
use crate::time::{Period, Time};

/// One line of the `list` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(super) struct ListRow {
    pub log: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<&'static str>,
    pub side: &'static str,
    pub first: Option<Time>,
    pub last: Option<Time>,
}

impl ListRow {
    pub fn new(
        log: &'static str,
        endpoint: Option<&'static str>,
        side: Option<Side>,
        observed: &Period,
    ) -> Self {
        let (first, last) = if observed.is_empty() {
            (None, None)
        } else {
            (Some(observed.first()), Some(observed.last()))
        };
        Self {
            log,
            endpoint,
            side: side_label(side),
            first,
            last,
        }
    }
}

fn side_label(side: Option<Side>) -> &'static str {
    match side {
        Some(Side::A) => "A",
        Some(Side::B) => "B",
        None => "-",
    }
}

fn time_or_dash(time: Option<Time>) -> String {
    time.map_or_else(|| "-".to_string(), |t| t.to_string())
}

/// The `Log type / CP side / First time / Last time` table.
pub(super) fn format_list_table(rows: &[ListRow]) -> String {
    const HEADINGS: [&str; 4] = ["Log type", "CP side", "First time", "Last time"];

    let log_width = rows
        .iter()
        .map(|r| r.log.len())
        .chain([HEADINGS[0].len()])
        .max()
        .unwrap_or_default();
    let time_width = "YYYYMMDD_HHmmss_uuuuuu".len();

    let mut out = format!(
        "{:<log_width$}  {:<7}  {:<time_width$}  {}\n",
        HEADINGS[0], HEADINGS[1], HEADINGS[2], HEADINGS[3]
    );
    for row in rows {
        out.push_str(&format!(
            "{:<log_width$}  {:<7}  {:<time_width$}  {}\n",
            row.log,
            row.side,
            time_or_dash(row.first),
            time_or_dash(row.last),
        ));
    }
    out
}

pub(super) fn endpoint_heading(name: &str) -> String {
    format!("MAU endpoint: {name}")
}

/// Heading printed before the records of one log.
pub(super) fn read_heading(log: &str, side: Option<Side>, endpoint: Option<&str>) -> String {
    match (side, endpoint) {
        (Some(side), _) => format!("=== {log}, CP side {side} ==="),
        (None, Some(endpoint)) => format!("=== {log}, endpoint {endpoint} ==="),
        (None, None) => format!("=== {log} ==="),
    }
}

fn header_name(kind: HeaderKind) -> &'static str {
    match kind {
        HeaderKind::None => "none",
        HeaderKind::Clh => "CLH",
        HeaderKind::Tesrv => "TESRV",
    }
}

fn layout_name(layout: Layout) -> &'static str {
    match layout {
        Layout::AppendLog { .. } => "append-log",
        Layout::Rotating { .. } => "rotating",
        Layout::EventFiles { .. } => "event files",
        Layout::CrashDirectories { .. } => "crash directories",
    }
}

/// CP summary and the log types applicable to it.
pub(super) fn format_types(cp: &CpInfo, descriptors: &[&LogDescriptor]) -> String {
    let mut out = format!("CP {} (id {}, {})", cp.name, cp.id, cp.architecture);
    match cp.mau {
        Some(MauType::Maub) => out.push_str(", MAUB"),
        Some(MauType::Maus) => out.push_str(", MAUS"),
        None => {}
    }
    if let (Some(magazine), Some(slot)) = (&cp.magazine, cp.slot) {
        out.push_str(&format!(", board {magazine} slot {slot}"));
    }
    out.push('\n');

    if cp.has_maus() {
        let endpoints: Vec<String> = all_endpoints()
            .iter()
            .map(|e| format!("{} ({})", e.name, e.sub_path))
            .collect();
        out.push_str(&format!("Endpoints: {}\n", endpoints.join(", ")));
    }
    out.push('\n');

    let name_width = descriptors
        .iter()
        .map(|d| d.name.len())
        .max()
        .unwrap_or_default();
    for d in descriptors {
        let endpoints = if d.is_multi_endpoint() {
            format!(", {} endpoints", d.endpoints)
        } else {
            String::new()
        };
        out.push_str(&format!(
            "{:<name_width$}  {}  [{}, header {}{endpoints}]\n",
            d.name,
            d.display_name,
            layout_name(d.layout),
            header_name(d.header()),
        ));
    }
    out
}

/// Writes records as `<CP time>  AP time: <AP time>` blocks.
pub(super) struct RecordPrinter<W> {
    out: W,
}

impl<W: Write> RecordPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> RecordSink for RecordPrinter<W> {
    fn accept(&mut self, record: LogRecord) -> io::Result<()> {
        writeln!(
            self.out,
            "{}  AP time: {}",
            record.cp_time,
            time_or_dash(record.ap_time)
        )?;
        self.out.write_all(&record.payload)?;
        self.out.write_all(b"\n")
    }
}
