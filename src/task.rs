//! Log tasks: one log type bound to one CP side or MAUS endpoint.
//!
//! A [`LogTask`] resolves its filesystem root once, then runs list, read
//! or transfer against a requested [`Period`]. Every operation starts
//! with a header-only survey of the log's artifacts:
//!
//! 1. Each artifact is scanned once for its first and last stored record
//!    and for the window of records that fall inside the period and pass
//!    the filter. Corrupt or unreadable artifacts produce one warning each
//!    and are left out.
//! 2. Rotating logs whose generation counter wrapped are put back into
//!    chronological order (see [`correct_wrap`]).
//! 3. If the log's first stored record is later than its last, the
//!    operation returns [`TaskOutcome::StartGreaterThanStop`] and does
//!    nothing else.
//!
//! Read and transfer then revisit only artifacts whose matched window is
//! not empty, so files entirely outside the period are never reopened.
//!
//! Window matching uses CP time. AP time is carried to the sink but never
//! compared.

use std::{
    io,
    path::{Path, PathBuf},
};

use crate::{
    catalog::LogDescriptor,
    cp::{Architecture, CpInfo, Side},
    endpoint::Endpoint,
    error::LogError,
    filter::{NoFilter, RecordFilter},
    reader::{LogRecord, LogRecordReader, reader_for},
    staging::Staging,
    time::{Period, StartGreaterThanStop, Time},
    warning::{Warning, WarningSink},
};

/// Result of an operation that ran to completion or found a reversed log.
///
/// A reversed log is recoverable: callers report it and carry on with the
/// remaining log types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Completed(T),
    StartGreaterThanStop(StartGreaterThanStop),
}

impl<T> TaskOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TaskOutcome<U> {
        match self {
            Self::Completed(value) => TaskOutcome::Completed(f(value)),
            Self::StartGreaterThanStop(detail) => TaskOutcome::StartGreaterThanStop(detail),
        }
    }
}

/// Receiver for records emitted by [`LogTask::read_events`].
pub trait RecordSink {
    fn accept(&mut self, record: LogRecord) -> io::Result<()>;
}

impl RecordSink for Vec<LogRecord> {
    fn accept(&mut self, record: LogRecord) -> io::Result<()> {
        self.push(record);
        Ok(())
    }
}

/// One log type bound to its resolved root.
pub struct LogTask<'a> {
    descriptor: &'a LogDescriptor,
    side: Option<Side>,
    endpoint: Option<&'static Endpoint>,
    reader: Box<dyn LogRecordReader>,
}

impl<'a> LogTask<'a> {
    /// Binds a descriptor to a CP and resolves the log's root directory.
    ///
    /// Dual-sided CPs need a side for ordinary logs; blade clusters take
    /// none. MAU logs need an endpoint and no side; every other log
    /// rejects an endpoint.
    pub fn bind(
        descriptor: &'a LogDescriptor,
        data_root: &Path,
        cp: &CpInfo,
        side: Option<Side>,
        endpoint: Option<&'static Endpoint>,
    ) -> Result<Self, LogError> {
        if !descriptor.applies_to(cp) {
            return Err(LogError::LogTypeNotApplicable {
                log: descriptor.name.to_string(),
                cp: format!("{} ({})", cp.name, cp.architecture),
            });
        }

        let cp_root = cp.log_root(data_root);
        let root = match (descriptor.is_multi_endpoint(), endpoint) {
            (false, Some(_)) => {
                return Err(LogError::IllegalEndpointForLogType(descriptor.name.to_string()));
            }
            (true, None) => {
                return Err(LogError::MissingEndpointForLogType(descriptor.name.to_string()));
            }
            (true, Some(endpoint)) => {
                if side.is_some() {
                    return Err(LogError::Usage(format!(
                        "{} is kept per endpoint, not per side",
                        descriptor.name
                    )));
                }
                cp_root.join(descriptor.sub_path.replace("{endpoint}", endpoint.sub_path))
            }
            (false, None) => match (cp.architecture, side) {
                (Architecture::DualSided, Some(side)) => {
                    cp_root.join(side.dir_name()).join(descriptor.sub_path)
                }
                (Architecture::DualSided, None) => {
                    return Err(LogError::Usage(format!(
                        "{} on dual-sided CP {} needs a side",
                        descriptor.name, cp.name
                    )));
                }
                (Architecture::BladeCluster, Some(_)) => {
                    return Err(LogError::Usage(format!(
                        "CP {} is a blade cluster and has no sides",
                        cp.name
                    )));
                }
                (Architecture::BladeCluster, None) => cp_root.join(descriptor.sub_path),
            },
        };

        Ok(Self {
            descriptor,
            side,
            endpoint,
            reader: reader_for(descriptor.layout, root),
        })
    }

    pub fn descriptor(&self) -> &'a LogDescriptor {
        self.descriptor
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }

    pub fn endpoint(&self) -> Option<&'static Endpoint> {
        self.endpoint
    }

    pub fn root(&self) -> &Path {
        self.reader.root()
    }

    /// Staging directory name: `<log>[_cpa|_cpb][_<endpoint>]`.
    pub fn label(&self) -> String {
        let mut label = self.descriptor.name.to_string();
        if let Some(side) = self.side {
            label.push('_');
            label.push_str(side.dir_name());
        }
        if let Some(endpoint) = self.endpoint {
            label.push('_');
            label.push_str(endpoint.name);
        }
        label
    }

    // ── Operations ──

    /// Observed window of records inside `period`. Empty when none match.
    pub fn list_events(
        &self,
        period: &Period,
        warnings: &mut dyn WarningSink,
    ) -> Result<TaskOutcome<Period>, LogError> {
        Ok(self
            .survey(period, &NoFilter, warnings)?
            .map(|artifacts| observed(&artifacts)))
    }

    /// Streams matching records to `sink` in chronological order.
    ///
    /// Returns the observed window of what was emitted.
    pub fn read_events(
        &self,
        period: &Period,
        filter: &dyn RecordFilter,
        sink: &mut dyn RecordSink,
        warnings: &mut dyn WarningSink,
    ) -> Result<TaskOutcome<Period>, LogError> {
        let artifacts = match self.survey(period, filter, warnings)? {
            TaskOutcome::Completed(artifacts) => artifacts,
            TaskOutcome::StartGreaterThanStop(detail) => {
                return Ok(TaskOutcome::StartGreaterThanStop(detail));
            }
        };

        let mut emitted = Period::empty();
        for artifact in artifacts.iter().filter(|a| !a.matched.is_empty()) {
            let mut scan = match self.reader.scan(&artifact.path) {
                Ok(scan) => scan,
                Err(e) => {
                    warnings.warn(unreadable(&artifact.path, &e));
                    continue;
                }
            };
            while let Some(header) = scan.next() {
                if !period.contains(header.cp_time) || !filter.accepts(&header) {
                    continue;
                }
                let payload = match scan.payload(&header) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warnings.warn(unreadable(&artifact.path, &e));
                        break;
                    }
                };
                emitted.extend(header.cp_time);
                let record = LogRecord {
                    cp_time: header.cp_time,
                    ap_time: header.ap_time,
                    payload,
                    path: artifact.path.clone(),
                };
                tracing::trace!(
                    file = %record.path.display(),
                    cp_time = %record.cp_time,
                    board = ?header.board,
                    "record emitted"
                );
                sink.accept(record).map_err(|e| LogError::io("cannot write record", e))?;
            }
            if let Some(e) = scan.take_error() {
                warnings.warn(unreadable(&artifact.path, &e));
            }
        }
        Ok(TaskOutcome::Completed(emitted))
    }

    /// Copies every artifact holding a matching record into `staging`.
    ///
    /// Returns the staging subdirectory used, or `None` when nothing
    /// matched.
    pub fn transfer_logs(
        &self,
        period: &Period,
        filter: &dyn RecordFilter,
        staging: &mut Staging,
        warnings: &mut dyn WarningSink,
    ) -> Result<TaskOutcome<Option<PathBuf>>, LogError> {
        let artifacts = match self.survey(period, filter, warnings)? {
            TaskOutcome::Completed(artifacts) => artifacts,
            TaskOutcome::StartGreaterThanStop(detail) => {
                return Ok(TaskOutcome::StartGreaterThanStop(detail));
            }
        };

        let label = self.label();
        let mut staged = None;
        for artifact in artifacts.iter().filter(|a| !a.matched.is_empty()) {
            tracing::debug!(artifact = %artifact.path.display(), group = %label, "staging");
            staged = Some(staging.stage(&label, &artifact.path)?);
        }
        Ok(TaskOutcome::Completed(staged))
    }

    // ── Survey ──

    fn survey(
        &self,
        period: &Period,
        filter: &dyn RecordFilter,
        warnings: &mut dyn WarningSink,
    ) -> Result<TaskOutcome<Vec<ArtifactSummary>>, LogError> {
        let root = self.reader.root();
        let paths = self
            .reader
            .artifacts(warnings)
            .map_err(|e| LogError::io(format!("cannot list {}", root.display()), e))?;
        tracing::debug!(
            log = self.descriptor.name,
            root = %root.display(),
            artifacts = paths.len(),
            "surveying log"
        );

        let mut artifacts: Vec<ArtifactSummary> = paths
            .into_iter()
            .filter_map(|path| self.summarize(path, period, filter, warnings))
            .collect();

        if self.reader.generations_may_wrap() {
            correct_wrap(&mut artifacts);
        }

        let (Some(head), Some(tail)) = (artifacts.first(), artifacts.last()) else {
            return Ok(TaskOutcome::Completed(artifacts));
        };
        if let Err(detail) = period.intersect_record_window(head.first, tail.last) {
            tracing::debug!(log = self.descriptor.name, %detail, "reversed log");
            return Ok(TaskOutcome::StartGreaterThanStop(detail));
        }
        Ok(TaskOutcome::Completed(artifacts))
    }

    /// Header scan of one artifact. `None` when it has no usable records.
    fn summarize(
        &self,
        path: PathBuf,
        period: &Period,
        filter: &dyn RecordFilter,
        warnings: &mut dyn WarningSink,
    ) -> Option<ArtifactSummary> {
        let mut scan = match self.reader.scan(&path) {
            Ok(scan) => scan,
            Err(e) => {
                warnings.warn(unreadable(&path, &e));
                return None;
            }
        };

        let mut bounds: Option<(Time, Time)> = None;
        let mut matched = Period::empty();
        for header in scan.by_ref() {
            let first = bounds.map_or(header.cp_time, |(first, _)| first);
            bounds = Some((first, header.cp_time));
            if period.contains(header.cp_time) && filter.accepts(&header) {
                matched.extend(header.cp_time);
            }
        }

        if let Some(e) = scan.take_error() {
            warnings.warn(unreadable(&path, &e));
            return None;
        }

        let skipped = scan.skipped();
        let Some((first, last)) = bounds else {
            if skipped > 0 {
                warnings.warn(Warning::NoReadableRecords { path });
            }
            return None;
        };
        if skipped > 0 {
            tracing::debug!(artifact = %path.display(), skipped, "resynchronized past corrupt records");
            warnings.warn(Warning::CorruptRecords {
                path: path.clone(),
                skipped,
            });
        }

        Some(ArtifactSummary {
            path,
            first,
            last,
            matched,
        })
    }
}

/// Survey result for one artifact.
#[derive(Debug, Clone)]
struct ArtifactSummary {
    path: PathBuf,
    /// First stored record.
    first: Time,
    /// Last stored record.
    last: Time,
    /// Records inside the period that pass the filter.
    matched: Period,
}

/// Restores chronological order of rotated files after a generation wrap.
///
/// Files are in generation order. A wrap shows as exactly one descent,
/// where a file starts before its predecessor ended, and the newest
/// generation ending no later than the oldest one begins. The files from
/// the descent onwards are then the older run and move to the front. Any
/// other shape is left alone and judged as it stands.
fn correct_wrap(artifacts: &mut [ArtifactSummary]) {
    let descents: Vec<usize> = (1..artifacts.len())
        .filter(|&k| artifacts[k].first < artifacts[k - 1].last)
        .collect();
    let [k] = descents[..] else {
        return;
    };
    if artifacts[artifacts.len() - 1].last <= artifacts[0].first {
        tracing::debug!(
            wrapped_at = %artifacts[k].path.display(),
            "generation wrap, reordering"
        );
        artifacts.rotate_left(k);
    }
}

/// Union of matched windows.
fn observed(artifacts: &[ArtifactSummary]) -> Period {
    let mut window = Period::empty();
    for artifact in artifacts {
        window.merge(&artifact.matched);
    }
    window
}

fn unreadable(path: &Path, error: &io::Error) -> Warning {
    Warning::UnreadableArtifact {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    use crate::{
        catalog::Catalog,
        cp::{blade, dual_sided},
        endpoint,
        filter::BoardFilter,
        reader::{Board, encode_clh, encode_tesrv},
        staging::RecordingArchiver,
        time::t,
    };

    struct Fixture {
        dir: TempDir,
        catalog: Catalog,
        cp: CpInfo,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_cp(dual_sided("CP1"))
        }

        fn with_cp(cp: CpInfo) -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                catalog: Catalog::builtin(),
                cp,
            }
        }

        fn data_root(&self) -> &Path {
            self.dir.path()
        }

        /// Writes `bytes` below the CP's log root.
        fn write(&self, relative: &str, bytes: &[u8]) -> PathBuf {
            let path = self.cp.log_root(self.data_root()).join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, bytes).unwrap();
            path
        }

        fn task(&self, log: &str, side: Option<Side>) -> LogTask<'_> {
            let descriptor = self.catalog.get(log).unwrap();
            LogTask::bind(descriptor, self.data_root(), &self.cp, side, None).unwrap()
        }
    }

    fn clh_log(times: &[&str]) -> Vec<u8> {
        times
            .iter()
            .enumerate()
            .flat_map(|(i, s)| encode_clh(t(s), None, None, format!("record {i}").as_bytes()))
            .collect()
    }

    fn window(start: &str, stop: &str) -> Period {
        Period::new(t(start), t(stop))
    }

    const FIVE: [&str; 5] = [
        "20240101_080000",
        "20240101_090000",
        "20240101_100000",
        "20240101_110000",
        "20240101_120000",
    ];

    #[test]
    fn reads_only_the_middle_three_of_five() {
        let fx = Fixture::new();
        fx.write("cpa/errorlog/errorlog.clh", &clh_log(&FIVE));
        let task = fx.task("errorlog", Some(Side::A));
        let mut records: Vec<LogRecord> = Vec::new();
        let mut warnings: Vec<Warning> = Vec::new();

        let outcome = task
            .read_events(
                &window("20240101_083000", "20240101_113000"),
                &NoFilter,
                &mut records,
                &mut warnings,
            )
            .unwrap();

        let times: Vec<Time> = records.iter().map(|r| r.cp_time).collect();
        assert_eq!(
            times,
            [t(FIVE[1]), t(FIVE[2]), t(FIVE[3])],
            "in-window records in CP-time order"
        );
        assert_eq!(records[0].payload, b"record 1");
        assert_eq!(
            outcome,
            TaskOutcome::Completed(window(FIVE[1], FIVE[3]))
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn list_reports_observed_not_requested_window() {
        let fx = Fixture::new();
        fx.write("cpa/errorlog/errorlog.clh", &clh_log(&FIVE));
        let mut warnings: Vec<Warning> = Vec::new();

        let outcome = fx
            .task("errorlog", Some(Side::A))
            .list_events(&Period::maximal(), &mut warnings)
            .unwrap();

        assert_eq!(outcome, TaskOutcome::Completed(window(FIVE[0], FIVE[4])));
    }

    #[test]
    fn empty_log_directory_lists_empty_period() {
        let fx = Fixture::new();
        let mut warnings: Vec<Warning> = Vec::new();

        for log in ["errorlog", "syslog", "corecpub", "crashcpub"] {
            let outcome = fx
                .task(log, Some(Side::B))
                .list_events(&Period::maximal(), &mut warnings)
                .unwrap();
            assert!(
                matches!(outcome, TaskOutcome::Completed(p) if p.is_empty()),
                "{log}"
            );
        }
        assert!(warnings.is_empty());
    }

    #[test]
    fn record_outside_window_lists_empty_period() {
        let fx = Fixture::new();
        fx.write("cpa/errorlog/errorlog.clh", &clh_log(&["20230601_000000"]));
        let mut warnings: Vec<Warning> = Vec::new();

        let outcome = fx
            .task("errorlog", Some(Side::A))
            .list_events(&window("20240101_000000", "20240102_000000"), &mut warnings)
            .unwrap();

        assert!(matches!(outcome, TaskOutcome::Completed(p) if p.is_empty()));
    }

    #[test]
    fn reversed_log_is_reported_with_both_times() {
        let fx = Fixture::new();
        fx.write(
            "cpa/eventlog/eventlog.clh",
            &clh_log(&["20240105_000000", "20240103_000000", "20240101_000000"]),
        );
        let task = fx.task("eventlog", Some(Side::A));
        let mut warnings: Vec<Warning> = Vec::new();
        let expected = StartGreaterThanStop {
            first: t("20240105_000000"),
            last: t("20240101_000000"),
        };

        let listed = task.list_events(&Period::maximal(), &mut warnings).unwrap();
        assert_eq!(listed, TaskOutcome::StartGreaterThanStop(expected));

        let mut records: Vec<LogRecord> = Vec::new();
        let read = task
            .read_events(&Period::maximal(), &NoFilter, &mut records, &mut warnings)
            .unwrap();
        assert_eq!(read, TaskOutcome::StartGreaterThanStop(expected));
        assert!(records.is_empty());
    }

    #[test]
    fn processing_continues_past_a_reversed_log() {
        let fx = Fixture::new();
        fx.write(
            "cpa/errorlog/errorlog.clh",
            &clh_log(&["20240105_000000", "20240101_000000"]),
        );
        fx.write("cpa/eventlog/eventlog.clh", &clh_log(&FIVE));
        let mut warnings: Vec<Warning> = Vec::new();

        let mut completed = Vec::new();
        let mut reversed = Vec::new();
        for log in ["errorlog", "eventlog"] {
            match fx
                .task(log, Some(Side::A))
                .list_events(&Period::maximal(), &mut warnings)
                .unwrap()
            {
                TaskOutcome::Completed(p) => completed.push((log, p)),
                TaskOutcome::StartGreaterThanStop(_) => reversed.push(log),
            }
        }

        assert_eq!(reversed, ["errorlog"]);
        assert_eq!(completed, [("eventlog", window(FIVE[0], FIVE[4]))]);
    }

    #[test]
    fn wrapped_generations_are_read_in_time_order() {
        let fx = Fixture::new();
        // Generation counter wrapped: .0001 and .0002 are the newest files.
        let file = |times: &[&str]| -> Vec<u8> {
            times
                .iter()
                .flat_map(|s| encode_tesrv(t(s), s.as_bytes()))
                .collect()
        };
        fx.write("cpa/trace/trace.0001", &file(&["20240103_000000", "20240103_120000"]));
        fx.write("cpa/trace/trace.0002", &file(&["20240104_000000"]));
        fx.write("cpa/trace/trace.9998", &file(&["20240101_000000", "20240101_120000"]));
        fx.write("cpa/trace/trace.9999", &file(&["20240102_000000"]));
        let task = fx.task("trace", Some(Side::A));
        let mut warnings: Vec<Warning> = Vec::new();

        let listed = task.list_events(&Period::maximal(), &mut warnings).unwrap();
        assert_eq!(
            listed,
            TaskOutcome::Completed(window("20240101_000000", "20240104_000000"))
        );

        let mut records: Vec<LogRecord> = Vec::new();
        task.read_events(&Period::maximal(), &NoFilter, &mut records, &mut warnings)
            .unwrap();
        let times: Vec<String> = records.iter().map(|r| r.cp_time.to_compact_seconds()).collect();
        assert_eq!(
            times,
            [
                "20240101_000000",
                "20240101_120000",
                "20240102_000000",
                "20240103_000000",
                "20240103_120000",
                "20240104_000000",
            ]
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn two_descents_are_not_a_wrap() {
        let summary = |name: &str, first: &str, last: &str| ArtifactSummary {
            path: PathBuf::from(name),
            first: t(first),
            last: t(last),
            matched: Period::empty(),
        };
        let mut artifacts = vec![
            summary("a", "20240105_000000", "20240106_000000"),
            summary("b", "20240101_000000", "20240102_000000"),
            summary("c", "20240103_000000", "20240104_000000"),
            summary("d", "20240101_000000", "20240101_000000"),
        ];

        correct_wrap(&mut artifacts);

        let order: Vec<_> = artifacts.iter().map(|a| a.path.clone()).collect();
        assert_eq!(order, ["a", "b", "c", "d"].map(PathBuf::from));
    }

    #[test]
    fn board_filter_limits_read_records() {
        let fx = Fixture::with_cp(blade("BC0"));
        let board = |subrack, slot| Some(Board { subrack, slot });
        let mut log = encode_clh(t("20240101_080000"), None, board(1, 5), b"wanted");
        log.extend(encode_clh(t("20240101_090000"), None, board(1, 6), b"other slot"));
        log.extend(encode_clh(
            t("20240101_100000"),
            Some(t("20240101_100002")),
            board(1, 5),
            b"wanted too",
        ));
        log.extend(encode_clh(t("20240101_110000"), None, None, b"untagged"));
        fx.write("sel/sel.clh", &log);
        let task = fx.task("sel", None);
        let mut records: Vec<LogRecord> = Vec::new();
        let mut warnings: Vec<Warning> = Vec::new();

        let outcome = task
            .read_events(
                &Period::maximal(),
                &BoardFilter::new(1, 5),
                &mut records,
                &mut warnings,
            )
            .unwrap();

        let payloads: Vec<&[u8]> = records.iter().map(|r| r.payload.as_slice()).collect();
        assert_eq!(payloads, [b"wanted".as_slice(), b"wanted too"]);
        assert_eq!(records[1].ap_time, Some(t("20240101_100002")));
        assert!(records.iter().all(|r| r.path.ends_with("sel/sel.clh")));
        assert_eq!(
            outcome,
            TaskOutcome::Completed(window("20240101_080000", "20240101_100000"))
        );
    }

    #[test]
    fn corrupt_artifacts_warn_once_each() {
        let fx = Fixture::new();
        let mut damaged = encode_tesrv(t("20240101_000000"), b"ok");
        damaged.extend_from_slice(b"####garbage####");
        damaged.extend(encode_tesrv(t("20240101_010000"), b"ok"));
        let damaged = fx.write("cpa/syslog/syslog.1", &damaged);
        let garbage = fx.write("cpa/syslog/syslog.2", &[0x42; 64]);
        let mut warnings: Vec<Warning> = Vec::new();

        let outcome = fx
            .task("syslog", Some(Side::A))
            .list_events(&Period::maximal(), &mut warnings)
            .unwrap();

        assert_eq!(
            outcome,
            TaskOutcome::Completed(window("20240101_000000", "20240101_010000"))
        );
        assert_eq!(
            warnings,
            [
                Warning::CorruptRecords {
                    path: damaged,
                    skipped: 1
                },
                Warning::NoReadableRecords { path: garbage },
            ]
        );
    }

    #[test]
    fn transfer_stages_only_matching_files() {
        let fx = Fixture::new();
        fx.write("cpa/core/core_cpub_20240101_080000.dmp", b"early");
        fx.write("cpa/core/core_cpub_20240102_080000.dmp", b"inside");
        fx.write("cpa/core/core_cpub_20240103_080000.dmp", b"late");
        let work = TempDir::new().unwrap();
        let mut staging = Staging::begin(work.path()).unwrap();
        let mut warnings: Vec<Warning> = Vec::new();

        let outcome = fx
            .task("corecpub", Some(Side::A))
            .transfer_logs(
                &window("20240102_000000", "20240102_235959"),
                &NoFilter,
                &mut staging,
                &mut warnings,
            )
            .unwrap();

        let TaskOutcome::Completed(Some(group)) = outcome else {
            panic!("expected a staged group, got {outcome:?}");
        };
        assert_eq!(group, staging.path().join("corecpub_cpa"));
        let staged: Vec<_> = fs::read_dir(&group)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(staged, ["core_cpub_20240102_080000.dmp"]);
    }

    #[test]
    fn transfer_without_matches_stages_nothing() {
        let fx = Fixture::new();
        fx.write("cpa/errorlog/errorlog.clh", &clh_log(&FIVE));
        let work = TempDir::new().unwrap();
        let mut staging = Staging::begin(work.path()).unwrap();
        let staging_dir = staging.path().to_path_buf();
        let mut warnings: Vec<Warning> = Vec::new();

        let outcome = fx
            .task("errorlog", Some(Side::A))
            .transfer_logs(
                &window("20250101_000000", "20250102_000000"),
                &NoFilter,
                &mut staging,
                &mut warnings,
            )
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Completed(None));
        assert!(staging.is_empty());

        let archiver = RecordingArchiver::new();
        let archive = staging
            .finalize(&archiver, &work.path().join("out.zip"))
            .unwrap();
        assert!(archive.is_none());
        assert!(archiver.calls.borrow().is_empty());
        assert!(!staging_dir.exists());
    }

    #[test]
    fn transfer_of_mau_crash_directories_copies_trees() {
        let fx = Fixture::new();
        fx.write("maus/maus2/crash/crash_20240101_080000/dump.bin", b"1234");
        let descriptor = fx.catalog.get("mauscrash").unwrap();
        let mau_b = endpoint::resolve("mau-b").unwrap();
        let task = LogTask::bind(descriptor, fx.data_root(), &fx.cp, None, Some(mau_b)).unwrap();
        let work = TempDir::new().unwrap();
        let mut staging = Staging::begin(work.path()).unwrap();
        let mut warnings: Vec<Warning> = Vec::new();

        let outcome = task
            .transfer_logs(&Period::maximal(), &NoFilter, &mut staging, &mut warnings)
            .unwrap();

        assert_eq!(task.label(), "mauscrash_mau-b");
        let TaskOutcome::Completed(Some(group)) = outcome else {
            panic!("expected a staged group, got {outcome:?}");
        };
        assert!(group.join("crash_20240101_080000/dump.bin").is_file());

        let archiver = RecordingArchiver::new();
        let dest = work.path().join("cp1_logs.zip");
        staging.finalize(&archiver, &dest).unwrap();
        assert_eq!(
            fs::read_to_string(dest).unwrap(),
            "mauscrash_mau-b/crash_20240101_080000/dump.bin\n"
        );
    }

    #[test]
    fn bind_resolves_roots_per_architecture() {
        let fx = Fixture::new();
        let catalog = Catalog::builtin();
        let root = fx.data_root();

        let task = LogTask::bind(
            catalog.get("errorlog").unwrap(),
            root,
            &dual_sided("CP1"),
            Some(Side::B),
            None,
        )
        .unwrap();
        assert_eq!(task.root(), root.join("cp1/cpb/errorlog"));
        assert_eq!(task.label(), "errorlog_cpb");

        let task =
            LogTask::bind(catalog.get("sel").unwrap(), root, &blade("BC0"), None, None).unwrap();
        assert_eq!(task.root(), root.join("bc0/sel"));
        assert_eq!(task.label(), "sel");

        let task = LogTask::bind(
            catalog.get("mauslog").unwrap(),
            root,
            &dual_sided("CP1"),
            None,
            Some(endpoint::resolve("mau-a").unwrap()),
        )
        .unwrap();
        assert_eq!(task.root(), root.join("cp1/maus/maus1/log"));
    }

    #[test]
    fn bind_rejects_endpoint_and_side_misuse() {
        let catalog = Catalog::builtin();
        let root = Path::new("/data");
        let mau_a = endpoint::resolve("mau-a").unwrap();
        let bind = |log: &str, cp: &CpInfo, side, endpoint| {
            LogTask::bind(catalog.get(log).unwrap(), root, cp, side, endpoint).err()
        };

        assert!(matches!(
            bind("errorlog", &dual_sided("CP1"), Some(Side::A), Some(mau_a)),
            Some(LogError::IllegalEndpointForLogType(_))
        ));
        assert!(matches!(
            bind("mauslog", &dual_sided("CP1"), None, None),
            Some(LogError::MissingEndpointForLogType(_))
        ));
        assert!(matches!(
            bind("errorlog", &dual_sided("CP1"), None, None),
            Some(LogError::Usage(_))
        ));
        assert!(matches!(
            bind("errorlog", &blade("BC0"), Some(Side::A), None),
            Some(LogError::Usage(_))
        ));
        assert!(matches!(
            bind("mauslog", &blade("BC0"), None, Some(mau_a)),
            Some(LogError::LogTypeNotApplicable { .. })
        ));
    }
}
