//! Log descriptor catalog.
//!
//! Every log type the tool knows is declared once in [`BUILTIN`]. A
//! [`Catalog`] is built per invocation and queried by name, by group, or
//! for everything applicable to a CP. Declaration order is the listing
//! order.

use crate::{
    cp::{Architecture, CpInfo},
    error::LogError,
};

/// How a log is stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One growing file of CLH-framed records.
    AppendLog { file: &'static str },

    /// `<base>.<generation>` files of TESRV-framed records.
    Rotating { base: &'static str },

    /// One file per event; the name carries the timestamp.
    EventFiles { prefix: &'static str },

    /// One directory per crash; the name carries the timestamp.
    CrashDirectories { prefix: &'static str },
}

/// Record header format found inside the log's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    None,
    Clh,
    Tesrv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogGroup {
    Ordinary,
    Mau,
}

impl LogGroup {
    fn name(self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Mau => "mau",
        }
    }
}

/// Static description of one log type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDescriptor {
    pub name: &'static str,
    pub display_name: &'static str,

    /// Path relative to the CP-side root (or the CP root for MAU logs).
    /// MAU paths contain an `{endpoint}` placeholder.
    pub sub_path: &'static str,

    pub layout: Layout,
    pub group: LogGroup,

    /// Number of logical endpoints; 1 for simple logs.
    pub endpoints: u8,

    pub architectures: &'static [Architecture],
}

const BOTH: &[Architecture] = &[Architecture::DualSided, Architecture::BladeCluster];
const DUAL: &[Architecture] = &[Architecture::DualSided];
const BLADE: &[Architecture] = &[Architecture::BladeCluster];

const fn ordinary(
    name: &'static str,
    display_name: &'static str,
    sub_path: &'static str,
    layout: Layout,
    architectures: &'static [Architecture],
) -> LogDescriptor {
    LogDescriptor {
        name,
        display_name,
        sub_path,
        layout,
        group: LogGroup::Ordinary,
        endpoints: 1,
        architectures,
    }
}

const fn mau(
    name: &'static str,
    display_name: &'static str,
    sub_path: &'static str,
    layout: Layout,
) -> LogDescriptor {
    LogDescriptor {
        name,
        display_name,
        sub_path,
        layout,
        group: LogGroup::Mau,
        endpoints: 2,
        architectures: BOTH,
    }
}

/// Built-in log types, in listing order.
#[rustfmt::skip]
pub const BUILTIN: &[LogDescriptor] = &[
    ordinary("errorlog", "CP error log", "errorlog", Layout::AppendLog { file: "errorlog.clh" }, BOTH),
    ordinary("eventlog", "CP event log", "eventlog", Layout::AppendLog { file: "eventlog.clh" }, BOTH),
    ordinary("consol", "Console log", "consol", Layout::AppendLog { file: "consol.clh" }, DUAL),
    ordinary("sel", "System event log", "sel", Layout::AppendLog { file: "sel.clh" }, BLADE),
    ordinary("syslog", "CP syslog", "syslog", Layout::Rotating { base: "syslog" }, BOTH),
    ordinary("trace", "Trace log", "trace", Layout::Rotating { base: "trace" }, BOTH),
    ordinary("corecpub", "CPUB core dumps", "core", Layout::EventFiles { prefix: "core_cpub_" }, DUAL),
    ordinary("corecpbb", "CPBB core dumps", "core", Layout::EventFiles { prefix: "core_cpbb_" }, BLADE),
    ordinary("crashcpub", "CPUB crash dumps", "crash", Layout::CrashDirectories { prefix: "crash_cpub_" }, DUAL),
    ordinary("crashcpbb", "CPBB crash dumps", "crash", Layout::CrashDirectories { prefix: "crash_cpbb_" }, BLADE),
    mau("mauslog", "MAUS log", "maus/{endpoint}/log", Layout::AppendLog { file: "mauslog.clh" }),
    mau("mauscrash", "MAUS crash dumps", "maus/{endpoint}/crash", Layout::CrashDirectories { prefix: "crash_" }),
];

impl LogDescriptor {
    pub fn header(&self) -> HeaderKind {
        match self.layout {
            Layout::AppendLog { .. } => HeaderKind::Clh,
            Layout::Rotating { .. } => HeaderKind::Tesrv,
            Layout::EventFiles { .. } | Layout::CrashDirectories { .. } => HeaderKind::None,
        }
    }

    pub fn is_multi_endpoint(&self) -> bool {
        self.endpoints > 1
    }

    /// Whether this log exists on the given CP.
    pub fn applies_to(&self, cp: &CpInfo) -> bool {
        self.applies(cp.architecture, cp.has_maus())
    }

    fn applies(&self, architecture: Architecture, has_maus: bool) -> bool {
        self.architectures.contains(&architecture) && (self.group != LogGroup::Mau || has_maus)
    }
}

/// Immutable set of descriptors for one invocation.
#[derive(Debug, Clone)]
pub struct Catalog {
    descriptors: Vec<LogDescriptor>,
}

impl Catalog {
    /// The catalog of every built-in log type.
    pub fn builtin() -> Self {
        Self::new(BUILTIN.to_vec())
    }

    pub fn new(descriptors: Vec<LogDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn get(&self, name: &str) -> Option<&LogDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Every descriptor applicable to `cp`, in declaration order.
    pub fn applicable<'a>(
        &'a self,
        cp: &CpInfo,
    ) -> impl Iterator<Item = &'a LogDescriptor> + use<'a> {
        let (architecture, has_maus) = (cp.architecture, cp.has_maus());
        self.descriptors
            .iter()
            .filter(move |d| d.applies(architecture, has_maus))
    }

    /// Resolves requested names into descriptors.
    ///
    /// Names may be log types or group names (`ordinary`, `mau`). An empty
    /// request selects every applicable log of the endpoint kind in use:
    /// multi-endpoint logs when `with_endpoint`, simple logs otherwise.
    /// Groups silently drop members that do not apply; an explicitly named
    /// inapplicable log is an error. The result is in declaration order
    /// without duplicates.
    pub fn select(
        &self,
        names: &[String],
        cp: &CpInfo,
        with_endpoint: bool,
    ) -> Result<Vec<&LogDescriptor>, LogError> {
        if names.is_empty() {
            return Ok(self
                .applicable(cp)
                .filter(|d| d.is_multi_endpoint() == with_endpoint)
                .collect());
        }

        let mut picked: Vec<&'static str> = Vec::new();
        for name in names {
            if let Some(group) = [LogGroup::Ordinary, LogGroup::Mau]
                .into_iter()
                .find(|g| g.name().eq_ignore_ascii_case(name))
            {
                picked.extend(
                    self.descriptors
                        .iter()
                        .filter(|d| d.group == group && d.applies_to(cp))
                        .map(|d| d.name),
                );
                continue;
            }

            let descriptor = self
                .get(name)
                .ok_or_else(|| LogError::UnknownLogType(name.clone()))?;
            if !descriptor.applies_to(cp) {
                return Err(LogError::LogTypeNotApplicable {
                    log: descriptor.name.to_string(),
                    cp: format!("{} ({})", cp.name, cp.architecture),
                });
            }
            picked.push(descriptor.name);
        }

        Ok(self
            .descriptors
            .iter()
            .filter(|d| picked.contains(&d.name))
            .collect())
    }
}
