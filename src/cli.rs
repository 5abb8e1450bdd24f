//! CLI interface for cplog.
//!
//! Every command resolves its whole selection first: time window, CP,
//! endpoints, log types and sides are validated and every log task is
//! bound before any log file is opened. A log whose records come back in
//! reversed order is reported as a warning and the remaining logs are
//! still processed.

mod format;

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::cp::{Architecture, CpDirectory, CpInfo, Side};
use crate::endpoint::{self, Endpoint};
use crate::error::LogError;
use crate::filter::{BoardFilter, NoFilter, RecordFilter};
use crate::staging::{Staging, TransferLock, ZipCommand};
use crate::task::{LogTask, TaskOutcome};
use crate::time::{Period, StartGreaterThanStop, Time};
use crate::warning::{TerminalWarnings, Warning, WarningSink};

use format::{
    ListRow, RecordPrinter, endpoint_heading, format_list_table, format_types, read_heading,
};

/// cplog: list, read and transfer CP diagnostic logs.
#[derive(Debug, Parser)]
#[command(name = "cplog", after_long_help = USAGE_HELP)]
pub struct Cli {
    /// Config file. Defaults to `$CPLOG_CONFIG`, then `~/.cplog/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

const USAGE_HELP: &str = r"Examples:
  cplog list --cp cp1 --start-date 20240101 --stop-date 20240102
  cplog list --cp cp1 --side a -t errorlog -t syslog --json
  cplog read --cp bc0 -t sel --subrack 1 --slot 5 --start-time 0800
  cplog list --cp cp1 --mau all
  cplog transfer --cp cp1 -t ordinary --start-date 20240101

Log types may be named individually or by group (ordinary, mau).
Without -t, every applicable log is used.";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the first and last record time of each selected log.
    List {
        #[command(flatten)]
        selection: Selection,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print every record inside the time window.
    Read {
        #[command(flatten)]
        selection: Selection,

        /// Only records from this board subrack. Requires `--slot`.
        #[arg(long, requires = "slot")]
        subrack: Option<u8>,

        /// Only records from this board slot. Requires `--subrack`.
        #[arg(long, requires = "subrack")]
        slot: Option<u8>,
    },

    /// Archive every log file holding a record inside the time window.
    ///
    /// The archive is moved into the configured support-data directory.
    /// Only one transfer may run per destination.
    Transfer {
        #[command(flatten)]
        selection: Selection,
    },

    /// List the log types applicable to a CP.
    Types {
        /// CP name or numeric id. Optional on single-CP systems.
        #[arg(long)]
        cp: Option<String>,
    },
}

/// Options choosing what to examine.
#[derive(Debug, Args)]
pub struct Selection {
    /// CP name or numeric id. Optional on single-CP systems.
    #[arg(long)]
    cp: Option<String>,

    /// CP side (a or b). Both sides when omitted; not valid on blade clusters.
    #[arg(long)]
    side: Option<Side>,

    /// MAUS endpoint name, or `all`.
    #[arg(long, value_name = "ENDPOINT")]
    mau: Option<String>,

    /// Log type or group. Can be specified multiple times.
    #[arg(short = 't', long = "log", value_name = "NAME")]
    logs: Vec<String>,

    /// First day of the window.
    #[arg(long, value_name = "YYYYMMDD")]
    start_date: Option<String>,

    /// Start time of day.
    #[arg(long, value_name = "HHmm")]
    start_time: Option<String>,

    /// Last day of the window.
    #[arg(long, value_name = "YYYYMMDD")]
    stop_date: Option<String>,

    /// Stop time of day.
    #[arg(long, value_name = "HHmm")]
    stop_time: Option<String>,
}

/// Run the CLI.
pub fn run() -> Result<(), LogError> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let catalog = Catalog::builtin();
    let mut warnings = TerminalWarnings::default();

    match cli.command {
        Command::List { selection, json } => {
            let plan = Plan::resolve(&config, &catalog, &selection)?;
            cmd_list(&plan, json, &mut warnings)?;
        }
        Command::Read {
            selection,
            subrack,
            slot,
        } => {
            let plan = Plan::resolve(&config, &catalog, &selection)?;
            let filter: Box<dyn RecordFilter> = match (subrack, slot) {
                (Some(subrack), Some(slot)) => Box::new(BoardFilter::new(subrack, slot)),
                _ => Box::new(NoFilter),
            };
            cmd_read(&plan, filter.as_ref(), &mut warnings)?;
        }
        Command::Transfer { selection } => {
            let plan = Plan::resolve(&config, &catalog, &selection)?;
            cmd_transfer(&config, &plan, &mut warnings)?;
        }
        Command::Types { cp } => {
            let cp = resolve_cp(&config, cp.as_deref())?;
            let descriptors: Vec<_> = catalog.applicable(&cp).collect();
            print!("{}", format_types(&cp, &descriptors));
        }
    }

    if warnings.count() > 0 {
        eprintln!("{} warning(s)", warnings.count());
    }
    Ok(())
}

// ── Selection ──

/// Log tasks bound for one endpoint, or for no endpoint.
struct EndpointGroup<'a> {
    endpoint: Option<&'static Endpoint>,
    tasks: Vec<LogTask<'a>>,
}

/// A fully validated invocation.
struct Plan<'a> {
    cp: CpInfo,
    period: Period,
    groups: Vec<EndpointGroup<'a>>,
}

impl<'a> Plan<'a> {
    fn resolve(
        config: &Config,
        catalog: &'a Catalog,
        selection: &Selection,
    ) -> Result<Self, LogError> {
        let period = Period::resolve(
            selection.start_date.as_deref(),
            selection.start_time.as_deref(),
            selection.stop_date.as_deref(),
            selection.stop_time.as_deref(),
        )?;
        let cp = resolve_cp(config, selection.cp.as_deref())?;

        let endpoints = match selection.mau.as_deref() {
            Some(selector) => {
                let endpoints = endpoint::select(selector)?;
                if !cp.has_maus() {
                    return Err(LogError::EndpointsNotApplicable(cp.name.clone()));
                }
                endpoints.into_iter().map(Some).collect()
            }
            None => vec![None],
        };

        let descriptors = catalog.select(&selection.logs, &cp, selection.mau.is_some())?;

        let sides: Vec<Option<Side>> = match (cp.architecture, selection.side) {
            (Architecture::DualSided, Some(side)) => vec![Some(side)],
            (Architecture::DualSided, None) => Side::BOTH.map(Some).to_vec(),
            (Architecture::BladeCluster, Some(_)) => {
                return Err(LogError::Usage(format!(
                    "CP {} is a blade cluster and has no sides",
                    cp.name
                )));
            }
            (Architecture::BladeCluster, None) => vec![None],
        };

        let mut groups = Vec::new();
        for endpoint in endpoints {
            let mut tasks = Vec::new();
            for &descriptor in &descriptors {
                if endpoint.is_some() {
                    tasks.push(LogTask::bind(
                        descriptor,
                        &config.data_root,
                        &cp,
                        selection.side,
                        endpoint,
                    )?);
                    continue;
                }
                for &side in &sides {
                    tasks.push(LogTask::bind(descriptor, &config.data_root, &cp, side, None)?);
                }
            }
            for task in &tasks {
                tracing::debug!(log = %task.label(), root = %task.root().display(), "bound");
            }
            groups.push(EndpointGroup { endpoint, tasks });
        }

        tracing::debug!(
            cp = %cp.name,
            start = %period.start(),
            stop = %period.stop(),
            tasks = groups.iter().map(|g| g.tasks.len()).sum::<usize>(),
            "selection resolved"
        );
        Ok(Self { cp, period, groups })
    }
}

/// Resolve `--cp`, falling back to the only configured CP.
fn resolve_cp(config: &Config, name: Option<&str>) -> Result<CpInfo, LogError> {
    let directory = config.directory();
    match name {
        Some(name) => directory
            .lookup(name)
            .ok_or_else(|| LogError::UnknownCp(name.to_string())),
        None => directory.default_cp().ok_or_else(|| {
            if directory.all().is_empty() {
                LogError::Usage("no CPs configured; add [[cp]] tables to the config file".into())
            } else {
                LogError::Usage("several CPs are configured; choose one with --cp".into())
            }
        }),
    }
}

/// Report a reversed log and move on.
fn report_reversed(
    task: &LogTask<'_>,
    detail: StartGreaterThanStop,
    warnings: &mut dyn WarningSink,
) {
    tracing::debug!(log = task.descriptor().name, "reversed log left out");
    warnings.warn(Warning::ReversedLog {
        log: task.label(),
        detail,
    });
}

// ── Commands ──

/// Rows of one `list` table, under an endpoint heading when there is one.
type ListSection = (Option<&'static Endpoint>, Vec<ListRow>);

fn list_sections(
    plan: &Plan<'_>,
    warnings: &mut dyn WarningSink,
) -> Result<Vec<ListSection>, LogError> {
    let mut sections = Vec::new();
    for group in &plan.groups {
        let mut rows = Vec::new();
        for task in &group.tasks {
            match task.list_events(&plan.period, warnings)? {
                TaskOutcome::Completed(observed) => rows.push(ListRow::new(
                    task.descriptor().name,
                    task.endpoint().map(|e| e.name),
                    task.side(),
                    &observed,
                )),
                TaskOutcome::StartGreaterThanStop(detail) => {
                    report_reversed(task, detail, warnings);
                }
            }
        }
        sections.push((group.endpoint, rows));
    }
    Ok(sections)
}

fn cmd_list(plan: &Plan<'_>, json: bool, warnings: &mut dyn WarningSink) -> Result<(), LogError> {
    let sections = list_sections(plan, warnings)?;

    if json {
        let rows: Vec<&ListRow> = sections.iter().flat_map(|(_, rows)| rows).collect();
        let json = serde_json::to_string_pretty(&rows)
            .map_err(|e| LogError::io("failed to serialize report", e.into()))?;
        println!("{json}");
        return Ok(());
    }

    for (endpoint, rows) in &sections {
        if let Some(endpoint) = endpoint {
            println!("{}", endpoint_heading(endpoint.name));
        }
        print!("{}", format_list_table(rows));
    }
    Ok(())
}

fn cmd_read(
    plan: &Plan<'_>,
    filter: &dyn RecordFilter,
    warnings: &mut dyn WarningSink,
) -> Result<(), LogError> {
    let stdout = io::stdout();
    let mut printer = RecordPrinter::new(stdout.lock());

    for group in &plan.groups {
        if let Some(endpoint) = group.endpoint {
            println!("{}", endpoint_heading(endpoint.name));
        }
        for task in &group.tasks {
            println!(
                "{}",
                read_heading(
                    task.descriptor().name,
                    task.side(),
                    task.endpoint().map(|e| e.name)
                )
            );
            match task.read_events(&plan.period, filter, &mut printer, warnings)? {
                TaskOutcome::Completed(observed) if observed.is_empty() => {
                    println!("No records");
                }
                TaskOutcome::Completed(_) => {}
                TaskOutcome::StartGreaterThanStop(detail) => {
                    report_reversed(task, detail, warnings);
                }
            }
        }
    }
    io::stdout()
        .flush()
        .map_err(|e| LogError::io("cannot write output", e))
}

fn cmd_transfer(
    config: &Config,
    plan: &Plan<'_>,
    warnings: &mut dyn WarningSink,
) -> Result<(), LogError> {
    let _lock = TransferLock::acquire(&config.support_data)?;
    let mut staging = Staging::begin(&config.staging_root())?;

    for group in &plan.groups {
        for task in &group.tasks {
            match task.transfer_logs(&plan.period, &NoFilter, &mut staging, warnings)? {
                TaskOutcome::Completed(Some(_)) => eprintln!("Staged {}", task.label()),
                TaskOutcome::Completed(None) => {}
                TaskOutcome::StartGreaterThanStop(detail) => {
                    report_reversed(task, detail, warnings);
                }
            }
        }
    }

    let name = format!(
        "{}_logs_{}.zip",
        plan.cp.name.to_lowercase(),
        Time::now().to_compact_seconds()
    );
    let archiver = ZipCommand::new(config.archiver.clone());
    match staging.finalize(&archiver, &config.support_data.join(name))? {
        Some(archive) => println!("{}", archive.display()),
        None => eprintln!("No matching log records; nothing transferred"),
    }
    Ok(())
}
