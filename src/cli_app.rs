//! Top-level CLI definition and dispatch.

use std::collections::HashSet;
use std::io::{self, IsTerminal, Write};

use clap::{ArgGroup, Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::control;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use squid::cli::dashboard::{self, DashboardOptions};
use squid::cli::{attribute_table, bulk_summary, job_table};
use squid::core::config::Config;
use squid::core::errors::SquidError;
use squid::logger::jsonl::{JsonlConfig, JsonlWriter};
use squid::queue::controller::{BulkFailure, BulkReport, QueueController};
use squid::queue::filter::FilterSpec;
use squid::queue::job::{JobField, filterable_attributes, is_job_id};
use squid::queue::scheduler::{JobAction, Scheduler, SlurmScheduler};

/// squid: watch and manage your Slurm jobs.
#[derive(Debug, Parser)]
#[command(
    name = "squid",
    author,
    version,
    about = "Interactive Slurm queue dashboard",
    long_about = None
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<std::path::PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute; the dashboard when omitted.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Live, interactive queue view.
    Dashboard(DashboardArgs),
    /// Print the current queue once.
    List(FilterArgs),
    /// Hold pending jobs.
    Hold(MutateArgs),
    /// Release held jobs.
    Release(MutateArgs),
    /// Cancel jobs.
    Kill(MutateArgs),
    /// List the attributes jobs can be filtered on.
    Attributes,
    /// Inspect configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct DashboardArgs {
    /// Automatic refresh period (0 disables); overrides the config.
    #[arg(long, value_name = "MILLISECONDS")]
    refresh_ms: Option<u64>,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct FilterArgs {
    /// Attribute key to filter on (see `squid attributes`).
    #[arg(long, value_name = "KEY")]
    filter_by: Option<String>,
    /// Regular expression searched for in the attribute.
    #[arg(long, value_name = "REGEX")]
    pattern: Option<String>,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
#[command(group(ArgGroup::new("target").required(true).args(["job_ids", "all"])))]
struct MutateArgs {
    /// Job ids from your current queue.
    #[arg(value_name = "JOB_ID")]
    job_ids: Vec<String>,
    /// Every job in the (optionally filtered) queue.
    #[arg(long)]
    all: bool,
    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Print the effective configuration.
    Show,
    /// Validate the configuration.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

impl From<SquidError> for CliError {
    fn from(error: SquidError) -> Self {
        if error.is_user_error() {
            Self::User(error.to_string())
        } else {
            Self::Runtime(error.to_string())
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        None => run_dashboard(cli, &DashboardArgs::default()),
        Some(Command::Dashboard(args)) => run_dashboard(cli, args),
        Some(Command::List(args)) => run_list(cli, args),
        Some(Command::Hold(args)) => run_mutate(cli, JobAction::Hold, args),
        Some(Command::Release(args)) => run_mutate(cli, JobAction::Release, args),
        Some(Command::Kill(args)) => run_mutate(cli, JobAction::Kill, args),
        Some(Command::Attributes) => run_attributes(cli),
        Some(Command::Config(args)) => run_config(cli, args),
        Some(Command::Completions(args)) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref())?)
}

fn open_controller(config: &Config) -> Result<QueueController<SlurmScheduler>, CliError> {
    let controller = QueueController::new(SlurmScheduler::from_config(&config.scheduler)?);
    Ok(if config.logging.activity_log_enabled {
        controller.with_activity_log(JsonlWriter::open(JsonlConfig::from_config(config)))
    } else {
        controller
    })
}

/// `--pattern` without `--filter-by` searches the configured default attribute.
fn filter_from_args(config: &Config, args: &FilterArgs) -> Result<FilterSpec, CliError> {
    let Some(pattern) = args.pattern.as_deref() else {
        if let Some(key) = args.filter_by.as_deref() {
            key.parse::<JobField>()?;
        }
        return Ok(FilterSpec::identity());
    };
    let key = args
        .filter_by
        .as_deref()
        .unwrap_or(&config.dashboard.default_filter_attribute);
    Ok(FilterSpec::from_key(key, pattern)?)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_dashboard(cli: &Cli, args: &DashboardArgs) -> Result<(), CliError> {
    if !io::stdout().is_terminal() {
        return Err(CliError::User(
            "the dashboard needs a terminal; use `squid list` for plain output".to_string(),
        ));
    }
    let mut config = load_config(cli)?;
    if let Some(refresh_ms) = args.refresh_ms {
        config.dashboard.refresh_ms = refresh_ms;
    }
    let mut controller = open_controller(&config)?;
    let mut options = DashboardOptions::from_config(&config, controller.scheduler().user());
    options.color = !cli.no_color;
    dashboard::run(&mut controller, &options)?;
    Ok(())
}

fn run_list(cli: &Cli, args: &FilterArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let spec = filter_from_args(&config, args)?;
    let mut controller = open_controller(&config)?;
    controller.refresh(spec)?;

    match output_mode(cli) {
        OutputMode::Human => {
            print!("{}", job_table(controller.snapshot()));
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "list",
                "user": controller.scheduler().user(),
                "filter": controller.filter().describe(),
                "jobs": controller.snapshot(),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_mutate(cli: &Cli, action: JobAction, args: &MutateArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let spec = filter_from_args(&config, &args.filter)?;
    validate_job_ids(&args.job_ids)?;

    let mut controller = open_controller(&config)?;
    let report = if args.all {
        controller.refresh(spec)?;
        controller.apply_all(action)
    } else {
        controller.refresh(FilterSpec::identity())?;
        let unknown: Vec<&str> = args
            .job_ids
            .iter()
            .map(String::as_str)
            .filter(|id| controller.find(id).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(CliError::User(format!(
                "not in {}'s queue: {}",
                controller.scheduler().user(),
                unknown.join(", ")
            )));
        }
        mutate_ids(&mut controller, action, &args.job_ids)
    };

    match output_mode(cli) {
        OutputMode::Human => println!("{}", bulk_summary(&report)),
        OutputMode::Json => {
            let payload = json!({
                "command": action.label(),
                "report": &report,
            });
            write_json_line(&payload)?;
        }
    }
    report_outcome(&report)
}

fn run_attributes(cli: &Cli) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => print!("{}", attribute_table()),
        OutputMode::Json => {
            let attributes: Vec<Value> = filterable_attributes()
                .iter()
                .map(|(name, field)| json!({ "name": name, "key": field.key() }))
                .collect();
            write_json_line(&json!({
                "command": "attributes",
                "attributes": attributes,
            }))?;
        }
    }
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;

            match output_mode(cli) {
                OutputMode::Human => println!("{}", config.to_toml()?),
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_job_ids(ids: &[String]) -> Result<(), CliError> {
    let bad: Vec<&str> = ids
        .iter()
        .map(String::as_str)
        .filter(|id| !is_job_id(id))
        .collect();
    if bad.is_empty() {
        Ok(())
    } else {
        Err(CliError::User(format!("not a job id: {}", bad.join(", "))))
    }
}

/// Apply `action` once to each distinct listed job present in the snapshot,
/// continuing past failures.
fn mutate_ids<S: Scheduler>(
    controller: &mut QueueController<S>,
    action: JobAction,
    ids: &[String],
) -> BulkReport {
    let mut seen = HashSet::new();
    let mut failures = Vec::new();
    let mut attempted = 0;
    for id in ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let Some(job) = controller.find(id).cloned() else {
            continue;
        };
        attempted += 1;
        if let Err(error) = controller.mutate(action, &job) {
            failures.push(BulkFailure {
                job_id: id.clone(),
                error: error.to_string(),
            });
        }
    }
    BulkReport {
        action,
        attempted,
        skipped: 0,
        failures,
    }
}

fn report_outcome(report: &BulkReport) -> Result<(), CliError> {
    if report.is_success() {
        Ok(())
    } else if report.succeeded() == 0 {
        Err(CliError::Runtime(report.summary()))
    } else {
        Err(CliError::Partial(report.summary()))
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SQUID_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        _ => OutputMode::Human,
    }
}
