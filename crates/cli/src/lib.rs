pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hrflow_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing::Level;

use commands::approvals::{
    ApproverArgs, CancelArgs, ChainArgs, DecideArgs, EmployeeRequestsArgs, SubmitArgs,
};
use commands::delegations::DelegateCommand;
use commands::directory::{EmployeeCommand, RoleCommand};

#[derive(Debug, Parser)]
#[command(
    name = "hrflow",
    about = "HR approval workflow operator CLI",
    long_about = "Route HR requests through multi-level approval chains, record decisions, and manage delegations per tenant.",
    after_help = "Examples:\n  hrflow migrate\n  hrflow submit --type LEAVE --request-id LV-1 --employee E-1 --approver S-1 --country GH\n  hrflow approve APR-... --approver S-1 --country GH\n  hrflow doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, database connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Open an approval chain for a business request")]
    Submit(SubmitArgs),
    #[command(about = "Approve a pending approval row")]
    Approve(DecideArgs),
    #[command(about = "Reject a pending approval row")]
    Reject(DecideArgs),
    #[command(about = "Withdraw a pending approval row as the requesting employee")]
    Cancel(CancelArgs),
    #[command(about = "List rows waiting on an approver")]
    Pending(ApproverArgs),
    #[command(about = "Count an approver's pending rows by request type")]
    Stats(ApproverArgs),
    #[command(about = "Show every level of one request's approval chain")]
    Chain(ChainArgs),
    #[command(about = "List approval rows about an employee, newest first")]
    Requests(EmployeeRequestsArgs),
    #[command(subcommand, about = "Manage approval delegations")]
    Delegate(DelegateCommand),
    #[command(subcommand, about = "Maintain the employee directory")]
    Employee(EmployeeCommand),
    #[command(subcommand, about = "Maintain tenant role assignments")]
    Role(RoleCommand),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Submit(args) => commands::approvals::submit(args),
        Command::Approve(args) => commands::approvals::approve(args),
        Command::Reject(args) => commands::approvals::reject(args),
        Command::Cancel(args) => commands::approvals::cancel(args),
        Command::Pending(args) => commands::approvals::pending(args),
        Command::Stats(args) => commands::approvals::stats(args),
        Command::Chain(args) => commands::approvals::chain(args),
        Command::Requests(args) => commands::approvals::requests(args),
        Command::Delegate(command) => commands::delegations::run(command),
        Command::Employee(command) => commands::directory::employee(command),
        Command::Role(command) => commands::directory::role(command),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON payload.
fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
