use clap::{Args, Subcommand};

use hrflow_core::domain::delegation::DelegationId;
use hrflow_core::domain::employee::EmployeeId;
use hrflow_engine::ApprovalEngine;

use crate::commands::{
    parse_country, parse_instant, run_engine_command, CommandError, CommandResult, Reply,
};

#[derive(Debug, Clone, Subcommand)]
pub enum DelegateCommand {
    #[command(about = "Route a supervisor's new approvals to a delegate for a time window")]
    Create(CreateDelegationArgs),
    #[command(about = "Stop a delegation; its history is kept")]
    Deactivate(DeactivateDelegationArgs),
    #[command(about = "List a supervisor's delegations, newest first")]
    List(ListDelegationsArgs),
}

#[derive(Debug, Clone, Args)]
pub struct CreateDelegationArgs {
    #[arg(long)]
    pub supervisor: String,
    #[arg(long)]
    pub delegate: String,
    #[arg(long, help = "RFC 3339 instant or YYYY-MM-DD (start of day, UTC)")]
    pub start: String,
    #[arg(long, help = "RFC 3339 instant or YYYY-MM-DD (end of day, UTC)")]
    pub end: String,
    #[arg(long)]
    pub country: String,
}

#[derive(Debug, Clone, Args)]
pub struct DeactivateDelegationArgs {
    #[arg(help = "Delegation id")]
    pub id: String,
    #[arg(long)]
    pub country: String,
}

#[derive(Debug, Clone, Args)]
pub struct ListDelegationsArgs {
    #[arg(long)]
    pub supervisor: String,
    #[arg(long)]
    pub country: String,
}

pub fn run(command: DelegateCommand) -> CommandResult {
    match command {
        DelegateCommand::Create(args) => {
            run_engine_command("delegate create", |engine| create_with(engine, args))
        }
        DelegateCommand::Deactivate(args) => {
            run_engine_command("delegate deactivate", |engine| deactivate_with(engine, args))
        }
        DelegateCommand::List(args) => {
            run_engine_command("delegate list", |engine| list_with(engine, args))
        }
    }
}

async fn create_with(
    engine: ApprovalEngine,
    args: CreateDelegationArgs,
) -> Result<Reply, CommandError> {
    let tenant = parse_country(&args.country)?;
    let start = parse_instant(&args.start, false)?;
    let end = parse_instant(&args.end, true)?;

    let delegation = engine
        .delegations()
        .create_delegation(
            &tenant,
            &EmployeeId::new(args.supervisor),
            &EmployeeId::new(args.delegate),
            start,
            end,
        )
        .await?;

    Reply::new(
        format!(
            "delegation {} routes {} to {}",
            delegation.id, delegation.supervisor_id, delegation.delegate_id
        ),
        delegation,
    )
}

async fn deactivate_with(
    engine: ApprovalEngine,
    args: DeactivateDelegationArgs,
) -> Result<Reply, CommandError> {
    let tenant = parse_country(&args.country)?;
    let delegation = engine.delegations().deactivate(&tenant, &DelegationId(args.id)).await?;
    Reply::new(format!("delegation {} deactivated", delegation.id), delegation)
}

async fn list_with(
    engine: ApprovalEngine,
    args: ListDelegationsArgs,
) -> Result<Reply, CommandError> {
    let tenant = parse_country(&args.country)?;
    let delegations = engine
        .delegations()
        .list_for_supervisor(&tenant, &EmployeeId::new(args.supervisor))
        .await?;
    Reply::new(format!("{} delegation(s)", delegations.len()), delegations)
}
