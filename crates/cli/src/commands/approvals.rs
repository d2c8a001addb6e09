use clap::Args;
use serde_json::json;

use hrflow_core::domain::approval::{ApprovalId, ApprovalSubject, RequestId};
use hrflow_core::domain::employee::EmployeeId;
use hrflow_engine::{ApprovalEngine, EngineError};

use crate::commands::{
    parse_country, parse_optional_country, parse_request_type, run_engine_command, CommandError,
    CommandResult, Reply,
};

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    #[arg(long = "type", help = "Request type, e.g. LEAVE or RESIGNATION")]
    pub request_type: String,
    #[arg(long, help = "Identifier of the originating business record")]
    pub request_id: String,
    #[arg(long, help = "Employee the request is about")]
    pub employee: String,
    #[arg(
        long = "approver",
        help = "Approver in chain order; repeat for multi-level chains",
        required_unless_present = "role",
        conflicts_with = "role"
    )]
    pub approvers: Vec<String>,
    #[arg(long, help = "Route to the employee's manager, then the holder of this role")]
    pub role: Option<String>,
    #[arg(long, help = "Tenant country code; resolved from the employee when omitted")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct DecideArgs {
    #[arg(help = "Approval id")]
    pub id: String,
    #[arg(long, help = "Employee acting on the approval")]
    pub approver: String,
    #[arg(long)]
    pub country: String,
    #[arg(long)]
    pub comments: Option<String>,
    #[arg(long, help = "Act as HR administrator regardless of the assigned approver")]
    pub hr_override: bool,
}

#[derive(Debug, Clone, Args)]
pub struct CancelArgs {
    #[arg(help = "Approval id")]
    pub id: String,
    #[arg(long, help = "Requesting employee")]
    pub employee: String,
    #[arg(long)]
    pub country: String,
}

#[derive(Debug, Clone, Args)]
pub struct ApproverArgs {
    #[arg(long)]
    pub approver: String,
    #[arg(long)]
    pub country: String,
}

#[derive(Debug, Clone, Args)]
pub struct ChainArgs {
    #[arg(long = "type")]
    pub request_type: String,
    #[arg(long)]
    pub request_id: String,
    #[arg(long)]
    pub country: String,
}

#[derive(Debug, Clone, Args)]
pub struct EmployeeRequestsArgs {
    #[arg(long)]
    pub employee: String,
    #[arg(long)]
    pub country: String,
}

pub fn submit(args: SubmitArgs) -> CommandResult {
    run_engine_command("submit", |engine| submit_with(engine, args))
}

async fn submit_with(engine: ApprovalEngine, args: SubmitArgs) -> Result<Reply, CommandError> {
    let request_type = parse_request_type(&args.request_type)?;
    let country = parse_optional_country(args.country.as_deref())?;
    let employee = EmployeeId::new(args.employee);
    let subject = ApprovalSubject::new(request_type, args.request_id, employee.clone());

    let approvers = match args.role {
        Some(role) => engine.supervisor_then_role(&employee, &role, country.as_ref()).await?,
        None => args.approvers.into_iter().map(EmployeeId::new).collect(),
    };
    let approval = engine.create_sequential_approval_chain(&subject, &approvers, country).await?;

    Reply::new(
        format!("approval {} assigned to {}", approval.id, approval.approver_id),
        approval,
    )
}

pub fn approve(args: DecideArgs) -> CommandResult {
    run_engine_command("approve", |engine| approve_with(engine, args))
}

async fn approve_with(engine: ApprovalEngine, args: DecideArgs) -> Result<Reply, CommandError> {
    let tenant = parse_country(&args.country)?;
    let outcome = engine
        .approve_request(
            &tenant,
            &ApprovalId(args.id),
            &EmployeeId::new(args.approver),
            args.comments,
            args.hr_override,
        )
        .await?;

    let message = match &outcome.next_level {
        Some(next) => format!(
            "approval {} approved; level {} assigned to {}",
            outcome.approval.id, next.approval_level, next.approver_id
        ),
        None => format!("approval {} approved", outcome.approval.id),
    };
    Reply::new(message, outcome)
}

pub fn reject(args: DecideArgs) -> CommandResult {
    run_engine_command("reject", |engine| reject_with(engine, args))
}

async fn reject_with(engine: ApprovalEngine, args: DecideArgs) -> Result<Reply, CommandError> {
    let tenant = parse_country(&args.country)?;
    let approval = engine
        .reject_request(
            &tenant,
            &ApprovalId(args.id),
            &EmployeeId::new(args.approver),
            args.comments,
            args.hr_override,
        )
        .await?;
    Reply::new(format!("approval {} rejected", approval.id), approval)
}

pub fn cancel(args: CancelArgs) -> CommandResult {
    run_engine_command("cancel", |engine| cancel_with(engine, args))
}

async fn cancel_with(engine: ApprovalEngine, args: CancelArgs) -> Result<Reply, CommandError> {
    let tenant = parse_country(&args.country)?;
    let approval = engine
        .cancel_request(&tenant, &ApprovalId(args.id), &EmployeeId::new(args.employee))
        .await?;
    Reply::new(format!("approval {} cancelled", approval.id), approval)
}

pub fn pending(args: ApproverArgs) -> CommandResult {
    run_engine_command("pending", |engine| pending_with(engine, args))
}

async fn pending_with(engine: ApprovalEngine, args: ApproverArgs) -> Result<Reply, CommandError> {
    let tenant = parse_country(&args.country)?;
    let rows = engine.get_pending_for_approver(&tenant, &EmployeeId::new(args.approver)).await?;
    Reply::new(format!("{} pending approval(s)", rows.len()), rows)
}

pub fn stats(args: ApproverArgs) -> CommandResult {
    run_engine_command("stats", |engine| stats_with(engine, args))
}

async fn stats_with(engine: ApprovalEngine, args: ApproverArgs) -> Result<Reply, CommandError> {
    let tenant = parse_country(&args.country)?;
    let stats = engine.get_stats_for_approver(&tenant, &EmployeeId::new(args.approver)).await?;
    Reply::new(format!("{} pending in total", stats.total_pending), stats)
}

pub fn chain(args: ChainArgs) -> CommandResult {
    run_engine_command("chain", |engine| chain_with(engine, args))
}

async fn chain_with(engine: ApprovalEngine, args: ChainArgs) -> Result<Reply, CommandError> {
    let tenant = parse_country(&args.country)?;
    let request_type = parse_request_type(&args.request_type)?;
    let rows =
        engine.get_chain(&tenant, &request_type, &RequestId(args.request_id.clone())).await?;
    if rows.is_empty() {
        return Err(CommandError::Engine(EngineError::not_found(
            "approval chain",
            format!("{request_type}/{}", args.request_id),
        )));
    }
    Reply::new(format!("{} level(s)", rows.len()), json!({ "levels": rows }))
}

pub fn requests(args: EmployeeRequestsArgs) -> CommandResult {
    run_engine_command("requests", |engine| requests_with(engine, args))
}

async fn requests_with(
    engine: ApprovalEngine,
    args: EmployeeRequestsArgs,
) -> Result<Reply, CommandError> {
    let tenant = parse_country(&args.country)?;
    let rows = engine.get_requests_for_employee(&tenant, &EmployeeId::new(args.employee)).await?;
    Reply::new(format!("{} request row(s)", rows.len()), rows)
}
