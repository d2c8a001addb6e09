use clap::{Args, Subcommand};
use serde_json::json;

use hrflow_core::domain::employee::{EmployeeId, EmployeeRecord};
use hrflow_engine::ApprovalEngine;

use crate::commands::{
    parse_country, parse_optional_country, run_engine_command, CommandError, CommandResult, Reply,
};

#[derive(Debug, Clone, Subcommand)]
pub enum EmployeeCommand {
    #[command(about = "Create or replace an employee's tenant and manager")]
    Upsert(UpsertEmployeeArgs),
}

#[derive(Debug, Clone, Subcommand)]
pub enum RoleCommand {
    #[command(about = "Make an employee the holder of a role within a tenant")]
    Assign(AssignRoleArgs),
}

#[derive(Debug, Clone, Args)]
pub struct UpsertEmployeeArgs {
    #[arg(help = "Employee id")]
    pub id: String,
    #[arg(long)]
    pub country: Option<String>,
    #[arg(long)]
    pub manager: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct AssignRoleArgs {
    #[arg(help = "Role name, e.g. hr_manager or ceo")]
    pub role: String,
    #[arg(long)]
    pub employee: String,
    #[arg(long)]
    pub country: String,
}

pub fn employee(command: EmployeeCommand) -> CommandResult {
    match command {
        EmployeeCommand::Upsert(args) => {
            run_engine_command("employee upsert", |engine| upsert_with(engine, args))
        }
    }
}

pub fn role(command: RoleCommand) -> CommandResult {
    match command {
        RoleCommand::Assign(args) => {
            run_engine_command("role assign", |engine| assign_with(engine, args))
        }
    }
}

async fn upsert_with(
    engine: ApprovalEngine,
    args: UpsertEmployeeArgs,
) -> Result<Reply, CommandError> {
    let record = EmployeeRecord {
        id: EmployeeId::new(args.id),
        country_code: parse_optional_country(args.country.as_deref())?,
        manager_id: args.manager.map(EmployeeId::new),
    };
    engine.upsert_employee(record.clone()).await?;
    Reply::new(format!("employee {} saved", record.id), record)
}

async fn assign_with(engine: ApprovalEngine, args: AssignRoleArgs) -> Result<Reply, CommandError> {
    let tenant = parse_country(&args.country)?;
    let employee_id = EmployeeId::new(args.employee);
    engine.assign_role(&args.role, &tenant, &employee_id).await?;

    Reply::new(
        format!("{} now holds {} in {}", employee_id, args.role.trim(), tenant),
        json!({ "role": args.role.trim(), "country_code": tenant, "employee_id": employee_id }),
    )
}
