//! Pure approval rules shared by the engine and its stores.
//!
//! Nothing here performs I/O: the engine loads rows, asks these functions what is
//! allowed, and persists the outcome.

pub mod chain;
pub mod stats;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalRequest, ApprovalStatus};
use crate::domain::delegation::ApprovalDelegation;
use crate::domain::employee::EmployeeId;

pub use chain::ChainPosition;
pub use stats::ApproverStats;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionRefusal {
    NotAssignedApprover { assigned: EmployeeId, actor: EmployeeId },
    NotRequester { requester: EmployeeId, actor: EmployeeId },
    AlreadyReviewed { status: ApprovalStatus },
}

impl DecisionRefusal {
    pub fn reason(&self) -> String {
        match self {
            Self::NotAssignedApprover { assigned, actor } => {
                format!("`{actor}` is not the assigned approver (`{assigned}`)")
            }
            Self::NotRequester { requester, actor } => {
                format!("only the requester `{requester}` may cancel, not `{actor}`")
            }
            Self::AlreadyReviewed { status } => {
                format!("approval already reviewed (status {})", status.as_str())
            }
        }
    }

    pub fn is_authorization(&self) -> bool {
        !matches!(self, Self::AlreadyReviewed { .. })
    }
}

/// Authorization runs before the status check so a stranger learns nothing
/// about the row's state.
pub fn check_decision(
    approval: &ApprovalRequest,
    actor: &EmployeeId,
    is_hr_override: bool,
) -> Result<(), DecisionRefusal> {
    if !is_hr_override && &approval.approver_id != actor {
        return Err(DecisionRefusal::NotAssignedApprover {
            assigned: approval.approver_id.clone(),
            actor: actor.clone(),
        });
    }
    if !approval.is_pending() {
        return Err(DecisionRefusal::AlreadyReviewed { status: approval.status });
    }
    Ok(())
}

pub fn check_cancellation(
    approval: &ApprovalRequest,
    actor: &EmployeeId,
) -> Result<(), DecisionRefusal> {
    if &approval.employee_id != actor {
        return Err(DecisionRefusal::NotRequester {
            requester: approval.employee_id.clone(),
            actor: actor.clone(),
        });
    }
    if !approval.is_pending() {
        return Err(DecisionRefusal::AlreadyReviewed { status: approval.status });
    }
    Ok(())
}

/// Picks the delegation in force at `at`. Overlaps resolve to the most recently
/// created row, then the greatest id.
pub fn select_effective_delegation(
    candidates: &[ApprovalDelegation],
    at: DateTime<Utc>,
) -> Option<&ApprovalDelegation> {
    candidates.iter().filter(|delegation| delegation.is_effective_at(at)).max_by(|left, right| {
        left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
    })
}

/// Evidence that a resignation cleared both the supervisor and a distinct HR approver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrAcceptance {
    pub supervisor_id: EmployeeId,
    pub hr_approver_id: EmployeeId,
    pub accepted_at: DateTime<Utc>,
}

/// Re-derives resignation acceptance from every row of the chain instead of
/// trusting `is_final_approval` on the row that just closed.
pub fn resignation_hr_acceptance(rows: &[ApprovalRequest]) -> Option<HrAcceptance> {
    let supervisor = rows
        .iter()
        .find(|row| row.approval_level == 1 && row.status == ApprovalStatus::Approved)?;

    let hr = rows
        .iter()
        .filter(|row| {
            row.approval_level >= 2
                && row.status == ApprovalStatus::Approved
                && row.approver_id != supervisor.approver_id
        })
        .max_by_key(|row| row.approval_level)?;

    Some(HrAcceptance {
        supervisor_id: supervisor.approver_id.clone(),
        hr_approver_id: hr.approver_id.clone(),
        accepted_at: hr.reviewed_at.unwrap_or_else(Utc::now),
    })
}
