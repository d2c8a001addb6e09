use serde::Serialize;
use tracing::info;

use hrflow_core::approvals::{check_cancellation, check_decision, ChainPosition, DecisionRefusal};
use hrflow_core::domain::approval::{ApprovalId, ApprovalRequest, ApprovalStatus};
use hrflow_core::domain::employee::{CountryCode, EmployeeId};
use hrflow_core::notify::Notification;
use hrflow_db::{Decision, DecisionWrite};

use crate::builder::{conflict_as_bad_request, CreateApprovalOptions};
use crate::engine::ApprovalEngine;
use crate::error::EngineError;
use crate::sync::{SyncContext, SyncOutcome};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecisionOutcome {
    pub approval: ApprovalRequest,
    /// Row opened for the next approver, when the chain continues.
    pub next_level: Option<ApprovalRequest>,
    /// Present only when the approved row closed the chain.
    pub synchronization: Option<SyncOutcome>,
}

/// What approving a row does to the rest of its chain.
enum NextStep {
    /// Insert `row` in the same write as the approval.
    Open { row: ApprovalRequest, supervisor: EmployeeId },
    /// The next level already exists and is reported as the outcome's next level.
    Reuse(ApprovalRequest),
    /// A row the caller opened up front; its approver is only reminded.
    Remind(ApprovalRequest),
    Close,
    Stop,
}

impl ApprovalEngine {
    pub async fn approve_request(
        &self,
        tenant: &CountryCode,
        approval_id: &ApprovalId,
        approver_id: &EmployeeId,
        comments: Option<String>,
        is_hr_override: bool,
    ) -> Result<DecisionOutcome, EngineError> {
        let current = self.get_by_id(tenant, approval_id).await?;
        check_decision(&current, approver_id, is_hr_override)?;

        let step = self.next_step(tenant, &current).await?;
        let mut decision = Decision::new(ApprovalStatus::Approved, comments);
        if let NextStep::Open { row, .. } = &step {
            decision = decision.with_continuation(row.clone());
        }

        let approval = self.decide(tenant, approval_id, decision).await?;
        self.log_decision(&approval, approver_id, is_hr_override);

        let mut outcome =
            DecisionOutcome { approval: approval.clone(), next_level: None, synchronization: None };

        match step {
            NextStep::Open { row, supervisor } => {
                self.announce_created(&row, &supervisor).await;
                outcome.next_level = Some(row);
            }
            NextStep::Reuse(existing) => {
                self.notify(requested(&existing)).await;
                outcome.next_level = Some(existing);
            }
            NextStep::Remind(existing) => self.notify(requested(&existing)).await,
            NextStep::Close => {
                let ctx = SyncContext::for_final_approval(&approval, approver_id);
                outcome.synchronization = Some(self.synchronizers.dispatch(&ctx).await);
                self.notify(decided(&approval, approver_id)).await;
            }
            NextStep::Stop => {}
        }

        Ok(outcome)
    }

    /// Resolved before the decision is written so a failure leaves `current` pending.
    async fn next_step(
        &self,
        tenant: &CountryCode,
        current: &ApprovalRequest,
    ) -> Result<NextStep, EngineError> {
        if let Some((supervisor, position)) = ChainPosition::after(current)? {
            let existing = self
                .approvals
                .find_level(tenant, &current.request_type, &current.request_id, position.approval_level)
                .await?;
            if let Some(existing) = existing {
                return Ok(NextStep::Reuse(existing));
            }

            let options = CreateApprovalOptions::in_tenant(tenant.clone()).with_position(position);
            let row = self.prepare_approval_request(&current.subject(), &supervisor, options).await?;
            return Ok(NextStep::Open { row, supervisor });
        }

        if current.is_final_approval {
            return Ok(NextStep::Close);
        }

        let level = ChainPosition::next_level(current.approval_level)?;
        let existing = self
            .approvals
            .find_level(tenant, &current.request_type, &current.request_id, level)
            .await?;
        Ok(existing.map_or(NextStep::Stop, NextStep::Remind))
    }

    pub async fn reject_request(
        &self,
        tenant: &CountryCode,
        approval_id: &ApprovalId,
        approver_id: &EmployeeId,
        comments: Option<String>,
        is_hr_override: bool,
    ) -> Result<ApprovalRequest, EngineError> {
        let current = self.get_by_id(tenant, approval_id).await?;
        check_decision(&current, approver_id, is_hr_override)?;

        let approval = self
            .decide(tenant, approval_id, Decision::new(ApprovalStatus::Rejected, comments))
            .await?;
        self.log_decision(&approval, approver_id, is_hr_override);
        self.notify(decided(&approval, approver_id)).await;

        Ok(approval)
    }

    /// Only the requester may cancel, and only while the row is pending.
    pub async fn cancel_request(
        &self,
        tenant: &CountryCode,
        approval_id: &ApprovalId,
        employee_id: &EmployeeId,
    ) -> Result<ApprovalRequest, EngineError> {
        let current = self.get_by_id(tenant, approval_id).await?;
        check_cancellation(&current, employee_id)?;

        let approval = self
            .decide(tenant, approval_id, Decision::new(ApprovalStatus::Cancelled, None))
            .await?;
        self.log_decision(&approval, employee_id, false);
        self.notify(Notification::ApprovalCancelled {
            approval_id: approval.id.clone(),
            request_type: approval.request_type.clone(),
            request_id: approval.request_id.clone(),
            employee_id: approval.employee_id.clone(),
            approver_id: approval.approver_id.clone(),
        })
        .await;

        Ok(approval)
    }

    /// Applies the decision only if the row is still pending when the write lands.
    async fn decide(
        &self,
        tenant: &CountryCode,
        approval_id: &ApprovalId,
        decision: Decision,
    ) -> Result<ApprovalRequest, EngineError> {
        let write = self
            .approvals
            .decide_if_pending(tenant, approval_id, &decision)
            .await
            .map_err(conflict_as_bad_request)?;
        match write {
            DecisionWrite::Applied(approval) => Ok(approval),
            DecisionWrite::AlreadyDecided(status) => {
                Err(DecisionRefusal::AlreadyReviewed { status }.into())
            }
            DecisionWrite::Missing => Err(EngineError::not_found("approval", approval_id)),
        }
    }

    fn log_decision(&self, approval: &ApprovalRequest, actor: &EmployeeId, is_hr_override: bool) {
        info!(
            event_name = "approval.decision.applied",
            approval_id = %approval.id,
            request_type = %approval.request_type,
            request_id = %approval.request_id,
            status = approval.status.as_str(),
            actor = %actor,
            hr_override = is_hr_override,
            approval_level = approval.approval_level,
            country_code = %approval.country_code,
            "approval decision applied"
        );
    }
}

fn decided(approval: &ApprovalRequest, decided_by: &EmployeeId) -> Notification {
    Notification::ApprovalDecided {
        approval_id: approval.id.clone(),
        request_type: approval.request_type.clone(),
        request_id: approval.request_id.clone(),
        employee_id: approval.employee_id.clone(),
        decided_by: decided_by.clone(),
        status: approval.status,
        comments: approval.comments.clone(),
    }
}

pub(crate) fn requested(approval: &ApprovalRequest) -> Notification {
    Notification::ApprovalRequested {
        approval_id: approval.id.clone(),
        request_type: approval.request_type.clone(),
        request_id: approval.request_id.clone(),
        employee_id: approval.employee_id.clone(),
        approver_id: approval.approver_id.clone(),
        approval_level: approval.approval_level,
        country_code: approval.country_code.clone(),
    }
}
