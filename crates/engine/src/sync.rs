//! Post-approval synchronization with the business module that owns a request.
//!
//! Handlers are keyed by request type and run once, when the final level of a
//! chain is approved. Their failures are reported in the decision outcome and
//! logged; they never undo the decision itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use hrflow_core::approvals::{resignation_hr_acceptance, HrAcceptance};
use hrflow_core::domain::approval::{ApprovalRequest, RequestId, RequestType};
use hrflow_core::domain::employee::{CountryCode, EmployeeId};
use hrflow_db::{ApprovalRepository, RepositoryError};

#[derive(Clone, Debug)]
pub struct SyncContext {
    pub tenant: CountryCode,
    pub request_id: RequestId,
    pub approver_id: EmployeeId,
    pub approval: ApprovalRequest,
}

impl SyncContext {
    pub fn for_final_approval(approval: &ApprovalRequest, approver_id: &EmployeeId) -> Self {
        Self {
            tenant: approval.country_code.clone(),
            request_id: approval.request_id.clone(),
            approver_id: approver_id.clone(),
            approval: approval.clone(),
        }
    }

    fn decided_at(&self) -> DateTime<Utc> {
        self.approval.reviewed_at.unwrap_or_else(Utc::now)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEffect {
    Applied,
    Skipped(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("entity port failed: {0}")]
    Port(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncOutcome {
    Applied,
    Skipped { reason: String },
    Failed { message: String },
    NotRegistered,
}

#[async_trait]
pub trait EntitySynchronizer: Send + Sync {
    fn request_type(&self) -> RequestType;

    async fn synchronize(&self, ctx: &SyncContext) -> Result<SyncEffect, SyncError>;
}

#[async_trait]
pub trait CaseResolutionPort: Send + Sync {
    async fn mark_resolved(
        &self,
        tenant: &CountryCode,
        case_type: &RequestType,
        case_id: &RequestId,
        resolved_by: &EmployeeId,
        resolution_date: DateTime<Utc>,
    ) -> Result<(), SyncError>;
}

#[async_trait]
pub trait RequisitionPort: Send + Sync {
    async fn mark_approved(
        &self,
        tenant: &CountryCode,
        requisition_id: &RequestId,
        approved_by: &EmployeeId,
        approved_at: DateTime<Utc>,
    ) -> Result<(), SyncError>;
}

#[async_trait]
pub trait ResignationPort: Send + Sync {
    async fn accept_by_hr(
        &self,
        tenant: &CountryCode,
        resignation_id: &RequestId,
        acceptance: &HrAcceptance,
    ) -> Result<(), SyncError>;
}

#[derive(Default)]
pub struct SynchronizerRegistry {
    handlers: HashMap<RequestType, Arc<dyn EntitySynchronizer>>,
}

impl SynchronizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for every module the engine ships with, wired to the given ports.
    pub fn standard(
        approvals: Arc<dyn ApprovalRepository>,
        cases: Arc<dyn CaseResolutionPort>,
        requisitions: Arc<dyn RequisitionPort>,
        resignations: Arc<dyn ResignationPort>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(LeaveSynchronizer);
        registry
            .register(CaseResolutionSynchronizer::new(RequestType::Safeguarding, cases.clone()));
        registry.register(CaseResolutionSynchronizer::new(RequestType::Grievance, cases));
        registry.register(RequisitionSynchronizer::new(requisitions));
        registry.register(ResignationSynchronizer::new(approvals, resignations));
        registry
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EntitySynchronizer + 'static,
    {
        self.handlers.insert(handler.request_type(), Arc::new(handler));
    }

    pub fn is_registered(&self, request_type: &RequestType) -> bool {
        self.handlers.contains_key(request_type)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn dispatch(&self, ctx: &SyncContext) -> SyncOutcome {
        let request_type = &ctx.approval.request_type;
        let Some(handler) = self.handlers.get(request_type) else {
            debug!(
                event_name = "approval.sync.unregistered",
                request_type = %request_type,
                request_id = %ctx.request_id,
                "no synchronizer registered"
            );
            return SyncOutcome::NotRegistered;
        };

        match handler.synchronize(ctx).await {
            Ok(SyncEffect::Applied) => {
                info!(
                    event_name = "approval.sync.applied",
                    request_type = %request_type,
                    request_id = %ctx.request_id,
                    approver_id = %ctx.approver_id,
                    "originating entity synchronized"
                );
                SyncOutcome::Applied
            }
            Ok(SyncEffect::Skipped(reason)) => {
                info!(
                    event_name = "approval.sync.skipped",
                    request_type = %request_type,
                    request_id = %ctx.request_id,
                    reason = %reason,
                    "synchronization skipped"
                );
                SyncOutcome::Skipped { reason }
            }
            Err(error) => {
                warn!(
                    event_name = "approval.sync.failed",
                    request_type = %request_type,
                    request_id = %ctx.request_id,
                    error = %error,
                    "synchronization failed; decision stands"
                );
                SyncOutcome::Failed { message: error.to_string() }
            }
        }
    }
}

/// Leave reads approval status directly, so there is nothing to push.
#[derive(Clone, Copy, Debug, Default)]
pub struct LeaveSynchronizer;

#[async_trait]
impl EntitySynchronizer for LeaveSynchronizer {
    fn request_type(&self) -> RequestType {
        RequestType::Leave
    }

    async fn synchronize(&self, _ctx: &SyncContext) -> Result<SyncEffect, SyncError> {
        Ok(SyncEffect::Applied)
    }
}

pub struct CaseResolutionSynchronizer {
    request_type: RequestType,
    cases: Arc<dyn CaseResolutionPort>,
}

impl CaseResolutionSynchronizer {
    pub fn new(request_type: RequestType, cases: Arc<dyn CaseResolutionPort>) -> Self {
        Self { request_type, cases }
    }
}

#[async_trait]
impl EntitySynchronizer for CaseResolutionSynchronizer {
    fn request_type(&self) -> RequestType {
        self.request_type.clone()
    }

    async fn synchronize(&self, ctx: &SyncContext) -> Result<SyncEffect, SyncError> {
        self.cases
            .mark_resolved(
                &ctx.tenant,
                &self.request_type,
                &ctx.request_id,
                &ctx.approver_id,
                ctx.decided_at(),
            )
            .await?;
        Ok(SyncEffect::Applied)
    }
}

pub struct RequisitionSynchronizer {
    requisitions: Arc<dyn RequisitionPort>,
}

impl RequisitionSynchronizer {
    pub fn new(requisitions: Arc<dyn RequisitionPort>) -> Self {
        Self { requisitions }
    }
}

#[async_trait]
impl EntitySynchronizer for RequisitionSynchronizer {
    fn request_type(&self) -> RequestType {
        RequestType::Workforce
    }

    async fn synchronize(&self, ctx: &SyncContext) -> Result<SyncEffect, SyncError> {
        self.requisitions
            .mark_approved(&ctx.tenant, &ctx.request_id, &ctx.approver_id, ctx.decided_at())
            .await?;
        Ok(SyncEffect::Applied)
    }
}

/// Accepts a resignation only once both the supervisor and a different HR
/// approver have signed off, judged from the whole chain.
pub struct ResignationSynchronizer {
    approvals: Arc<dyn ApprovalRepository>,
    resignations: Arc<dyn ResignationPort>,
}

impl ResignationSynchronizer {
    pub fn new(
        approvals: Arc<dyn ApprovalRepository>,
        resignations: Arc<dyn ResignationPort>,
    ) -> Self {
        Self { approvals, resignations }
    }
}

#[async_trait]
impl EntitySynchronizer for ResignationSynchronizer {
    fn request_type(&self) -> RequestType {
        RequestType::Resignation
    }

    async fn synchronize(&self, ctx: &SyncContext) -> Result<SyncEffect, SyncError> {
        let rows =
            self.approvals.find_chain(&ctx.tenant, &RequestType::Resignation, &ctx.request_id).await?;

        let Some(acceptance) = resignation_hr_acceptance(&rows) else {
            return Ok(SyncEffect::Skipped(
                "resignation needs supervisor and distinct HR approval".to_string(),
            ));
        };

        self.resignations.accept_by_hr(&ctx.tenant, &ctx.request_id, &acceptance).await?;
        Ok(SyncEffect::Applied)
    }
}

/// Ports that only log, for hosts such as the CLI that have no business modules attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEntityPorts;

#[async_trait]
impl CaseResolutionPort for TracingEntityPorts {
    async fn mark_resolved(
        &self,
        tenant: &CountryCode,
        case_type: &RequestType,
        case_id: &RequestId,
        resolved_by: &EmployeeId,
        resolution_date: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        info!(
            event_name = "entity.case.resolved",
            country_code = %tenant,
            case_type = %case_type,
            case_id = %case_id,
            resolved_by = %resolved_by,
            resolution_date = %resolution_date,
            "case marked resolved"
        );
        Ok(())
    }
}

#[async_trait]
impl RequisitionPort for TracingEntityPorts {
    async fn mark_approved(
        &self,
        tenant: &CountryCode,
        requisition_id: &RequestId,
        approved_by: &EmployeeId,
        approved_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        info!(
            event_name = "entity.requisition.approved",
            country_code = %tenant,
            requisition_id = %requisition_id,
            approved_by = %approved_by,
            approved_at = %approved_at,
            "requisition marked approved"
        );
        Ok(())
    }
}

#[async_trait]
impl ResignationPort for TracingEntityPorts {
    async fn accept_by_hr(
        &self,
        tenant: &CountryCode,
        resignation_id: &RequestId,
        acceptance: &HrAcceptance,
    ) -> Result<(), SyncError> {
        info!(
            event_name = "entity.resignation.accepted",
            country_code = %tenant,
            resignation_id = %resignation_id,
            supervisor_id = %acceptance.supervisor_id,
            hr_approver_id = %acceptance.hr_approver_id,
            "resignation accepted by HR"
        );
        Ok(())
    }
}
