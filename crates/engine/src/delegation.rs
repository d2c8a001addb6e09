use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use hrflow_core::approvals::select_effective_delegation;
use hrflow_core::domain::delegation::{ApprovalDelegation, DelegationId, DelegationWindow};
use hrflow_core::domain::employee::{CountryCode, EmployeeId};
use hrflow_db::DelegationRepository;

use crate::error::EngineError;

/// Substitutes a temporary delegate for a supervisor while a delegation is in force.
///
/// Delegations are only consulted when a row is created; existing rows keep the
/// approver they were assigned.
#[derive(Clone)]
pub struct DelegationResolver {
    delegations: Arc<dyn DelegationRepository>,
}

impl DelegationResolver {
    pub fn new(delegations: Arc<dyn DelegationRepository>) -> Self {
        Self { delegations }
    }

    pub async fn get_active_delegate(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
        at: DateTime<Utc>,
    ) -> Result<Option<EmployeeId>, EngineError> {
        let candidates = self.delegations.list_effective(tenant, supervisor_id, at).await?;
        Ok(select_effective_delegation(&candidates, at).map(|row| row.delegate_id.clone()))
    }

    /// The approver a new row should be assigned to: the delegate if one is in force.
    pub async fn effective_approver(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
        at: DateTime<Utc>,
    ) -> Result<EmployeeId, EngineError> {
        Ok(self
            .get_active_delegate(tenant, supervisor_id, at)
            .await?
            .unwrap_or_else(|| supervisor_id.clone()))
    }

    pub async fn create_delegation(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
        delegate_id: &EmployeeId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ApprovalDelegation, EngineError> {
        let window = DelegationWindow::new(start, end)?;
        if supervisor_id == delegate_id {
            return Err(EngineError::BadRequest(format!(
                "`{supervisor_id}` cannot delegate approvals to themselves"
            )));
        }

        let delegation = ApprovalDelegation::new(
            supervisor_id.clone(),
            delegate_id.clone(),
            tenant.clone(),
            window,
            Utc::now(),
        );
        self.delegations.insert(delegation.clone()).await?;

        info!(
            event_name = "approval.delegation.created",
            delegation_id = %delegation.id,
            supervisor_id = %delegation.supervisor_id,
            delegate_id = %delegation.delegate_id,
            country_code = %tenant,
            "delegation created"
        );
        Ok(delegation)
    }

    pub async fn deactivate(
        &self,
        tenant: &CountryCode,
        delegation_id: &DelegationId,
    ) -> Result<ApprovalDelegation, EngineError> {
        let delegation = self
            .delegations
            .deactivate(tenant, delegation_id)
            .await?
            .ok_or_else(|| EngineError::not_found("delegation", delegation_id))?;

        info!(
            event_name = "approval.delegation.deactivated",
            delegation_id = %delegation.id,
            country_code = %tenant,
            "delegation deactivated"
        );
        Ok(delegation)
    }

    pub async fn list_for_supervisor(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
    ) -> Result<Vec<ApprovalDelegation>, EngineError> {
        Ok(self.delegations.list_for_supervisor(tenant, supervisor_id).await?)
    }
}
