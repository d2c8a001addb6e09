use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use hrflow_core::domain::approval::{ApprovalId, ApprovalRequest, RequestId, RequestType};
use hrflow_core::domain::delegation::{ApprovalDelegation, DelegationId};
use hrflow_core::domain::employee::{CountryCode, EmployeeId, EmployeeRecord};

use super::{
    level_taken, ApprovalRepository, Decision, DecisionWrite, DelegationRepository,
    EmployeeDirectory, RepositoryError, RoleDirectory,
};

/// Rows are kept in insertion order, which stands in for SQLite's rowid tiebreak.
#[derive(Default)]
pub struct InMemoryApprovalRepository {
    approvals: RwLock<Vec<ApprovalRequest>>,
}

fn newest_first(mut rows: Vec<(usize, ApprovalRequest)>) -> Vec<ApprovalRequest> {
    rows.sort_by(|(left_seq, left), (right_seq, right)| {
        right.submitted_at.cmp(&left.submitted_at).then(right_seq.cmp(left_seq))
    });
    rows.into_iter().map(|(_, row)| row).collect()
}

fn ensure_slot_free(
    approvals: &[ApprovalRequest],
    approval: &ApprovalRequest,
) -> Result<(), RepositoryError> {
    let taken = approvals.iter().any(|row| {
        row.id == approval.id
            || (row.country_code == approval.country_code
                && row.request_type == approval.request_type
                && row.request_id == approval.request_id
                && row.approval_level == approval.approval_level)
    });
    if taken {
        return Err(level_taken(approval));
    }
    Ok(())
}

#[async_trait::async_trait]
impl ApprovalRepository for InMemoryApprovalRepository {
    async fn insert(&self, approval: ApprovalRequest) -> Result<(), RepositoryError> {
        let mut approvals = self.approvals.write().await;
        ensure_slot_free(&approvals, &approval)?;
        approvals.push(approval);
        Ok(())
    }

    async fn find_by_id(
        &self,
        tenant: &CountryCode,
        id: &ApprovalId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let approvals = self.approvals.read().await;
        Ok(approvals.iter().find(|row| &row.id == id && &row.country_code == tenant).cloned())
    }

    async fn find_chain(
        &self,
        tenant: &CountryCode,
        request_type: &RequestType,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let approvals = self.approvals.read().await;
        let mut chain: Vec<ApprovalRequest> = approvals
            .iter()
            .filter(|row| {
                &row.country_code == tenant
                    && &row.request_type == request_type
                    && &row.request_id == request_id
            })
            .cloned()
            .collect();
        chain.sort_by_key(|row| row.approval_level);
        Ok(chain)
    }

    async fn find_level(
        &self,
        tenant: &CountryCode,
        request_type: &RequestType,
        request_id: &RequestId,
        approval_level: u32,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let approvals = self.approvals.read().await;
        Ok(approvals
            .iter()
            .find(|row| {
                &row.country_code == tenant
                    && &row.request_type == request_type
                    && &row.request_id == request_id
                    && row.approval_level == approval_level
            })
            .cloned())
    }

    async fn list_pending_for_approver(
        &self,
        tenant: &CountryCode,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let approvals = self.approvals.read().await;
        let rows = approvals
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                &row.country_code == tenant && &row.approver_id == approver_id && row.is_pending()
            })
            .map(|(seq, row)| (seq, row.clone()))
            .collect();
        Ok(newest_first(rows))
    }

    async fn list_for_employee(
        &self,
        tenant: &CountryCode,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let approvals = self.approvals.read().await;
        let rows = approvals
            .iter()
            .enumerate()
            .filter(|(_, row)| &row.country_code == tenant && &row.employee_id == employee_id)
            .map(|(seq, row)| (seq, row.clone()))
            .collect();
        Ok(newest_first(rows))
    }

    async fn decide_if_pending(
        &self,
        tenant: &CountryCode,
        id: &ApprovalId,
        decision: &Decision,
    ) -> Result<DecisionWrite, RepositoryError> {
        if !decision.status.is_terminal() {
            return Err(RepositoryError::Conflict(format!(
                "decision status {} is not terminal",
                decision.status.as_str()
            )));
        }

        let mut approvals = self.approvals.write().await;
        let Some(position) =
            approvals.iter().position(|row| &row.id == id && &row.country_code == tenant)
        else {
            return Ok(DecisionWrite::Missing);
        };

        if !approvals[position].is_pending() {
            return Ok(DecisionWrite::AlreadyDecided(approvals[position].status));
        }
        if let Some(next_level) = &decision.continuation {
            ensure_slot_free(&approvals, next_level)?;
        }

        let mut decided = approvals[position].clone();
        decided
            .apply_decision(decision.status, decision.comments.clone(), decision.decided_at)
            .map_err(|error| RepositoryError::Conflict(error.to_string()))?;
        approvals[position] = decided.clone();
        if let Some(next_level) = &decision.continuation {
            approvals.push(next_level.clone());
        }
        Ok(DecisionWrite::Applied(decided))
    }
}

#[derive(Default)]
pub struct InMemoryDelegationRepository {
    delegations: RwLock<HashMap<String, ApprovalDelegation>>,
}

fn most_recent_first(mut rows: Vec<ApprovalDelegation>) -> Vec<ApprovalDelegation> {
    rows.sort_by(|left, right| {
        right.created_at.cmp(&left.created_at).then_with(|| right.id.0.cmp(&left.id.0))
    });
    rows
}

#[async_trait::async_trait]
impl DelegationRepository for InMemoryDelegationRepository {
    async fn insert(&self, delegation: ApprovalDelegation) -> Result<(), RepositoryError> {
        let mut delegations = self.delegations.write().await;
        if delegations.contains_key(&delegation.id.0) {
            return Err(RepositoryError::Conflict(format!(
                "delegation `{}` already exists",
                delegation.id
            )));
        }
        delegations.insert(delegation.id.0.clone(), delegation);
        Ok(())
    }

    async fn find_by_id(
        &self,
        tenant: &CountryCode,
        id: &DelegationId,
    ) -> Result<Option<ApprovalDelegation>, RepositoryError> {
        let delegations = self.delegations.read().await;
        Ok(delegations.get(&id.0).filter(|row| &row.country_code == tenant).cloned())
    }

    async fn list_effective(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
        at: DateTime<Utc>,
    ) -> Result<Vec<ApprovalDelegation>, RepositoryError> {
        let delegations = self.delegations.read().await;
        let rows = delegations
            .values()
            .filter(|row| {
                &row.country_code == tenant
                    && &row.supervisor_id == supervisor_id
                    && row.is_effective_at(at)
            })
            .cloned()
            .collect();
        Ok(most_recent_first(rows))
    }

    async fn list_for_supervisor(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
    ) -> Result<Vec<ApprovalDelegation>, RepositoryError> {
        let delegations = self.delegations.read().await;
        let rows = delegations
            .values()
            .filter(|row| &row.country_code == tenant && &row.supervisor_id == supervisor_id)
            .cloned()
            .collect();
        Ok(most_recent_first(rows))
    }

    async fn deactivate(
        &self,
        tenant: &CountryCode,
        id: &DelegationId,
    ) -> Result<Option<ApprovalDelegation>, RepositoryError> {
        let mut delegations = self.delegations.write().await;
        let Some(row) = delegations.get_mut(&id.0).filter(|row| &row.country_code == tenant)
        else {
            return Ok(None);
        };
        row.is_active = false;
        Ok(Some(row.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryEmployeeDirectory {
    employees: RwLock<HashMap<String, EmployeeRecord>>,
}

#[async_trait::async_trait]
impl EmployeeDirectory for InMemoryEmployeeDirectory {
    async fn find_employee(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeRecord>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.get(&id.0).cloned())
    }

    async fn save_employee(&self, employee: EmployeeRecord) -> Result<(), RepositoryError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.0.clone(), employee);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRoleDirectory {
    assignments: RwLock<HashMap<(String, String), EmployeeId>>,
}

#[async_trait::async_trait]
impl RoleDirectory for InMemoryRoleDirectory {
    async fn resolve(
        &self,
        role_name: &str,
        tenant: &CountryCode,
    ) -> Result<Option<EmployeeId>, RepositoryError> {
        let assignments = self.assignments.read().await;
        Ok(assignments.get(&(role_name.to_string(), tenant.0.clone())).cloned())
    }

    async fn assign(
        &self,
        role_name: &str,
        tenant: &CountryCode,
        employee_id: &EmployeeId,
    ) -> Result<(), RepositoryError> {
        let mut assignments = self.assignments.write().await;
        assignments.insert((role_name.to_string(), tenant.0.clone()), employee_id.clone());
        Ok(())
    }
}
