use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use hrflow_core::domain::approval::{
    ApprovalId, ApprovalRequest, ApprovalStatus, RequestId, RequestType,
};
use hrflow_core::domain::delegation::{ApprovalDelegation, DelegationId};
use hrflow_core::domain::employee::{CountryCode, EmployeeId, EmployeeRecord};
use hrflow_core::errors::ApplicationError;

pub mod approval;
pub mod delegation;
pub mod directory;
pub mod memory;

pub use approval::SqlApprovalRepository;
pub use delegation::SqlDelegationRepository;
pub use directory::{SqlEmployeeDirectory, SqlRoleDirectory};
pub use memory::{
    InMemoryApprovalRepository, InMemoryDelegationRepository, InMemoryEmployeeDirectory,
    InMemoryRoleDirectory,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

/// A terminal decision to apply to a row that must still be PENDING.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub status: ApprovalStatus,
    pub comments: Option<String>,
    pub decided_at: DateTime<Utc>,
    /// Next-level row inserted atomically with the decision; a conflict undoes both.
    pub continuation: Option<ApprovalRequest>,
}

impl Decision {
    pub fn new(status: ApprovalStatus, comments: Option<String>) -> Self {
        Self { status, comments, decided_at: Utc::now(), continuation: None }
    }

    pub fn with_continuation(mut self, next_level: ApprovalRequest) -> Self {
        self.continuation = Some(next_level);
        self
    }

    /// `reviewed_at` is only stamped when the target status is terminal.
    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.status.is_terminal().then_some(self.decided_at)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionWrite {
    Applied(ApprovalRequest),
    AlreadyDecided(ApprovalStatus),
    Missing,
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    /// Fails with `Conflict` when the id or the tenant's
    /// `(request_type, request_id, approval_level)` slot is taken.
    async fn insert(&self, approval: ApprovalRequest) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        tenant: &CountryCode,
        id: &ApprovalId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError>;

    /// Whole chain, ordered by approval level.
    async fn find_chain(
        &self,
        tenant: &CountryCode,
        request_type: &RequestType,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError>;

    async fn find_level(
        &self,
        tenant: &CountryCode,
        request_type: &RequestType,
        request_id: &RequestId,
        approval_level: u32,
    ) -> Result<Option<ApprovalRequest>, RepositoryError>;

    /// PENDING rows for the approver, newest submission first.
    async fn list_pending_for_approver(
        &self,
        tenant: &CountryCode,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError>;

    async fn list_for_employee(
        &self,
        tenant: &CountryCode,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError>;

    /// Check-and-set on `status = PENDING`; concurrent callers see exactly one `Applied`.
    /// A `continuation` row is written in the same unit of work, and a `Conflict` on it
    /// leaves the target row untouched.
    async fn decide_if_pending(
        &self,
        tenant: &CountryCode,
        id: &ApprovalId,
        decision: &Decision,
    ) -> Result<DecisionWrite, RepositoryError>;
}

#[async_trait]
pub trait DelegationRepository: Send + Sync {
    async fn insert(&self, delegation: ApprovalDelegation) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        tenant: &CountryCode,
        id: &DelegationId,
    ) -> Result<Option<ApprovalDelegation>, RepositoryError>;

    /// Active rows for the supervisor whose window contains `at`.
    async fn list_effective(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
        at: DateTime<Utc>,
    ) -> Result<Vec<ApprovalDelegation>, RepositoryError>;

    async fn list_for_supervisor(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
    ) -> Result<Vec<ApprovalDelegation>, RepositoryError>;

    async fn deactivate(
        &self,
        tenant: &CountryCode,
        id: &DelegationId,
    ) -> Result<Option<ApprovalDelegation>, RepositoryError>;
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_employee(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeRecord>, RepositoryError>;

    async fn save_employee(&self, employee: EmployeeRecord) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn resolve(
        &self,
        role_name: &str,
        tenant: &CountryCode,
    ) -> Result<Option<EmployeeId>, RepositoryError>;

    async fn assign(
        &self,
        role_name: &str,
        tenant: &CountryCode,
        employee_id: &EmployeeId,
    ) -> Result<(), RepositoryError>;
}

pub(crate) fn level_taken(approval: &ApprovalRequest) -> RepositoryError {
    RepositoryError::Conflict(format!(
        "{} `{}` already has an approval at level {} in {}",
        approval.request_type, approval.request_id, approval.approval_level, approval.country_code
    ))
}

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}
