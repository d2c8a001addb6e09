use std::sync::Arc;

use tracing::warn;

use hrflow_core::approvals::ApproverStats;
use hrflow_core::config::AppConfig;
use hrflow_core::domain::approval::{ApprovalId, ApprovalRequest, RequestId, RequestType};
use hrflow_core::domain::employee::{CountryCode, EmployeeId};
use hrflow_core::notify::{NoopNotifier, Notification, Notifier, TracingNotifier};
use hrflow_db::repositories::{
    SqlApprovalRepository, SqlDelegationRepository, SqlEmployeeDirectory, SqlRoleDirectory,
};
use hrflow_db::{ApprovalRepository, DbPool, DelegationRepository, EmployeeDirectory, RoleDirectory};

use crate::delegation::DelegationResolver;
use crate::error::EngineError;
use crate::sync::{SynchronizerRegistry, TracingEntityPorts};

const DEFAULT_FALLBACK_COUNTRY_CODE: &str = "US";

/// Entry point for every approval operation. Chain building lives in
/// `builder`, decisions in `decision`, and role lookups in `roles`.
pub struct ApprovalEngine {
    pub(crate) approvals: Arc<dyn ApprovalRepository>,
    pub(crate) delegations: DelegationResolver,
    pub(crate) employees: Arc<dyn EmployeeDirectory>,
    pub(crate) roles: Arc<dyn RoleDirectory>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) synchronizers: SynchronizerRegistry,
    pub(crate) fallback_country_code: CountryCode,
}

impl ApprovalEngine {
    pub fn new(
        approvals: Arc<dyn ApprovalRepository>,
        delegations: Arc<dyn DelegationRepository>,
        employees: Arc<dyn EmployeeDirectory>,
        roles: Arc<dyn RoleDirectory>,
    ) -> Self {
        Self {
            approvals,
            delegations: DelegationResolver::new(delegations),
            employees,
            roles,
            notifier: Arc::new(NoopNotifier),
            synchronizers: SynchronizerRegistry::new(),
            fallback_country_code: CountryCode(DEFAULT_FALLBACK_COUNTRY_CODE.to_string()),
        }
    }

    /// SQLite-backed engine with logging entity ports, as the CLI runs it.
    pub fn from_pool(pool: DbPool, config: &AppConfig) -> Result<Self, EngineError> {
        let approvals: Arc<dyn ApprovalRepository> =
            Arc::new(SqlApprovalRepository::new(pool.clone()));
        let ports = Arc::new(TracingEntityPorts);
        let synchronizers = SynchronizerRegistry::standard(
            approvals.clone(),
            ports.clone(),
            ports.clone(),
            ports,
        );
        let notifier: Arc<dyn Notifier> = if config.notifications.enabled {
            Arc::new(TracingNotifier)
        } else {
            Arc::new(NoopNotifier)
        };
        let fallback_country_code = config
            .fallback_country_code()
            .map_err(|error| EngineError::Configuration(error.to_string()))?;

        Ok(Self::new(
            approvals,
            Arc::new(SqlDelegationRepository::new(pool.clone())),
            Arc::new(SqlEmployeeDirectory::new(pool.clone())),
            Arc::new(SqlRoleDirectory::new(pool)),
        )
        .with_notifier(notifier)
        .with_synchronizers(synchronizers)
        .with_fallback_country_code(fallback_country_code))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_synchronizers(mut self, synchronizers: SynchronizerRegistry) -> Self {
        self.synchronizers = synchronizers;
        self
    }

    pub fn with_fallback_country_code(mut self, country_code: CountryCode) -> Self {
        self.fallback_country_code = country_code;
        self
    }

    pub fn delegations(&self) -> &DelegationResolver {
        &self.delegations
    }

    /// Tenant of an employee per the directory, or the fallback when unknown.
    pub async fn resolve_country_code(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<CountryCode, EngineError> {
        let record = self.employees.find_employee(employee_id).await?;
        Ok(record
            .and_then(|record| record.country_code)
            .unwrap_or_else(|| self.fallback_country_code.clone()))
    }

    pub async fn get_by_id(
        &self,
        tenant: &CountryCode,
        approval_id: &ApprovalId,
    ) -> Result<ApprovalRequest, EngineError> {
        self.approvals
            .find_by_id(tenant, approval_id)
            .await?
            .ok_or_else(|| EngineError::not_found("approval", approval_id))
    }

    /// A specific level of a request's chain, or the chain head when `level` is absent.
    pub async fn get_by_request(
        &self,
        tenant: &CountryCode,
        request_type: &RequestType,
        request_id: &RequestId,
        level: Option<u32>,
    ) -> Result<Option<ApprovalRequest>, EngineError> {
        match level {
            Some(level) => {
                Ok(self.approvals.find_level(tenant, request_type, request_id, level).await?)
            }
            None => Ok(self
                .approvals
                .find_chain(tenant, request_type, request_id)
                .await?
                .into_iter()
                .next()),
        }
    }

    pub async fn get_chain(
        &self,
        tenant: &CountryCode,
        request_type: &RequestType,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRequest>, EngineError> {
        Ok(self.approvals.find_chain(tenant, request_type, request_id).await?)
    }

    pub async fn get_pending_for_approver(
        &self,
        tenant: &CountryCode,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRequest>, EngineError> {
        Ok(self.approvals.list_pending_for_approver(tenant, approver_id).await?)
    }

    pub async fn get_requests_for_employee(
        &self,
        tenant: &CountryCode,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRequest>, EngineError> {
        Ok(self.approvals.list_for_employee(tenant, employee_id).await?)
    }

    pub async fn get_stats_for_approver(
        &self,
        tenant: &CountryCode,
        approver_id: &EmployeeId,
    ) -> Result<ApproverStats, EngineError> {
        let pending = self.approvals.list_pending_for_approver(tenant, approver_id).await?;
        Ok(ApproverStats::from_rows(approver_id, &pending))
    }

    /// Best effort: failures are logged and swallowed.
    pub(crate) async fn notify(&self, notification: Notification) {
        if let Err(error) = self.notifier.notify(&notification).await {
            warn!(
                event_name = "approval.notification.failed",
                kind = notification.kind(),
                approval_id = %notification.approval_id(),
                recipient = %notification.recipient(),
                error = %error,
                "notification delivery failed"
            );
        }
    }
}
