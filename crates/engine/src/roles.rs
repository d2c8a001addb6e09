use tracing::info;

use hrflow_core::domain::employee::{CountryCode, EmployeeId, EmployeeRecord};

use crate::engine::ApprovalEngine;
use crate::error::EngineError;

impl ApprovalEngine {
    /// `[manager, role holder]` for the employee, ready for
    /// `create_sequential_approval_chain`.
    pub async fn supervisor_then_role(
        &self,
        employee_id: &EmployeeId,
        role_name: &str,
        country_code: Option<&CountryCode>,
    ) -> Result<Vec<EmployeeId>, EngineError> {
        let record = self
            .employees
            .find_employee(employee_id)
            .await?
            .ok_or_else(|| EngineError::not_found("employee", employee_id))?;

        let tenant = match country_code {
            Some(country_code) => country_code.clone(),
            None => record.country_code.clone().unwrap_or_else(|| self.fallback_country_code.clone()),
        };
        let manager = record
            .manager_id
            .ok_or_else(|| EngineError::BadRequest(format!("`{employee_id}` has no manager")))?;
        let role_holder = self.roles.resolve(role_name, &tenant).await?.ok_or_else(|| {
            EngineError::BadRequest(format!("role `{role_name}` is not assigned in {tenant}"))
        })?;

        Ok(vec![manager, role_holder])
    }

    pub async fn upsert_employee(&self, record: EmployeeRecord) -> Result<(), EngineError> {
        if record.manager_id.as_ref() == Some(&record.id) {
            return Err(EngineError::BadRequest(format!(
                "`{}` cannot be their own manager",
                record.id
            )));
        }
        self.employees.save_employee(record.clone()).await?;

        info!(
            event_name = "directory.employee.saved",
            employee_id = %record.id,
            country_code = record.country_code.as_ref().map(CountryCode::as_str),
            manager_id = record.manager_id.as_ref().map(EmployeeId::as_str),
            "employee saved"
        );
        Ok(())
    }

    pub async fn assign_role(
        &self,
        role_name: &str,
        tenant: &CountryCode,
        employee_id: &EmployeeId,
    ) -> Result<(), EngineError> {
        let role_name = role_name.trim();
        if role_name.is_empty() {
            return Err(EngineError::BadRequest("role name must not be empty".to_string()));
        }
        self.roles.assign(role_name, tenant, employee_id).await?;

        info!(
            event_name = "directory.role.assigned",
            role_name,
            country_code = %tenant,
            employee_id = %employee_id,
            "role assigned"
        );
        Ok(())
    }
}
