use chrono::Utc;
use sqlx::Row;

use hrflow_core::domain::employee::{CountryCode, EmployeeId, EmployeeRecord};

use super::{format_timestamp, EmployeeDirectory, RepositoryError, RoleDirectory};
use crate::DbPool;

pub struct SqlEmployeeDirectory {
    pool: DbPool,
}

impl SqlEmployeeDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EmployeeDirectory for SqlEmployeeDirectory {
    async fn find_employee(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeRecord>, RepositoryError> {
        let row = sqlx::query("SELECT id, country_code, manager_id FROM employee WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let country_code: Option<String> = row.try_get("country_code")?;
        let manager_id: Option<String> = row.try_get("manager_id")?;
        Ok(Some(EmployeeRecord {
            id: EmployeeId(row.try_get("id")?),
            country_code: country_code.map(CountryCode),
            manager_id: manager_id.map(EmployeeId),
        }))
    }

    async fn save_employee(&self, employee: EmployeeRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (id, country_code, manager_id, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                country_code = excluded.country_code,
                manager_id = excluded.manager_id,
                updated_at = excluded.updated_at",
        )
        .bind(&employee.id.0)
        .bind(employee.country_code.as_ref().map(|code| code.0.as_str()))
        .bind(employee.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct SqlRoleDirectory {
    pool: DbPool,
}

impl SqlRoleDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RoleDirectory for SqlRoleDirectory {
    async fn resolve(
        &self,
        role_name: &str,
        tenant: &CountryCode,
    ) -> Result<Option<EmployeeId>, RepositoryError> {
        let employee_id: Option<String> = sqlx::query_scalar(
            "SELECT employee_id FROM role_assignment WHERE role_name = ? AND country_code = ?",
        )
        .bind(role_name)
        .bind(&tenant.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(employee_id.map(EmployeeId))
    }

    async fn assign(
        &self,
        role_name: &str,
        tenant: &CountryCode,
        employee_id: &EmployeeId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO role_assignment (role_name, country_code, employee_id, assigned_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(role_name, country_code) DO UPDATE SET
                employee_id = excluded.employee_id,
                assigned_at = excluded.assigned_at",
        )
        .bind(role_name)
        .bind(&tenant.0)
        .bind(&employee_id.0)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
