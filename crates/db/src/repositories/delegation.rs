use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use hrflow_core::domain::delegation::{ApprovalDelegation, DelegationId};
use hrflow_core::domain::employee::{CountryCode, EmployeeId};

use super::{format_timestamp, parse_timestamp, DelegationRepository, RepositoryError};
use crate::DbPool;

macro_rules! delegation_columns {
    () => {
        "id, supervisor_id, delegate_id, country_code, start_date, end_date, is_active, created_at"
    };
}

pub struct SqlDelegationRepository {
    pool: DbPool,
}

impl SqlDelegationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_delegation(row: &SqliteRow) -> Result<ApprovalDelegation, RepositoryError> {
    let start_date: String = row.try_get("start_date")?;
    let end_date: String = row.try_get("end_date")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(ApprovalDelegation {
        id: DelegationId(row.try_get("id")?),
        supervisor_id: EmployeeId(row.try_get("supervisor_id")?),
        delegate_id: EmployeeId(row.try_get("delegate_id")?),
        country_code: CountryCode(row.try_get("country_code")?),
        start_date: parse_timestamp("start_date", &start_date)?,
        end_date: parse_timestamp("end_date", &end_date)?,
        is_active: row.try_get("is_active")?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl DelegationRepository for SqlDelegationRepository {
    async fn insert(&self, delegation: ApprovalDelegation) -> Result<(), RepositoryError> {
        sqlx::query(concat!(
            "INSERT INTO approval_delegation (",
            delegation_columns!(),
            ") VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&delegation.id.0)
        .bind(&delegation.supervisor_id.0)
        .bind(&delegation.delegate_id.0)
        .bind(&delegation.country_code.0)
        .bind(format_timestamp(delegation.start_date))
        .bind(format_timestamp(delegation.end_date))
        .bind(delegation.is_active)
        .bind(format_timestamp(delegation.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        tenant: &CountryCode,
        id: &DelegationId,
    ) -> Result<Option<ApprovalDelegation>, RepositoryError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            delegation_columns!(),
            " FROM approval_delegation WHERE id = ? AND country_code = ?"
        ))
        .bind(&id.0)
        .bind(&tenant.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_delegation).transpose()
    }

    async fn list_effective(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
        at: DateTime<Utc>,
    ) -> Result<Vec<ApprovalDelegation>, RepositoryError> {
        let at = format_timestamp(at);
        let rows = sqlx::query(concat!(
            "SELECT ",
            delegation_columns!(),
            " FROM approval_delegation
             WHERE country_code = ? AND supervisor_id = ? AND is_active = 1
               AND start_date <= ? AND end_date >= ?
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(&tenant.0)
        .bind(&supervisor_id.0)
        .bind(&at)
        .bind(&at)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_delegation).collect()
    }

    async fn list_for_supervisor(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
    ) -> Result<Vec<ApprovalDelegation>, RepositoryError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            delegation_columns!(),
            " FROM approval_delegation
             WHERE country_code = ? AND supervisor_id = ?
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(&tenant.0)
        .bind(&supervisor_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_delegation).collect()
    }

    async fn deactivate(
        &self,
        tenant: &CountryCode,
        id: &DelegationId,
    ) -> Result<Option<ApprovalDelegation>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE approval_delegation SET is_active = 0 WHERE id = ? AND country_code = ?")
            .bind(&id.0)
            .bind(&tenant.0)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(concat!(
            "SELECT ",
            delegation_columns!(),
            " FROM approval_delegation WHERE id = ? AND country_code = ?"
        ))
        .bind(&id.0)
        .bind(&tenant.0)
        .fetch_optional(&mut *tx)
        .await?;
        let delegation = row.as_ref().map(row_to_delegation).transpose()?;

        tx.commit().await?;
        Ok(delegation)
    }
}
