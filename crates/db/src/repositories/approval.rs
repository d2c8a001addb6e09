use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use hrflow_core::domain::approval::{
    ApprovalId, ApprovalRequest, ApprovalStatus, RequestId, RequestType,
};
use hrflow_core::domain::employee::{CountryCode, EmployeeId};

use super::{
    format_timestamp, level_taken, parse_timestamp, ApprovalRepository, Decision, DecisionWrite,
    RepositoryError,
};
use crate::DbPool;

macro_rules! approval_columns {
    () => {
        "id, request_type, request_id, employee_id, approver_id, status, submitted_at,
         reviewed_at, comments, approval_level, is_final_approval, previous_approval_id,
         next_approver_id, remaining_approvers_json, country_code"
    };
}

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(value: &str) -> Result<ApprovalStatus, RepositoryError> {
    value.parse().map_err(|error| RepositoryError::Decode(format!("status: {error}")))
}

fn parse_request_type(value: &str) -> Result<RequestType, RepositoryError> {
    value.parse().map_err(|error| RepositoryError::Decode(format!("request_type: {error}")))
}

fn row_to_approval(row: &SqliteRow) -> Result<ApprovalRequest, RepositoryError> {
    let status: String = row.try_get("status")?;
    let request_type: String = row.try_get("request_type")?;
    let submitted_at: String = row.try_get("submitted_at")?;
    let reviewed_at: Option<String> = row.try_get("reviewed_at")?;
    let approval_level: i64 = row.try_get("approval_level")?;
    let previous_approval_id: Option<String> = row.try_get("previous_approval_id")?;
    let next_approver_id: Option<String> = row.try_get("next_approver_id")?;
    let remaining_json: String = row.try_get("remaining_approvers_json")?;

    let remaining_approvers: Vec<EmployeeId> = serde_json::from_str(&remaining_json)
        .map_err(|error| RepositoryError::Decode(format!("remaining_approvers_json: {error}")))?;
    let approval_level = u32::try_from(approval_level)
        .map_err(|_| RepositoryError::Decode(format!("approval_level: {approval_level}")))?;

    Ok(ApprovalRequest {
        id: ApprovalId(row.try_get("id")?),
        request_type: parse_request_type(&request_type)?,
        request_id: RequestId(row.try_get("request_id")?),
        employee_id: EmployeeId(row.try_get("employee_id")?),
        approver_id: EmployeeId(row.try_get("approver_id")?),
        status: parse_status(&status)?,
        submitted_at: parse_timestamp("submitted_at", &submitted_at)?,
        reviewed_at: reviewed_at
            .map(|value| parse_timestamp("reviewed_at", &value))
            .transpose()?,
        comments: row.try_get("comments")?,
        approval_level,
        is_final_approval: row.try_get("is_final_approval")?,
        previous_approval_id: previous_approval_id.map(ApprovalId),
        next_approver_id: next_approver_id.map(EmployeeId),
        remaining_approvers,
        country_code: CountryCode(row.try_get("country_code")?),
    })
}

async fn insert_row(
    conn: &mut SqliteConnection,
    approval: &ApprovalRequest,
) -> Result<(), RepositoryError> {
    let remaining_json = serde_json::to_string(&approval.remaining_approvers)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    sqlx::query(concat!(
        "INSERT INTO approval_request (",
        approval_columns!(),
        ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&approval.id.0)
    .bind(approval.request_type.as_str())
    .bind(&approval.request_id.0)
    .bind(&approval.employee_id.0)
    .bind(&approval.approver_id.0)
    .bind(approval.status.as_str())
    .bind(format_timestamp(approval.submitted_at))
    .bind(approval.reviewed_at.map(format_timestamp))
    .bind(&approval.comments)
    .bind(i64::from(approval.approval_level))
    .bind(approval.is_final_approval)
    .bind(approval.previous_approval_id.as_ref().map(|id| id.0.as_str()))
    .bind(approval.next_approver_id.as_ref().map(|id| id.0.as_str()))
    .bind(remaining_json)
    .bind(&approval.country_code.0)
    .execute(conn)
    .await
    .map_err(|error| match error {
        sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => {
            level_taken(approval)
        }
        other => RepositoryError::Database(other),
    })?;

    Ok(())
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn insert(&self, approval: ApprovalRequest) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_row(&mut conn, &approval).await
    }

    async fn find_by_id(
        &self,
        tenant: &CountryCode,
        id: &ApprovalId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            approval_columns!(),
            " FROM approval_request WHERE id = ? AND country_code = ?"
        ))
        .bind(&id.0)
        .bind(&tenant.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_approval).transpose()
    }

    async fn find_chain(
        &self,
        tenant: &CountryCode,
        request_type: &RequestType,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            approval_columns!(),
            " FROM approval_request
             WHERE country_code = ? AND request_type = ? AND request_id = ?
             ORDER BY approval_level ASC"
        ))
        .bind(&tenant.0)
        .bind(request_type.as_str())
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approval).collect()
    }

    async fn find_level(
        &self,
        tenant: &CountryCode,
        request_type: &RequestType,
        request_id: &RequestId,
        approval_level: u32,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            approval_columns!(),
            " FROM approval_request
             WHERE country_code = ? AND request_type = ? AND request_id = ? AND approval_level = ?"
        ))
        .bind(&tenant.0)
        .bind(request_type.as_str())
        .bind(&request_id.0)
        .bind(i64::from(approval_level))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_approval).transpose()
    }

    async fn list_pending_for_approver(
        &self,
        tenant: &CountryCode,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            approval_columns!(),
            " FROM approval_request
             WHERE country_code = ? AND approver_id = ? AND status = 'PENDING'
             ORDER BY submitted_at DESC, rowid DESC"
        ))
        .bind(&tenant.0)
        .bind(&approver_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approval).collect()
    }

    async fn list_for_employee(
        &self,
        tenant: &CountryCode,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            approval_columns!(),
            " FROM approval_request
             WHERE country_code = ? AND employee_id = ?
             ORDER BY submitted_at DESC, rowid DESC"
        ))
        .bind(&tenant.0)
        .bind(&employee_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approval).collect()
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

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE approval_request
             SET status = ?, reviewed_at = ?, comments = COALESCE(?, comments)
             WHERE id = ? AND country_code = ? AND status = 'PENDING'",
        )
        .bind(decision.status.as_str())
        .bind(decision.reviewed_at().map(format_timestamp))
        .bind(&decision.comments)
        .bind(&id.0)
        .bind(&tenant.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current: Option<String> = sqlx::query_scalar(
                "SELECT status FROM approval_request WHERE id = ? AND country_code = ?",
            )
            .bind(&id.0)
            .bind(&tenant.0)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;

            return match current {
                Some(status) => Ok(DecisionWrite::AlreadyDecided(parse_status(&status)?)),
                None => Ok(DecisionWrite::Missing),
            };
        }

        let row = sqlx::query(concat!(
            "SELECT ",
            approval_columns!(),
            " FROM approval_request WHERE id = ? AND country_code = ?"
        ))
        .bind(&id.0)
        .bind(&tenant.0)
        .fetch_one(&mut *tx)
        .await?;
        let approval = row_to_approval(&row)?;

        if let Some(next_level) = &decision.continuation {
            if let Err(error) = insert_row(&mut tx, next_level).await {
                tx.rollback().await?;
                return Err(error);
            }
        }

        tx.commit().await?;
        Ok(DecisionWrite::Applied(approval))
    }
}
