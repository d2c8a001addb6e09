use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::{CountryCode, EmployeeId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl ApprovalId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to the business entity awaiting a decision.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialized as its upper-case wire name, e.g. `"LEAVE"`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RequestType {
    Leave,
    Travel,
    Timesheet,
    Performance,
    Payroll,
    Resignation,
    Grievance,
    Safeguarding,
    Workforce,
    Other(String),
}

impl RequestType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Leave => "LEAVE",
            Self::Travel => "TRAVEL",
            Self::Timesheet => "TIMESHEET",
            Self::Performance => "PERFORMANCE",
            Self::Payroll => "PAYROLL",
            Self::Resignation => "RESIGNATION",
            Self::Grievance => "GRIEVANCE",
            Self::Safeguarding => "SAFEGUARDING",
            Self::Workforce => "WORKFORCE",
            Self::Other(name) => name,
        }
    }
}

impl std::str::FromStr for RequestType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        Ok(match normalized.as_str() {
            "" => {
                return Err(DomainError::InvariantViolation(
                    "request type must not be empty".to_string(),
                ))
            }
            "LEAVE" => Self::Leave,
            "TRAVEL" => Self::Travel,
            "TIMESHEET" => Self::Timesheet,
            "PERFORMANCE" => Self::Performance,
            "PAYROLL" => Self::Payroll,
            "RESIGNATION" => Self::Resignation,
            "GRIEVANCE" => Self::Grievance,
            "SAFEGUARDING" => Self::Safeguarding,
            "WORKFORCE" => Self::Workforce,
            _ => Self::Other(normalized),
        })
    }
}

impl From<RequestType> for String {
    fn from(value: RequestType) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for RequestType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Only PENDING may move, and only to a terminal status.
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Cancelled)
        )
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "CANCELLED" => Ok(Self::Cancelled),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown approval status `{other}`")))
            }
        }
    }
}

/// The `(request_type, request_id, employee_id)` triple a business module hands over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSubject {
    pub request_type: RequestType,
    pub request_id: RequestId,
    pub employee_id: EmployeeId,
}

impl ApprovalSubject {
    pub fn new(
        request_type: RequestType,
        request_id: impl Into<String>,
        employee_id: EmployeeId,
    ) -> Self {
        Self { request_type, request_id: RequestId(request_id.into()), employee_id }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub request_type: RequestType,
    pub request_id: RequestId,
    pub employee_id: EmployeeId,
    pub approver_id: EmployeeId,
    pub status: ApprovalStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
    pub approval_level: u32,
    pub is_final_approval: bool,
    pub previous_approval_id: Option<ApprovalId>,
    pub next_approver_id: Option<EmployeeId>,
    /// Approvers queued after `next_approver_id`; empty for a two-hop chain.
    pub remaining_approvers: Vec<EmployeeId>,
    pub country_code: CountryCode,
}

impl ApprovalRequest {
    pub fn subject(&self) -> ApprovalSubject {
        ApprovalSubject {
            request_type: self.request_type.clone(),
            request_id: self.request_id.clone(),
            employee_id: self.employee_id.clone(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Applies a decision in place. `reviewed_at` is stamped only for terminal statuses.
    pub fn apply_decision(
        &mut self,
        next: ApprovalStatus,
        comments: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidApprovalTransition { from: self.status, to: next });
        }

        self.status = next;
        if next.is_terminal() {
            self.reviewed_at = Some(at);
        }
        if comments.is_some() {
            self.comments = comments;
        }
        Ok(())
    }
}
