use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::{CountryCode, EmployeeId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegationId(pub String);

impl DelegationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for DelegationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive `[start, end]` window; construction guarantees `start < end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DelegationWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if start >= end {
            return Err(DomainError::InvalidDelegationWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDelegation {
    pub id: DelegationId,
    pub supervisor_id: EmployeeId,
    pub delegate_id: EmployeeId,
    pub country_code: CountryCode,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ApprovalDelegation {
    pub fn new(
        supervisor_id: EmployeeId,
        delegate_id: EmployeeId,
        country_code: CountryCode,
        window: DelegationWindow,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DelegationId::generate(),
            supervisor_id,
            delegate_id,
            country_code,
            start_date: window.start(),
            end_date: window.end(),
            is_active: true,
            created_at,
        }
    }

    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= at && at <= self.end_date
    }
}
