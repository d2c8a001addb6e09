use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant partition key. Every approval and delegation row belongs to exactly one.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CountryCode(pub String);

impl CountryCode {
    /// Normalizes to upper case and accepts 2 or 3 ASCII letters.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let normalized = value.trim().to_ascii_uppercase();
        let valid = (2..=3).contains(&normalized.len())
            && normalized.chars().all(|ch| ch.is_ascii_uppercase());
        if !valid {
            return Err(DomainError::InvariantViolation(format!(
                "country code `{value}` must be 2-3 ASCII letters"
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: EmployeeId,
    pub country_code: Option<CountryCode>,
    pub manager_id: Option<EmployeeId>,
}

pub mod roles {
    pub const HR_MANAGER: &str = "hr_manager";
    pub const CEO: &str = "ceo";
}
