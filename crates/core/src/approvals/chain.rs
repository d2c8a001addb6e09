use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalId, ApprovalRequest};
use crate::domain::employee::EmployeeId;
use crate::errors::DomainError;

/// Where a new row sits in its chain. `Default` is a lone, non-final level 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPosition {
    pub approval_level: u32,
    pub previous_approval_id: Option<ApprovalId>,
    pub is_final: bool,
    pub next_approver_id: Option<EmployeeId>,
    pub remaining_approvers: Vec<EmployeeId>,
}

impl Default for ChainPosition {
    fn default() -> Self {
        Self {
            approval_level: 1,
            previous_approval_id: None,
            is_final: false,
            next_approver_id: None,
            remaining_approvers: Vec::new(),
        }
    }
}

impl ChainPosition {
    pub fn final_level(approval_level: u32) -> Self {
        Self { approval_level, is_final: true, ..Self::default() }
    }

    /// Level-1 position for an ordered approver list plus its first approver.
    pub fn first_of(approvers: &[EmployeeId]) -> Result<(EmployeeId, Self), DomainError> {
        let (first, rest) = approvers.split_first().ok_or(DomainError::EmptyApproverChain)?;
        let (next_approver_id, remaining_approvers) = match rest.split_first() {
            Some((next, tail)) => (Some(next.clone()), tail.to_vec()),
            None => (None, Vec::new()),
        };

        Ok((
            first.clone(),
            Self {
                approval_level: 1,
                previous_approval_id: None,
                is_final: rest.is_empty(),
                next_approver_id,
                remaining_approvers,
            },
        ))
    }

    /// Level directly after `approval_level`; `u32::MAX` has no successor.
    pub fn next_level(approval_level: u32) -> Result<u32, DomainError> {
        approval_level.checked_add(1).ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "approval_level {approval_level} has no room for a following level"
            ))
        })
    }

    /// The level after `approval` when it carries a preset next approver.
    ///
    /// A row with no remaining approvers yields a final successor, which is
    /// the two-hop shape callers get from a bare `next_approver_id`.
    pub fn after(approval: &ApprovalRequest) -> Result<Option<(EmployeeId, Self)>, DomainError> {
        if approval.is_final_approval {
            return Ok(None);
        }
        let Some(next_approver) = approval.next_approver_id.clone() else {
            return Ok(None);
        };
        let (next_approver_id, remaining_approvers) =
            match approval.remaining_approvers.split_first() {
                Some((next, tail)) => (Some(next.clone()), tail.to_vec()),
                None => (None, Vec::new()),
            };

        Ok(Some((
            next_approver,
            Self {
                approval_level: Self::next_level(approval.approval_level)?,
                previous_approval_id: Some(approval.id.clone()),
                is_final: next_approver_id.is_none(),
                next_approver_id,
                remaining_approvers,
            },
        )))
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.approval_level == 0 {
            return Err(DomainError::InvariantViolation(
                "approval_level must be at least 1".to_string(),
            ));
        }
        if self.is_final && self.next_approver_id.is_some() {
            return Err(DomainError::InvariantViolation(
                "a final approval cannot name a next approver".to_string(),
            ));
        }
        if self.next_approver_id.is_none() && !self.remaining_approvers.is_empty() {
            return Err(DomainError::InvariantViolation(
                "remaining approvers require a next approver".to_string(),
            ));
        }
        Ok(())
    }
}
