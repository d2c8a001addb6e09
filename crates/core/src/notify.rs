use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::approval::{ApprovalId, ApprovalStatus, RequestId, RequestType};
use crate::domain::employee::{CountryCode, EmployeeId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ApprovalRequested {
        approval_id: ApprovalId,
        request_type: RequestType,
        request_id: RequestId,
        employee_id: EmployeeId,
        approver_id: EmployeeId,
        approval_level: u32,
        country_code: CountryCode,
    },
    ApprovalDecided {
        approval_id: ApprovalId,
        request_type: RequestType,
        request_id: RequestId,
        employee_id: EmployeeId,
        decided_by: EmployeeId,
        status: ApprovalStatus,
        comments: Option<String>,
    },
    ApprovalCancelled {
        approval_id: ApprovalId,
        request_type: RequestType,
        request_id: RequestId,
        employee_id: EmployeeId,
        approver_id: EmployeeId,
    },
}

impl Notification {
    pub fn recipient(&self) -> &EmployeeId {
        match self {
            Self::ApprovalRequested { approver_id, .. } => approver_id,
            Self::ApprovalDecided { employee_id, .. } => employee_id,
            Self::ApprovalCancelled { approver_id, .. } => approver_id,
        }
    }

    pub fn approval_id(&self) -> &ApprovalId {
        match self {
            Self::ApprovalRequested { approval_id, .. }
            | Self::ApprovalDecided { approval_id, .. }
            | Self::ApprovalCancelled { approval_id, .. } => approval_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApprovalRequested { .. } => "approval_requested",
            Self::ApprovalDecided { .. } => "approval_decided",
            Self::ApprovalCancelled { .. } => "approval_cancelled",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery port. Callers treat every error as best-effort and never retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Emits each notification as a structured log line; stands in for email delivery.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            event_name = "approval.notification.sent",
            kind = notification.kind(),
            approval_id = %notification.approval_id(),
            recipient = %notification.recipient(),
            "approval notification dispatched"
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_to(&self, recipient: &EmployeeId) -> Vec<Notification> {
        self.sent().into_iter().filter(|sent| sent.recipient() == recipient).collect()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification.clone()),
            Err(poisoned) => poisoned.into_inner().push(notification.clone()),
        }
        Ok(())
    }
}
