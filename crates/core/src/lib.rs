pub mod approvals;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;

pub use approvals::{
    check_cancellation, check_decision, resignation_hr_acceptance, select_effective_delegation,
    ApproverStats, ChainPosition, DecisionRefusal, HrAcceptance,
};
pub use domain::approval::{
    ApprovalId, ApprovalRequest, ApprovalStatus, ApprovalSubject, RequestId, RequestType,
};
pub use domain::delegation::{ApprovalDelegation, DelegationId, DelegationWindow};
pub use domain::employee::{CountryCode, EmployeeId, EmployeeRecord};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notify::{
    InMemoryNotifier, NoopNotifier, Notification, Notifier, NotifyError, TracingNotifier,
};

pub use chrono;
