//! Approval workflow engine: chain construction, decisions, delegation and
//! post-approval synchronization, on top of the `hrflow-db` repositories.

pub mod builder;
pub mod decision;
pub mod delegation;
pub mod engine;
pub mod error;
pub mod roles;
pub mod sync;

pub use builder::CreateApprovalOptions;
pub use decision::DecisionOutcome;
pub use delegation::DelegationResolver;
pub use engine::ApprovalEngine;
pub use error::EngineError;
pub use sync::{
    CaseResolutionPort, CaseResolutionSynchronizer, EntitySynchronizer, LeaveSynchronizer,
    RequisitionPort, RequisitionSynchronizer, ResignationPort, ResignationSynchronizer,
    SyncContext, SyncEffect, SyncError, SyncOutcome, SynchronizerRegistry, TracingEntityPorts,
};
