use chrono::Utc;
use tracing::info;

use hrflow_core::approvals::ChainPosition;
use hrflow_core::domain::approval::{ApprovalId, ApprovalRequest, ApprovalStatus, ApprovalSubject};
use hrflow_core::domain::employee::{CountryCode, EmployeeId};
use hrflow_db::RepositoryError;

use crate::decision::requested;
use crate::engine::ApprovalEngine;
use crate::error::EngineError;

#[derive(Clone, Debug, Default)]
pub struct CreateApprovalOptions {
    /// Resolved from the subject employee when absent.
    pub country_code: Option<CountryCode>,
    pub position: ChainPosition,
    pub comments: Option<String>,
}

impl CreateApprovalOptions {
    pub fn in_tenant(country_code: CountryCode) -> Self {
        Self { country_code: Some(country_code), ..Self::default() }
    }

    pub fn with_position(mut self, position: ChainPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_comments(mut self, comments: Option<String>) -> Self {
        self.comments = comments;
        self
    }
}

impl ApprovalEngine {
    /// Persists one chain row for `supervisor_id`, or for their active delegate.
    pub async fn create_approval_request(
        &self,
        subject: &ApprovalSubject,
        supervisor_id: &EmployeeId,
        options: CreateApprovalOptions,
    ) -> Result<ApprovalRequest, EngineError> {
        let approval = self.prepare_approval_request(subject, supervisor_id, options).await?;

        self.approvals.insert(approval.clone()).await.map_err(conflict_as_bad_request)?;
        self.announce_created(&approval, supervisor_id).await;

        Ok(approval)
    }

    /// Builds the PENDING row without writing it. Delegation is resolved here.
    pub(crate) async fn prepare_approval_request(
        &self,
        subject: &ApprovalSubject,
        supervisor_id: &EmployeeId,
        options: CreateApprovalOptions,
    ) -> Result<ApprovalRequest, EngineError> {
        options.position.validate()?;
        if subject.request_id.0.trim().is_empty() {
            return Err(EngineError::BadRequest("request_id must not be empty".to_string()));
        }

        let tenant = match options.country_code {
            Some(country_code) => country_code,
            None => self.resolve_country_code(&subject.employee_id).await?,
        };
        let now = Utc::now();
        let approver_id = self.delegations.effective_approver(&tenant, supervisor_id, now).await?;
        let position = options.position;

        Ok(ApprovalRequest {
            id: ApprovalId::generate(),
            request_type: subject.request_type.clone(),
            request_id: subject.request_id.clone(),
            employee_id: subject.employee_id.clone(),
            approver_id,
            status: ApprovalStatus::Pending,
            submitted_at: now,
            reviewed_at: None,
            comments: options.comments,
            approval_level: position.approval_level,
            is_final_approval: position.is_final,
            previous_approval_id: position.previous_approval_id,
            next_approver_id: position.next_approver_id,
            remaining_approvers: position.remaining_approvers,
            country_code: tenant,
        })
    }

    pub(crate) async fn announce_created(&self, approval: &ApprovalRequest, supervisor_id: &EmployeeId) {
        info!(
            event_name = "approval.request.created",
            approval_id = %approval.id,
            request_type = %approval.request_type,
            request_id = %approval.request_id,
            approver_id = %approval.approver_id,
            delegated = approval.approver_id != *supervisor_id,
            approval_level = approval.approval_level,
            is_final = approval.is_final_approval,
            country_code = %approval.country_code,
            "approval request created"
        );

        self.notify(requested(approval)).await;
    }

    /// Creates only the level-1 row; later levels are opened as each one is approved.
    pub async fn create_sequential_approval_chain(
        &self,
        subject: &ApprovalSubject,
        approvers: &[EmployeeId],
        country_code: Option<CountryCode>,
    ) -> Result<ApprovalRequest, EngineError> {
        let (first_approver, position) = ChainPosition::first_of(approvers)?;
        let options = CreateApprovalOptions { country_code, position, comments: None };
        self.create_approval_request(subject, &first_approver, options).await
    }
}

pub(crate) fn conflict_as_bad_request(error: RepositoryError) -> EngineError {
    match error {
        RepositoryError::Conflict(message) => EngineError::BadRequest(message),
        other => EngineError::Repository(other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use hrflow_core::approvals::ChainPosition;
    use hrflow_core::domain::approval::{ApprovalId, ApprovalSubject, RequestType};
    use hrflow_core::domain::employee::{CountryCode, EmployeeId};
    use hrflow_core::notify::{InMemoryNotifier, Notification};
    use hrflow_db::repositories::{
        InMemoryApprovalRepository, InMemoryDelegationRepository, InMemoryEmployeeDirectory,
        InMemoryRoleDirectory,
    };

    use super::CreateApprovalOptions;
    use crate::engine::ApprovalEngine;
    use crate::error::EngineError;

    fn engine(notifier: InMemoryNotifier) -> ApprovalEngine {
        ApprovalEngine::new(
            Arc::new(InMemoryApprovalRepository::default()),
            Arc::new(InMemoryDelegationRepository::default()),
            Arc::new(InMemoryEmployeeDirectory::default()),
            Arc::new(InMemoryRoleDirectory::default()),
        )
        .with_notifier(Arc::new(notifier))
    }

    fn ghana() -> CountryCode {
        CountryCode("GH".to_string())
    }

    fn leave(request_id: &str) -> ApprovalSubject {
        ApprovalSubject::new(RequestType::Leave, request_id, EmployeeId::new("E-1"))
    }

    #[tokio::test]
    async fn created_row_is_pending_and_notifies_the_approver() {
        let notifier = InMemoryNotifier::default();
        let engine = engine(notifier.clone());

        let approval = engine
            .create_approval_request(
                &leave("LV-1"),
                &EmployeeId::new("S-1"),
                CreateApprovalOptions::in_tenant(ghana())
                    .with_comments(Some("family event".to_string())),
            )
            .await
            .expect("create");

        assert!(approval.is_pending());
        assert_eq!(approval.approval_level, 1);
        assert!(approval.reviewed_at.is_none());
        assert_eq!(approval.comments.as_deref(), Some("family event"));

        let sent = notifier.sent_to(&EmployeeId::new("S-1"));
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Notification::ApprovalRequested { approval_level: 1, .. }));
    }

    #[tokio::test]
    async fn active_delegate_receives_the_row() {
        let notifier = InMemoryNotifier::default();
        let engine = engine(notifier.clone());
        let now = Utc::now();
        engine
            .delegations()
            .create_delegation(
                &ghana(),
                &EmployeeId::new("S-1"),
                &EmployeeId::new("D-1"),
                now - Duration::days(1),
                now + Duration::days(1),
            )
            .await
            .expect("delegate");

        let approval = engine
            .create_approval_request(
                &leave("LV-1"),
                &EmployeeId::new("S-1"),
                CreateApprovalOptions::in_tenant(ghana()),
            )
            .await
            .expect("create");

        assert_eq!(approval.approver_id, EmployeeId::new("D-1"));
        assert!(notifier.sent_to(&EmployeeId::new("S-1")).is_empty());
        assert_eq!(notifier.sent_to(&EmployeeId::new("D-1")).len(), 1);
    }

    #[tokio::test]
    async fn level_zero_and_duplicate_levels_are_bad_requests() {
        let engine = engine(InMemoryNotifier::default());
        let supervisor = EmployeeId::new("S-1");

        let level_zero = engine
            .create_approval_request(
                &leave("LV-1"),
                &supervisor,
                CreateApprovalOptions::in_tenant(ghana()).with_position(ChainPosition {
                    approval_level: 0,
                    ..ChainPosition::default()
                }),
            )
            .await;
        assert!(matches!(level_zero, Err(EngineError::BadRequest(_))));

        engine
            .create_approval_request(&leave("LV-1"), &supervisor, CreateApprovalOptions::in_tenant(ghana()))
            .await
            .expect("first");
        let duplicate = engine
            .create_approval_request(&leave("LV-1"), &supervisor, CreateApprovalOptions::in_tenant(ghana()))
            .await;
        assert!(matches!(duplicate, Err(EngineError::BadRequest(_))));
    }

    #[tokio::test]
    async fn sequential_chain_creates_only_the_first_level() {
        let engine = engine(InMemoryNotifier::default());
        let approvers =
            [EmployeeId::new("A"), EmployeeId::new("B"), EmployeeId::new("C")];

        let head = engine
            .create_sequential_approval_chain(&leave("LV-9"), &approvers, Some(ghana()))
            .await
            .expect("chain");

        assert_eq!(head.approver_id, EmployeeId::new("A"));
        assert!(!head.is_final_approval);
        assert_eq!(head.next_approver_id, Some(EmployeeId::new("B")));
        assert_eq!(head.remaining_approvers, vec![EmployeeId::new("C")]);

        let chain = engine
            .get_chain(&ghana(), &RequestType::Leave, &head.request_id)
            .await
            .expect("chain rows");
        assert_eq!(chain.len(), 1);
    }

    #[tokio::test]
    async fn single_approver_chain_is_final_and_empty_chain_is_rejected() {
        let engine = engine(InMemoryNotifier::default());

        let only = engine
            .create_sequential_approval_chain(&leave("LV-1"), &[EmployeeId::new("A")], Some(ghana()))
            .await
            .expect("chain");
        assert!(only.is_final_approval);
        assert_eq!(only.next_approver_id, None);

        let empty = engine.create_sequential_approval_chain(&leave("LV-2"), &[], Some(ghana())).await;
        assert!(matches!(empty, Err(EngineError::BadRequest(_))));
    }

    #[tokio::test]
    async fn final_position_with_next_approver_is_rejected() {
        let engine = engine(InMemoryNotifier::default());
        let position = ChainPosition {
            is_final: true,
            next_approver_id: Some(EmployeeId::new("B")),
            previous_approval_id: Some(ApprovalId("X".to_string())),
            ..ChainPosition::default()
        };

        let result = engine
            .create_approval_request(
                &leave("LV-1"),
                &EmployeeId::new("A"),
                CreateApprovalOptions::in_tenant(ghana()).with_position(position),
            )
            .await;
        assert!(matches!(result, Err(EngineError::BadRequest(_))));
    }
}
