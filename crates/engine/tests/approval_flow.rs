use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use hrflow_core::approvals::HrAcceptance;
use hrflow_core::domain::approval::{
    ApprovalId, ApprovalRequest, ApprovalStatus, ApprovalSubject, RequestId, RequestType,
};
use hrflow_core::domain::delegation::{ApprovalDelegation, DelegationId};
use hrflow_core::domain::employee::{roles, CountryCode, EmployeeId, EmployeeRecord};
use hrflow_core::notify::{InMemoryNotifier, Notification, Notifier, NotifyError};
use hrflow_db::repositories::{
    InMemoryApprovalRepository, InMemoryDelegationRepository, InMemoryEmployeeDirectory,
    InMemoryRoleDirectory,
};
use hrflow_db::{ApprovalRepository, Decision, DecisionWrite, DelegationRepository, RepositoryError};
use hrflow_engine::{
    ApprovalEngine, CaseResolutionPort, CreateApprovalOptions, EngineError, RequisitionPort,
    ResignationPort, SyncError, SyncOutcome, SynchronizerRegistry,
};

#[derive(Default)]
struct RecordingPorts {
    calls: Mutex<Vec<String>>,
}

impl RecordingPorts {
    fn push(&self, call: String) -> Result<(), SyncError> {
        self.calls.lock().expect("lock").push(call);
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CaseResolutionPort for RecordingPorts {
    async fn mark_resolved(
        &self,
        _tenant: &CountryCode,
        case_type: &RequestType,
        case_id: &RequestId,
        _resolved_by: &EmployeeId,
        _resolution_date: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        self.push(format!("case {case_type} {case_id}"))
    }
}

#[async_trait]
impl RequisitionPort for RecordingPorts {
    async fn mark_approved(
        &self,
        _tenant: &CountryCode,
        requisition_id: &RequestId,
        _approved_by: &EmployeeId,
        _approved_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        self.push(format!("requisition {requisition_id}"))
    }
}

#[async_trait]
impl ResignationPort for RecordingPorts {
    async fn accept_by_hr(
        &self,
        _tenant: &CountryCode,
        resignation_id: &RequestId,
        acceptance: &HrAcceptance,
    ) -> Result<(), SyncError> {
        self.push(format!(
            "resignation {resignation_id} accepted by {} after {}",
            acceptance.hr_approver_id, acceptance.supervisor_id
        ))
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError("smtp unreachable".to_string()))
    }
}

struct Harness {
    engine: Arc<ApprovalEngine>,
    notifier: InMemoryNotifier,
    ports: Arc<RecordingPorts>,
}

fn harness() -> Harness {
    let approvals = Arc::new(InMemoryApprovalRepository::default());
    let ports = Arc::new(RecordingPorts::default());
    let notifier = InMemoryNotifier::default();
    let synchronizers = SynchronizerRegistry::standard(
        approvals.clone(),
        ports.clone(),
        ports.clone(),
        ports.clone(),
    );
    let engine = ApprovalEngine::new(
        approvals,
        Arc::new(InMemoryDelegationRepository::default()),
        Arc::new(InMemoryEmployeeDirectory::default()),
        Arc::new(InMemoryRoleDirectory::default()),
    )
    .with_notifier(Arc::new(notifier.clone()))
    .with_synchronizers(synchronizers);

    Harness { engine: Arc::new(engine), notifier, ports }
}

fn ghana() -> CountryCode {
    CountryCode("GH".to_string())
}

fn subject(request_type: RequestType, request_id: &str) -> ApprovalSubject {
    ApprovalSubject::new(request_type, request_id, EmployeeId::new("E"))
}

#[tokio::test]
async fn no_delegation_assigns_the_supervisor() {
    let Harness { engine, .. } = harness();

    let approval = engine
        .create_approval_request(
            &subject(RequestType::Leave, "LV-1"),
            &EmployeeId::new("S"),
            CreateApprovalOptions::in_tenant(ghana()),
        )
        .await
        .expect("create");

    assert_eq!(approval.approver_id, EmployeeId::new("S"));
    assert_eq!(approval.status, ApprovalStatus::Pending);
    assert_eq!(approval.approval_level, 1);
}

#[tokio::test]
async fn active_delegation_assigns_the_delegate() {
    let Harness { engine, .. } = harness();
    let now = Utc::now();
    engine
        .delegations()
        .create_delegation(
            &ghana(),
            &EmployeeId::new("S"),
            &EmployeeId::new("D"),
            now - Duration::days(1),
            now + Duration::days(1),
        )
        .await
        .expect("delegation");

    let approval = engine
        .create_approval_request(
            &subject(RequestType::Leave, "LV-1"),
            &EmployeeId::new("S"),
            CreateApprovalOptions::in_tenant(ghana()),
        )
        .await
        .expect("create");

    assert_eq!(approval.approver_id, EmployeeId::new("D"));
}

#[tokio::test]
async fn approving_a_two_hop_row_opens_the_next_level() {
    let Harness { engine, notifier, .. } = harness();
    let position = hrflow_core::approvals::ChainPosition {
        next_approver_id: Some(EmployeeId::new("N")),
        ..Default::default()
    };
    let first = engine
        .create_approval_request(
            &subject(RequestType::Payroll, "PAY-1"),
            &EmployeeId::new("S"),
            CreateApprovalOptions::in_tenant(ghana()).with_position(position),
        )
        .await
        .expect("create");

    let outcome = engine
        .approve_request(&ghana(), &first.id, &EmployeeId::new("S"), None, false)
        .await
        .expect("approve");

    assert_eq!(outcome.approval.status, ApprovalStatus::Approved);
    assert!(outcome.approval.reviewed_at.is_some());
    assert!(outcome.synchronization.is_none());

    let next = outcome.next_level.expect("level two opened");
    assert_eq!(next.approver_id, EmployeeId::new("N"));
    assert_eq!(next.status, ApprovalStatus::Pending);
    assert_eq!(next.approval_level, 2);
    assert_eq!(next.previous_approval_id, Some(first.id.clone()));
    assert!(next.is_final_approval);
    assert_eq!(notifier.sent_to(&EmployeeId::new("N")).len(), 1);
}

#[tokio::test]
async fn rejection_records_comments_and_stops_the_chain() {
    let Harness { engine, notifier, .. } = harness();
    let head = engine
        .create_sequential_approval_chain(
            &subject(RequestType::Leave, "LV-1"),
            &[EmployeeId::new("S"), EmployeeId::new("HR")],
            Some(ghana()),
        )
        .await
        .expect("chain");

    let rejected = engine
        .reject_request(
            &ghana(),
            &head.id,
            &EmployeeId::new("S"),
            Some("insufficient notice".to_string()),
            false,
        )
        .await
        .expect("reject");

    assert_eq!(rejected.status, ApprovalStatus::Rejected);
    assert!(rejected.reviewed_at.is_some());
    assert_eq!(rejected.comments.as_deref(), Some("insufficient notice"));

    let chain =
        engine.get_chain(&ghana(), &RequestType::Leave, &head.request_id).await.expect("chain");
    assert_eq!(chain.len(), 1);

    let to_employee = notifier.sent_to(&EmployeeId::new("E"));
    assert!(matches!(
        to_employee.as_slice(),
        [Notification::ApprovalDecided { status: ApprovalStatus::Rejected, .. }]
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_let_exactly_one_through() {
    let Harness { engine, .. } = harness();
    let approval = engine
        .create_approval_request(
            &subject(RequestType::Travel, "TR-1"),
            &EmployeeId::new("S"),
            CreateApprovalOptions::in_tenant(ghana()),
        )
        .await
        .expect("create");

    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = Arc::clone(&engine);
        let id = approval.id.clone();
        handles.push(tokio::spawn(async move {
            engine.approve_request(&ghana(), &id, &EmployeeId::new("S"), None, false).await
        }));
    }

    let mut successes = 0;
    let mut already_reviewed = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => successes += 1,
            Err(EngineError::BadRequest(message)) if message.contains("already reviewed") => {
                already_reviewed += 1
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((successes, already_reviewed), (1, 1));
}

#[tokio::test]
async fn resignation_needs_supervisor_and_distinct_hr_approval() {
    let Harness { engine, ports, .. } = harness();
    engine
        .upsert_employee(EmployeeRecord {
            id: EmployeeId::new("E"),
            country_code: Some(ghana()),
            manager_id: Some(EmployeeId::new("S")),
        })
        .await
        .expect("employee");
    engine
        .assign_role(roles::HR_MANAGER, &ghana(), &EmployeeId::new("HR"))
        .await
        .expect("role");

    let approvers = engine
        .supervisor_then_role(&EmployeeId::new("E"), roles::HR_MANAGER, None)
        .await
        .expect("approvers");
    let head = engine
        .create_sequential_approval_chain(
            &subject(RequestType::Resignation, "RES-1"),
            &approvers,
            None,
        )
        .await
        .expect("chain");
    assert_eq!(head.country_code, ghana());

    let supervisor_step = engine
        .approve_request(&ghana(), &head.id, &EmployeeId::new("S"), None, false)
        .await
        .expect("supervisor approves");
    assert!(supervisor_step.synchronization.is_none());
    assert!(ports.calls().is_empty(), "supervisor approval alone must not accept");

    let hr_row = supervisor_step.next_level.expect("hr level");
    let hr_step = engine
        .approve_request(&ghana(), &hr_row.id, &EmployeeId::new("HR"), None, false)
        .await
        .expect("hr approves");

    assert_eq!(hr_step.synchronization, Some(SyncOutcome::Applied));
    assert_eq!(ports.calls(), vec!["resignation RES-1 accepted by HR after S".to_string()]);
}

#[tokio::test]
async fn three_approver_chain_is_walked_one_level_at_a_time() {
    let Harness { engine, notifier, .. } = harness();
    let approvers = [EmployeeId::new("A"), EmployeeId::new("B"), EmployeeId::new("C")];
    let head = engine
        .create_sequential_approval_chain(&subject(RequestType::Workforce, "WF-1"), &approvers, Some(ghana()))
        .await
        .expect("chain");
    let request_id = head.request_id.clone();

    let rows = engine.get_chain(&ghana(), &RequestType::Workforce, &request_id).await.expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].approver_id, EmployeeId::new("A"));
    assert!(!rows[0].is_final_approval);

    let level_two = engine
        .approve_request(&ghana(), &head.id, &EmployeeId::new("A"), None, false)
        .await
        .expect("A approves")
        .next_level
        .expect("level two");
    assert_eq!(level_two.approver_id, EmployeeId::new("B"));
    assert!(!level_two.is_final_approval);

    let level_three = engine
        .approve_request(&ghana(), &level_two.id, &EmployeeId::new("B"), None, false)
        .await
        .expect("B approves")
        .next_level
        .expect("level three");
    assert_eq!(level_three.approver_id, EmployeeId::new("C"));
    assert!(level_three.is_final_approval);
    assert_eq!(level_three.previous_approval_id, Some(level_two.id.clone()));

    let last = engine
        .approve_request(&ghana(), &level_three.id, &EmployeeId::new("C"), None, false)
        .await
        .expect("C approves");
    assert!(last.next_level.is_none());
    assert_eq!(last.synchronization, Some(SyncOutcome::Applied));

    let rows = engine.get_chain(&ghana(), &RequestType::Workforce, &request_id).await.expect("rows");
    let levels: Vec<u32> = rows.iter().map(|row| row.approval_level).collect();
    assert_eq!(levels, vec![1, 2, 3]);
    assert!(rows.iter().all(|row| row.status == ApprovalStatus::Approved));

    let to_employee = notifier.sent_to(&EmployeeId::new("E"));
    assert!(matches!(
        to_employee.as_slice(),
        [Notification::ApprovalDecided { status: ApprovalStatus::Approved, .. }]
    ));
}

#[tokio::test]
async fn only_the_assigned_approver_or_hr_override_may_decide() {
    let Harness { engine, .. } = harness();
    let first = engine
        .create_approval_request(
            &subject(RequestType::Timesheet, "TS-1"),
            &EmployeeId::new("S"),
            CreateApprovalOptions::in_tenant(ghana()),
        )
        .await
        .expect("create");

    let stranger = engine
        .approve_request(&ghana(), &first.id, &EmployeeId::new("X"), None, false)
        .await;
    assert!(matches!(stranger, Err(EngineError::Unauthorized(_))));
    let stranger_reject = engine
        .reject_request(&ghana(), &first.id, &EmployeeId::new("X"), None, false)
        .await;
    assert!(matches!(stranger_reject, Err(EngineError::Unauthorized(_))));

    let overridden = engine
        .reject_request(&ghana(), &first.id, &EmployeeId::new("HR-ADMIN"), None, true)
        .await
        .expect("hr override");
    assert_eq!(overridden.status, ApprovalStatus::Rejected);
}

#[tokio::test]
async fn terminal_rows_accept_no_further_transition() {
    let Harness { engine, .. } = harness();
    let first = engine
        .create_approval_request(
            &subject(RequestType::Performance, "PR-1"),
            &EmployeeId::new("S"),
            CreateApprovalOptions::in_tenant(ghana()),
        )
        .await
        .expect("create");
    engine
        .approve_request(&ghana(), &first.id, &EmployeeId::new("S"), None, false)
        .await
        .expect("approve");

    let again = engine.reject_request(&ghana(), &first.id, &EmployeeId::new("S"), None, true).await;
    assert!(matches!(again, Err(EngineError::BadRequest(_))));
    let cancel = engine.cancel_request(&ghana(), &first.id, &EmployeeId::new("E")).await;
    assert!(matches!(cancel, Err(EngineError::BadRequest(_))));

    let row = engine.get_by_id(&ghana(), &first.id).await.expect("row");
    assert_eq!(row.status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn only_the_requester_may_cancel_a_pending_row() {
    let Harness { engine, notifier, .. } = harness();
    let first = engine
        .create_approval_request(
            &subject(RequestType::Leave, "LV-1"),
            &EmployeeId::new("S"),
            CreateApprovalOptions::in_tenant(ghana()),
        )
        .await
        .expect("create");

    let by_supervisor = engine.cancel_request(&ghana(), &first.id, &EmployeeId::new("S")).await;
    assert!(matches!(by_supervisor, Err(EngineError::Unauthorized(_))));

    let cancelled =
        engine.cancel_request(&ghana(), &first.id, &EmployeeId::new("E")).await.expect("cancel");
    assert_eq!(cancelled.status, ApprovalStatus::Cancelled);
    assert!(cancelled.reviewed_at.is_some());

    let to_supervisor = notifier.sent_to(&EmployeeId::new("S"));
    assert!(to_supervisor.iter().any(|sent| matches!(sent, Notification::ApprovalCancelled { .. })));
}

#[tokio::test]
async fn rows_are_invisible_across_tenants() {
    let Harness { engine, .. } = harness();
    let first = engine
        .create_approval_request(
            &subject(RequestType::Grievance, "GRV-1"),
            &EmployeeId::new("S"),
            CreateApprovalOptions::in_tenant(ghana()),
        )
        .await
        .expect("create");
    let kenya = CountryCode("KE".to_string());

    assert!(matches!(
        engine.get_by_id(&kenya, &first.id).await,
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        engine.approve_request(&kenya, &first.id, &EmployeeId::new("S"), None, false).await,
        Err(EngineError::NotFound { .. })
    ));
    assert!(engine
        .get_pending_for_approver(&kenya, &EmployeeId::new("S"))
        .await
        .expect("pending")
        .is_empty());
    assert_eq!(
        engine.get_requests_for_employee(&ghana(), &EmployeeId::new("E")).await.expect("mine").len(),
        1
    );
}

#[tokio::test]
async fn notifier_failures_never_fail_the_operation() {
    let engine = ApprovalEngine::new(
        Arc::new(InMemoryApprovalRepository::default()),
        Arc::new(InMemoryDelegationRepository::default()),
        Arc::new(InMemoryEmployeeDirectory::default()),
        Arc::new(InMemoryRoleDirectory::default()),
    )
    .with_notifier(Arc::new(FailingNotifier));

    let first = engine
        .create_approval_request(
            &subject(RequestType::Safeguarding, "SG-1"),
            &EmployeeId::new("S"),
            CreateApprovalOptions::in_tenant(ghana()).with_position(
                hrflow_core::approvals::ChainPosition::final_level(1),
            ),
        )
        .await
        .expect("create despite notifier failure");

    let outcome = engine
        .approve_request(&ghana(), &first.id, &EmployeeId::new("S"), None, false)
        .await
        .expect("approve despite notifier failure");
    assert_eq!(outcome.approval.status, ApprovalStatus::Approved);
    assert_eq!(outcome.synchronization, Some(SyncOutcome::NotRegistered));
}

#[tokio::test]
async fn case_types_are_resolved_on_final_approval() {
    let Harness { engine, ports, .. } = harness();
    let first = engine
        .create_sequential_approval_chain(
            &subject(RequestType::Safeguarding, "SG-7"),
            &[EmployeeId::new("S")],
            Some(ghana()),
        )
        .await
        .expect("chain");

    let outcome = engine
        .approve_request(&ghana(), &first.id, &EmployeeId::new("S"), None, false)
        .await
        .expect("approve");
    assert_eq!(outcome.synchronization, Some(SyncOutcome::Applied));
    assert_eq!(ports.calls(), vec!["case SAFEGUARDING SG-7".to_string()]);
}

#[tokio::test]
async fn preopened_next_level_is_reused_not_duplicated() {
    let Harness { engine, notifier, .. } = harness();
    let subject = subject(RequestType::Payroll, "PAY-9");
    let head = engine
        .create_approval_request(&subject, &EmployeeId::new("S"), CreateApprovalOptions::in_tenant(ghana()))
        .await
        .expect("level one");
    let preopened = engine
        .create_approval_request(
            &subject,
            &EmployeeId::new("FIN"),
            CreateApprovalOptions::in_tenant(ghana()).with_position(
                hrflow_core::approvals::ChainPosition {
                    approval_level: 2,
                    previous_approval_id: Some(head.id.clone()),
                    is_final: true,
                    ..Default::default()
                },
            ),
        )
        .await
        .expect("level two");

    let outcome = engine
        .approve_request(&ghana(), &head.id, &EmployeeId::new("S"), None, false)
        .await
        .expect("approve");
    assert!(outcome.next_level.is_none());

    let chain = engine.get_chain(&ghana(), &RequestType::Payroll, &subject.request_id).await.expect("chain");
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1].id, preopened.id);
    assert_eq!(notifier.sent_to(&EmployeeId::new("FIN")).len(), 2);
}

/// In-memory store that can fail the next chained decision or hide existing levels.
#[derive(Default)]
struct ScriptedApprovals {
    inner: InMemoryApprovalRepository,
    fail_next_continuation: AtomicBool,
    hide_levels: AtomicBool,
}

#[async_trait]
impl ApprovalRepository for ScriptedApprovals {
    async fn insert(&self, approval: ApprovalRequest) -> Result<(), RepositoryError> {
        self.inner.insert(approval).await
    }

    async fn find_by_id(
        &self,
        tenant: &CountryCode,
        id: &ApprovalId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        self.inner.find_by_id(tenant, id).await
    }

    async fn find_chain(
        &self,
        tenant: &CountryCode,
        request_type: &RequestType,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        self.inner.find_chain(tenant, request_type, request_id).await
    }

    async fn find_level(
        &self,
        tenant: &CountryCode,
        request_type: &RequestType,
        request_id: &RequestId,
        approval_level: u32,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        if self.hide_levels.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find_level(tenant, request_type, request_id, approval_level).await
    }

    async fn list_pending_for_approver(
        &self,
        tenant: &CountryCode,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        self.inner.list_pending_for_approver(tenant, approver_id).await
    }

    async fn list_for_employee(
        &self,
        tenant: &CountryCode,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        self.inner.list_for_employee(tenant, employee_id).await
    }

    async fn decide_if_pending(
        &self,
        tenant: &CountryCode,
        id: &ApprovalId,
        decision: &Decision,
    ) -> Result<DecisionWrite, RepositoryError> {
        let chained = decision.continuation.is_some();
        if chained && self.fail_next_continuation.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Decode("disk I/O error".to_string()));
        }
        self.inner.decide_if_pending(tenant, id, decision).await
    }
}

/// Delegation store whose lookups fail for one supervisor.
struct UnreachableDelegations {
    inner: InMemoryDelegationRepository,
    broken_supervisor: EmployeeId,
}

#[async_trait]
impl DelegationRepository for UnreachableDelegations {
    async fn insert(&self, delegation: ApprovalDelegation) -> Result<(), RepositoryError> {
        self.inner.insert(delegation).await
    }

    async fn find_by_id(
        &self,
        tenant: &CountryCode,
        id: &DelegationId,
    ) -> Result<Option<ApprovalDelegation>, RepositoryError> {
        self.inner.find_by_id(tenant, id).await
    }

    async fn list_effective(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
        at: DateTime<Utc>,
    ) -> Result<Vec<ApprovalDelegation>, RepositoryError> {
        if *supervisor_id == self.broken_supervisor {
            return Err(RepositoryError::Decode("delegation table unreadable".to_string()));
        }
        self.inner.list_effective(tenant, supervisor_id, at).await
    }

    async fn list_for_supervisor(
        &self,
        tenant: &CountryCode,
        supervisor_id: &EmployeeId,
    ) -> Result<Vec<ApprovalDelegation>, RepositoryError> {
        self.inner.list_for_supervisor(tenant, supervisor_id).await
    }

    async fn deactivate(
        &self,
        tenant: &CountryCode,
        id: &DelegationId,
    ) -> Result<Option<ApprovalDelegation>, RepositoryError> {
        self.inner.deactivate(tenant, id).await
    }
}

fn engine_over(
    approvals: Arc<dyn ApprovalRepository>,
    delegations: Arc<dyn DelegationRepository>,
    notifier: &InMemoryNotifier,
) -> ApprovalEngine {
    ApprovalEngine::new(
        approvals,
        delegations,
        Arc::new(InMemoryEmployeeDirectory::default()),
        Arc::new(InMemoryRoleDirectory::default()),
    )
    .with_notifier(Arc::new(notifier.clone()))
}

async fn two_hop_head(
    engine: &ApprovalEngine,
    tenant: CountryCode,
    request_id: &str,
) -> ApprovalRequest {
    let position = hrflow_core::approvals::ChainPosition {
        next_approver_id: Some(EmployeeId::new("N")),
        ..Default::default()
    };
    engine
        .create_approval_request(
            &subject(RequestType::Payroll, request_id),
            &EmployeeId::new("S"),
            CreateApprovalOptions::in_tenant(tenant).with_position(position),
        )
        .await
        .expect("level one")
}

#[tokio::test]
async fn failed_next_level_write_keeps_the_row_pending_for_a_retry() {
    let approvals = Arc::new(ScriptedApprovals::default());
    let notifier = InMemoryNotifier::default();
    let engine = engine_over(
        approvals.clone(),
        Arc::new(InMemoryDelegationRepository::default()),
        &notifier,
    );
    let head = two_hop_head(&engine, ghana(), "PAY-40").await;
    let request_id = RequestId("PAY-40".to_string());

    approvals.fail_next_continuation.store(true, Ordering::SeqCst);
    let failed = engine
        .approve_request(&ghana(), &head.id, &EmployeeId::new("S"), None, false)
        .await
        .expect_err("write fails");
    assert_eq!(failed.class(), "persistence");

    let chain = engine.get_chain(&ghana(), &RequestType::Payroll, &request_id).await.expect("chain");
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].status, ApprovalStatus::Pending);
    assert!(chain[0].reviewed_at.is_none());
    assert!(notifier.sent_to(&EmployeeId::new("N")).is_empty());

    let retried = engine
        .approve_request(&ghana(), &head.id, &EmployeeId::new("S"), None, false)
        .await
        .expect("retry");
    let next = retried.next_level.expect("level two");
    assert_eq!(next.approval_level, 2);
    assert_eq!(next.previous_approval_id, Some(head.id.clone()));

    let chain = engine.get_chain(&ghana(), &RequestType::Payroll, &request_id).await.expect("chain");
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].status, ApprovalStatus::Approved);
    assert_eq!(notifier.sent_to(&EmployeeId::new("N")).len(), 1);
}

#[tokio::test]
async fn delegation_lookup_failure_for_the_next_approver_leaves_the_row_pending() {
    let notifier = InMemoryNotifier::default();
    let delegations = Arc::new(UnreachableDelegations {
        inner: InMemoryDelegationRepository::default(),
        broken_supervisor: EmployeeId::new("N"),
    });
    let engine =
        engine_over(Arc::new(InMemoryApprovalRepository::default()), delegations, &notifier);
    let head = two_hop_head(&engine, ghana(), "PAY-41").await;

    let failed = engine
        .approve_request(&ghana(), &head.id, &EmployeeId::new("S"), None, false)
        .await
        .expect_err("lookup fails");
    assert!(matches!(failed, EngineError::Repository(_)));

    let row = engine.get_by_id(&ghana(), &head.id).await.expect("row");
    assert_eq!(row.status, ApprovalStatus::Pending);
    assert_eq!(
        engine
            .get_chain(&ghana(), &RequestType::Payroll, &RequestId("PAY-41".to_string()))
            .await
            .expect("chain")
            .len(),
        1
    );
}

#[tokio::test]
async fn next_level_taken_between_lookup_and_write_is_refused_without_deciding() {
    let approvals = Arc::new(ScriptedApprovals::default());
    let notifier = InMemoryNotifier::default();
    let engine = engine_over(
        approvals.clone(),
        Arc::new(InMemoryDelegationRepository::default()),
        &notifier,
    );
    let head = two_hop_head(&engine, ghana(), "PAY-42").await;
    engine
        .create_approval_request(
            &subject(RequestType::Payroll, "PAY-42"),
            &EmployeeId::new("OTHER"),
            CreateApprovalOptions::in_tenant(ghana()).with_position(
                hrflow_core::approvals::ChainPosition {
                    approval_level: 2,
                    previous_approval_id: Some(head.id.clone()),
                    is_final: true,
                    ..Default::default()
                },
            ),
        )
        .await
        .expect("racing level two");

    approvals.hide_levels.store(true, Ordering::SeqCst);
    let refused = engine
        .approve_request(&ghana(), &head.id, &EmployeeId::new("S"), None, false)
        .await
        .expect_err("slot taken");
    assert!(matches!(refused, EngineError::BadRequest(_)));
    assert_eq!(
        engine.get_by_id(&ghana(), &head.id).await.expect("row").status,
        ApprovalStatus::Pending
    );
}

#[tokio::test]
async fn chains_in_other_tenants_do_not_block_the_next_level() {
    let Harness { engine, .. } = harness();
    let kenya = CountryCode("KE".to_string());

    let kenyan = two_hop_head(&engine, kenya.clone(), "PAY-43").await;
    engine
        .approve_request(&kenya, &kenyan.id, &EmployeeId::new("S"), None, false)
        .await
        .expect("kenyan level two opened");

    let ghanaian = two_hop_head(&engine, ghana(), "PAY-43").await;
    let outcome = engine
        .approve_request(&ghana(), &ghanaian.id, &EmployeeId::new("S"), None, false)
        .await
        .expect("ghanaian level two opened");

    let next = outcome.next_level.expect("level two");
    assert_eq!(next.country_code, ghana());
    assert_eq!(next.approval_level, 2);
}

#[tokio::test]
async fn top_level_row_cannot_be_followed() {
    let Harness { engine, .. } = harness();
    let head = engine
        .create_approval_request(
            &subject(RequestType::Payroll, "PAY-44"),
            &EmployeeId::new("S"),
            CreateApprovalOptions::in_tenant(ghana()).with_position(
                hrflow_core::approvals::ChainPosition {
                    approval_level: u32::MAX,
                    next_approver_id: Some(EmployeeId::new("N")),
                    ..Default::default()
                },
            ),
        )
        .await
        .expect("top level");

    let refused = engine
        .approve_request(&ghana(), &head.id, &EmployeeId::new("S"), None, false)
        .await
        .expect_err("no room");
    assert!(matches!(refused, EngineError::BadRequest(_)));
    assert_eq!(
        engine.get_by_id(&ghana(), &head.id).await.expect("row").status,
        ApprovalStatus::Pending
    );
}
