//! # Approval Engine Scenarios
//!
//! End-to-end behavior of [`ApprovalEngine`] over an in-memory document
//! gateway: the reference routing scenarios, the terminal-state and audit
//! properties, quorum, optimistic concurrency, and the journal transaction
//! boundary.

use std::collections::BTreeSet;
use std::sync::Arc;

use signoff_core::{Actor, DocumentRef, DocumentTypeId, RoleCode, SignoffError, UserId, WorkflowId};
use signoff_definition::{NewStage, NewWorkflow, StagePatch, WorkflowStage};
use signoff_engine::{
    ActionRequest, ApprovalEngine, DocumentSnapshot, MemoryDocumentGateway, MemoryJournal,
};
use signoff_state::{ActionKind, ApprovalStatus};

const INVOICE_TYPE: &str = "purchase_invoice";

// ─── Fixture ─────────────────────────────────────────────────────────

struct Fixture {
    engine: ApprovalEngine,
    gateway: MemoryDocumentGateway,
    workflow: WorkflowId,
    stages: Vec<WorkflowStage>,
}

impl Fixture {
    /// "3-step": Manager, Director, Accountant (final).
    fn three_step() -> Self {
        Self::with_stages(vec![
            NewStage::approver("Manager", role("manager")),
            NewStage::approver("Director", role("director")),
            NewStage::approver("Accountant", role("accountant")).final_stage(),
        ])
    }

    fn with_stages(stages: Vec<NewStage>) -> Self {
        Self::build(stages, Arc::new(MemoryJournal::new()))
    }

    fn build(stages: Vec<NewStage>, journal: Arc<MemoryJournal>) -> Self {
        let gateway = MemoryDocumentGateway::new();
        let engine = ApprovalEngine::new(Arc::new(gateway.clone())).with_journal(journal);
        let workflow = engine
            .create_workflow(NewWorkflow {
                name: "3-step".into(),
                description: "invoice sign-off".into(),
                applicability: BTreeSet::from([doc_type(INVOICE_TYPE)]),
                created_by: Some(user("admin")),
            })
            .unwrap();
        let stages = stages
            .into_iter()
            .map(|s| engine.add_stage(workflow.id, s).unwrap())
            .collect();
        engine.toggle_active(workflow.id).unwrap();
        Self {
            engine,
            gateway,
            workflow: workflow.id,
            stages,
        }
    }

    fn invoice(&self, id: &str) -> DocumentRef {
        self.document(DocumentRef::invoice(id).unwrap(), INVOICE_TYPE)
    }

    fn document(&self, reference: DocumentRef, document_type: &str) -> DocumentRef {
        self.gateway.upsert(DocumentSnapshot {
            reference: reference.clone(),
            document_type: doc_type(document_type),
            created_by: user("clerk"),
            externally_finalized: false,
        });
        reference
    }

    fn submit(&self, doc: &DocumentRef) {
        self.engine
            .submit(doc, &clerk(), ActionRequest::default())
            .unwrap();
    }

    fn approve_as(&self, doc: &DocumentRef, actor: &Actor) -> Result<ApprovalStatus, SignoffError> {
        self.engine
            .approve(doc, actor, ActionRequest::default())
            .map(|outcome| outcome.status)
    }

    fn position(&self, doc: &DocumentRef) -> Option<u32> {
        self.engine
            .status(doc)
            .unwrap()
            .current_stage
            .map(|s| s.position)
    }
}

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn role(code: &str) -> RoleCode {
    RoleCode::new(code).unwrap()
}

fn doc_type(id: &str) -> DocumentTypeId {
    DocumentTypeId::new(id).unwrap()
}

fn clerk() -> Actor {
    Actor::new(user("clerk"))
}

fn holder(user_id: &str, role_code: &str) -> Actor {
    Actor::new(user(user_id)).with_role(role(role_code))
}

fn manager() -> Actor {
    holder("maria", "manager")
}

fn director() -> Actor {
    holder("dmitri", "director")
}

fn accountant() -> Actor {
    holder("ana", "accountant")
}

// ─── Reference scenarios ─────────────────────────────────────────────

#[test]
fn three_step_workflow_routes_to_approval() {
    let fx = Fixture::three_step();
    let doc = fx.invoice("INV-001");

    fx.submit(&doc);
    assert_eq!(fx.engine.status(&doc).unwrap().status, ApprovalStatus::Pending);
    assert_eq!(fx.position(&doc), Some(1));

    assert_eq!(fx.approve_as(&doc, &manager()).unwrap(), ApprovalStatus::Pending);
    assert_eq!(fx.position(&doc), Some(2));

    assert_eq!(fx.approve_as(&doc, &director()).unwrap(), ApprovalStatus::Pending);
    assert_eq!(fx.position(&doc), Some(3));

    assert_eq!(fx.approve_as(&doc, &accountant()).unwrap(), ApprovalStatus::Approved);
    let status = fx.engine.status(&doc).unwrap();
    assert_eq!(status.status, ApprovalStatus::Approved);
    assert!(status.current_stage.is_none());
    assert!(status.instance_id.is_none());

    let instances = fx.engine.instances(&doc).unwrap();
    assert_eq!(instances.len(), 1);
    assert!(instances[0].completed_at.is_some());
}

#[test]
fn rejection_is_terminal() {
    let fx = Fixture::three_step();
    let doc = fx.invoice("INV-002");
    fx.submit(&doc);
    fx.approve_as(&doc, &manager()).unwrap();

    let outcome = fx
        .engine
        .reject(&doc, &director(), ActionRequest::with_comment("budget exceeded"))
        .unwrap();
    assert_eq!(outcome.status, ApprovalStatus::Rejected);
    assert!(outcome.current_stage.is_none());

    for actor in [manager(), director(), accountant()] {
        assert!(matches!(
            fx.approve_as(&doc, &actor),
            Err(SignoffError::InvalidStateTransition(_))
        ));
    }

    let history = fx.engine.get_history(&doc).unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.action, ActionKind::Reject);
    assert_eq!(last.comment.as_deref(), Some("budget exceeded"));
}

#[test]
fn clone_copies_stages_under_new_ids() {
    let fx = Fixture::three_step();
    let source = fx.engine.get_workflow(fx.workflow).unwrap();

    let copy = fx
        .engine
        .clone_workflow(fx.workflow, "Copy", &holder("admin", "admin"))
        .unwrap();
    assert_eq!(copy.name, "Copy");
    assert!(!copy.is_active);
    assert_ne!(copy.id, source.id);
    assert_eq!(copy.cloned_from, Some(source.id));
    assert_eq!(copy.stages.len(), source.stages.len());
    for (cloned, original) in copy.stages.iter().zip(&source.stages) {
        assert_ne!(cloned.id, original.id);
        assert_eq!(cloned.position, original.position);
        assert_eq!(cloned.name, original.name);
        assert_eq!(cloned.workflow_id, copy.id);
    }

    assert_eq!(fx.engine.get_workflow(fx.workflow).unwrap(), source);
}

#[test]
fn reorder_reassigns_positions() {
    let fx = Fixture::three_step();
    let [id1, id2, id3] = [fx.stages[0].id, fx.stages[1].id, fx.stages[2].id];

    let reordered = fx.engine.reorder_stages(fx.workflow, &[id3, id1, id2]).unwrap();
    let position_of = |id| reordered.iter().find(|s| s.id == id).unwrap().position;
    assert_eq!(position_of(id3), 1);
    assert_eq!(position_of(id1), 2);
    assert_eq!(position_of(id2), 3);

    assert!(matches!(
        fx.engine.reorder_stages(fx.workflow, &[id1, id2]),
        Err(SignoffError::Validation(_))
    ));
}

// ─── Properties ──────────────────────────────────────────────────────

#[test]
fn submit_without_applicable_workflow_creates_nothing() {
    let fx = Fixture::three_step();
    let doc = fx.document(DocumentRef::payment("PAY-001").unwrap(), "vendor_payment");

    let err = fx
        .engine
        .submit(&doc, &clerk(), ActionRequest::default())
        .unwrap_err();
    assert!(matches!(err, SignoffError::NotFound(_)));
    assert!(fx.engine.instances(&doc).unwrap().is_empty());
    assert!(fx.engine.get_history(&doc).unwrap().is_empty());
    assert_eq!(fx.engine.status(&doc).unwrap().status, ApprovalStatus::Draft);
}

#[test]
fn second_approval_of_advanced_stage_fails() {
    let fx = Fixture::three_step();
    let doc = fx.invoice("INV-003");
    fx.submit(&doc);
    let first = fx.stages[0].id;

    fx.engine
        .approve(&doc, &manager(), ActionRequest::default().at_stage(first))
        .unwrap();
    let err = fx
        .engine
        .approve(&doc, &holder("mike", "manager"), ActionRequest::default().at_stage(first))
        .unwrap_err();
    assert!(matches!(err, SignoffError::InvalidStateTransition(_)));
    assert_eq!(fx.position(&doc), Some(2));
}

#[test]
fn final_stage_completes_regardless_of_position() {
    let fx = Fixture::with_stages(vec![
        NewStage::approver("Manager", role("manager")),
        NewStage::approver("Director", role("director")).final_stage(),
        NewStage::approver("Accountant", role("accountant")),
    ]);
    let doc = fx.invoice("INV-004");
    fx.submit(&doc);
    fx.approve_as(&doc, &manager()).unwrap();

    assert_eq!(fx.approve_as(&doc, &director()).unwrap(), ApprovalStatus::Approved);
    assert!(fx.position(&doc).is_none());
}

#[test]
fn cancel_allowed_only_before_terminal() {
    let fx = Fixture::three_step();

    let draft = fx.invoice("INV-010");
    let outcome = fx.engine.cancel(&draft, &clerk(), ActionRequest::default()).unwrap();
    assert_eq!(outcome.status, ApprovalStatus::Cancelled);
    // Never submitted, so nothing is logged.
    assert!(fx.engine.get_history(&draft).unwrap().is_empty());

    let pending = fx.invoice("INV-011");
    fx.submit(&pending);
    let outcome = fx
        .engine
        .cancel(&pending, &clerk(), ActionRequest::with_comment("duplicate"))
        .unwrap();
    assert_eq!(outcome.status, ApprovalStatus::Cancelled);
    assert_eq!(fx.engine.get_history(&pending).unwrap().len(), 2);

    let approved = fx.invoice("INV-012");
    fx.submit(&approved);
    for actor in [manager(), director(), accountant()] {
        fx.approve_as(&approved, &actor).unwrap();
    }
    let rejected = fx.invoice("INV-013");
    fx.submit(&rejected);
    fx.engine
        .reject(&rejected, &manager(), ActionRequest::with_comment("wrong vendor"))
        .unwrap();

    for doc in [&draft, &pending, &approved, &rejected] {
        assert!(matches!(
            fx.engine.cancel(doc, &clerk(), ActionRequest::default()),
            Err(SignoffError::InvalidStateTransition(_))
        ));
    }
}

#[test]
fn cancel_after_return_is_logged_without_instance() {
    let fx = Fixture::three_step();
    let doc = fx.invoice("INV-014");
    fx.submit(&doc);
    fx.engine
        .return_for_rework(&doc, &manager(), ActionRequest::with_comment("missing PO number"))
        .unwrap();
    assert_eq!(fx.engine.status(&doc).unwrap().status, ApprovalStatus::Draft);

    let outcome = fx.engine.cancel(&doc, &clerk(), ActionRequest::default()).unwrap();
    assert_eq!(outcome.status, ApprovalStatus::Cancelled);
    assert_eq!(outcome.transition.instance_id, None);
    let logged = outcome.action.expect("cancel after submission is audited");
    assert_eq!(logged.instance_id, None);
    assert_eq!(logged.from_status, ApprovalStatus::Draft);

    let kinds: Vec<ActionKind> = fx
        .engine
        .get_history(&doc)
        .unwrap()
        .iter()
        .map(|a| a.action)
        .collect();
    assert_eq!(kinds, [ActionKind::Submit, ActionKind::Return, ActionKind::Cancel]);
    fx.engine.verify_history(&doc).unwrap();
}

#[test]
fn pending_cancel_needs_stage_grant() {
    let mut locked = NewStage::approver("Treasury", role("treasury")).final_stage();
    locked.capabilities.can_cancel = false;
    let fx = Fixture::with_stages(vec![locked]);
    let doc = fx.invoice("INV-015");
    fx.submit(&doc);

    let available = fx.engine.get_available_actions(&doc, &clerk()).unwrap();
    assert!(!available.actions.contains(&ActionKind::Cancel));
    assert!(matches!(
        fx.engine.cancel(&doc, &clerk(), ActionRequest::default()),
        Err(SignoffError::PermissionDenied(_))
    ));
    assert_eq!(fx.engine.status(&doc).unwrap().status, ApprovalStatus::Pending);
    assert_eq!(fx.engine.get_history(&doc).unwrap().len(), 1);
}

#[test]
fn every_transition_appends_one_matching_action() {
    let fx = Fixture::three_step();
    let doc = fx.invoice("INV-020");

    let steps: Vec<(ActionKind, Actor, ActionRequest)> = vec![
        (ActionKind::Submit, clerk(), ActionRequest::default()),
        (ActionKind::Approve, manager(), ActionRequest::default()),
        (ActionKind::Return, director(), ActionRequest::with_comment("missing PO")),
        (ActionKind::Submit, clerk(), ActionRequest::default()),
        (ActionKind::Approve, manager(), ActionRequest::default()),
        (ActionKind::Approve, director(), ActionRequest::default()),
        (ActionKind::Approve, accountant(), ActionRequest::default()),
    ];

    let mut previous = 0;
    for (kind, actor, request) in steps {
        let outcome = fx.engine.perform(kind, &doc, &actor, request).unwrap();
        let history = fx.engine.get_history(&doc).unwrap();
        assert_eq!(history.len(), previous + 1);
        let last = history.last().unwrap();
        assert_eq!(last.action, kind);
        assert_eq!(last.actor_id, actor.user_id);
        assert_eq!(outcome.action.as_ref(), Some(last));
        previous = history.len();
    }

    fx.engine.verify_history(&doc).unwrap();
    let instances = fx.engine.instances(&doc).unwrap();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0].status, ApprovalStatus::Draft);
    assert_eq!(instances[1].status, ApprovalStatus::Approved);
}

// ─── Supplemented behavior ───────────────────────────────────────────

#[test]
fn quorum_requires_distinct_approvers() {
    let fx = Fixture::with_stages(vec![
        NewStage::approver("Board", role("board")).with_quorum(2),
        NewStage::approver("Accountant", role("accountant")).final_stage(),
    ]);
    let doc = fx.invoice("INV-030");
    fx.submit(&doc);

    let first = fx
        .engine
        .approve(&doc, &holder("b1", "board"), ActionRequest::default())
        .unwrap();
    assert_eq!(first.transition.approvals_remaining, 1);
    assert_eq!(fx.position(&doc), Some(1));
    assert_eq!(
        fx.engine.status(&doc).unwrap().approvals,
        BTreeSet::from([user("b1")])
    );

    assert!(matches!(
        fx.approve_as(&doc, &holder("b1", "board")),
        Err(SignoffError::InvalidStateTransition(_))
    ));

    fx.approve_as(&doc, &holder("b2", "board")).unwrap();
    assert_eq!(fx.position(&doc), Some(2));
    assert!(fx.engine.status(&doc).unwrap().approvals.is_empty());
    assert_eq!(fx.engine.get_history(&doc).unwrap().len(), 3);
}

#[test]
fn concurrent_approvals_advance_once() {
    let fx = Fixture::three_step();
    let doc = fx.invoice("INV-040");
    fx.submit(&doc);
    let first = fx.stages[0].id;

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = &fx.engine;
                let doc = &doc;
                scope.spawn(move || {
                    let actor = holder(&format!("manager-{i}"), "manager");
                    engine.approve(doc, &actor, ActionRequest::default().at_stage(first))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, SignoffError::InvalidStateTransition(_))));
    assert_eq!(fx.position(&doc), Some(2));
    assert_eq!(fx.engine.get_history(&doc).unwrap().len(), 2);
}

#[test]
fn stale_version_is_a_conflict() {
    let fx = Fixture::three_step();
    let doc = fx.invoice("INV-041");
    fx.submit(&doc);
    let version = fx.engine.status(&doc).unwrap().version;
    assert_eq!(version, 1);

    let err = fx
        .engine
        .approve(&doc, &manager(), ActionRequest::default().at_version(0))
        .unwrap_err();
    assert!(matches!(err, SignoffError::Conflict(_)));

    let outcome = fx
        .engine
        .approve(&doc, &manager(), ActionRequest::default().at_version(version))
        .unwrap();
    assert_eq!(outcome.version, 2);
}

#[test]
fn journal_failure_rolls_back_state_and_audit() {
    let journal = Arc::new(MemoryJournal::new());
    let fx = Fixture::build(
        vec![NewStage::approver("Manager", role("manager")).final_stage()],
        Arc::clone(&journal),
    );
    let doc = fx.invoice("INV-050");

    journal.fail_with("storage unavailable");
    let err = fx
        .engine
        .submit(&doc, &clerk(), ActionRequest::default())
        .unwrap_err();
    assert!(matches!(err, SignoffError::Journal(_)));
    assert_eq!(fx.engine.status(&doc).unwrap().status, ApprovalStatus::Draft);
    assert!(fx.engine.get_history(&doc).unwrap().is_empty());

    journal.recover();
    fx.submit(&doc);
    assert_eq!(journal.len(), 1);
    let entry = &journal.entries()[0];
    assert_eq!(entry.version, 1);
    assert_eq!(entry.state.status, ApprovalStatus::Pending);
    assert_eq!(entry.action.as_ref().map(|a| a.action), Some(ActionKind::Submit));
}

#[test]
fn routing_follows_pinned_route() {
    let fx = Fixture::three_step();
    let doc = fx.invoice("INV-060");
    fx.submit(&doc);

    fx.engine
        .add_stage(fx.workflow, NewStage::approver("Intake", role("intake")).at_position(1))
        .unwrap();
    fx.engine
        .update_stage(
            fx.stages[1].id,
            StagePatch {
                name: Some("VP".into()),
                ..StagePatch::default()
            },
        )
        .unwrap();

    let status = fx.engine.status(&doc).unwrap();
    assert_eq!(status.current_stage.as_ref().map(|s| s.name.as_str()), Some("Manager"));
    fx.approve_as(&doc, &manager()).unwrap();
    let status = fx.engine.status(&doc).unwrap();
    assert_eq!(status.current_stage.as_ref().map(|s| s.name.as_str()), Some("Director"));
}

#[test]
fn workflow_with_routing_documents_cannot_be_deleted() {
    let fx = Fixture::three_step();
    let doc = fx.invoice("INV-070");
    fx.submit(&doc);

    assert!(matches!(
        fx.engine.delete_workflow(fx.workflow),
        Err(SignoffError::Conflict(_))
    ));
    fx.engine
        .reject(&doc, &manager(), ActionRequest::with_comment("duplicate invoice"))
        .unwrap();
    fx.engine.delete_workflow(fx.workflow).unwrap();
    assert!(fx.engine.list_workflows().is_empty());
}

#[test]
fn submit_and_delete_never_both_succeed() {
    for i in 0..200 {
        let fx = Fixture::three_step();
        let doc = fx.invoice(&format!("INV-{i:03}"));

        let (submitted, deleted) = std::thread::scope(|scope| {
            let submit = scope.spawn(|| fx.engine.submit(&doc, &clerk(), ActionRequest::default()));
            let delete = scope.spawn(|| fx.engine.delete_workflow(fx.workflow));
            (submit.join().unwrap(), delete.join().unwrap())
        });

        match (submitted, deleted) {
            (Ok(_), Err(SignoffError::Conflict(_))) => {
                assert_eq!(fx.engine.status(&doc).unwrap().status, ApprovalStatus::Pending);
                assert_eq!(fx.engine.list_workflows().len(), 1);
            }
            (Err(SignoffError::NotFound(_)), Ok(_)) => {
                assert_eq!(fx.engine.status(&doc).unwrap().status, ApprovalStatus::Draft);
                assert!(fx.engine.get_history(&doc).unwrap().is_empty());
            }
            (submitted, deleted) => panic!(
                "submit and delete raced into an inconsistent state: submit={:?} delete={:?}",
                submitted.map(|o| o.status),
                deleted.map(|w| w.id)
            ),
        }
    }
}

#[test]
fn transition_guards() {
    let fx = Fixture::three_step();
    let doc = fx.invoice("INV-080");

    // Only the creator may submit.
    assert!(matches!(
        fx.engine.submit(&doc, &manager(), ActionRequest::default()),
        Err(SignoffError::PermissionDenied(_))
    ));
    fx.submit(&doc);
    assert!(matches!(
        fx.engine.submit(&doc, &clerk(), ActionRequest::default()),
        Err(SignoffError::Conflict(_))
    ));

    // Wrong role at the current stage.
    assert!(matches!(
        fx.approve_as(&doc, &director()),
        Err(SignoffError::PermissionDenied(_))
    ));

    // Reject and return need a comment.
    assert!(matches!(
        fx.engine.reject(&doc, &manager(), ActionRequest::with_comment("   ")),
        Err(SignoffError::Validation(_))
    ));
    assert!(matches!(
        fx.engine.return_for_rework(&doc, &manager(), ActionRequest::default()),
        Err(SignoffError::Validation(_))
    ));

    // A document paid elsewhere can no longer be cancelled.
    fx.gateway.mark_finalized(&doc).unwrap();
    assert!(matches!(
        fx.engine.cancel(&doc, &clerk(), ActionRequest::default()),
        Err(SignoffError::InvalidStateTransition(_))
    ));

    assert_eq!(fx.engine.get_history(&doc).unwrap().len(), 1);
}

#[test]
fn available_actions_follow_stage_assignment() {
    let fx = Fixture::three_step();
    let doc = fx.invoice("INV-090");

    let creator = fx.engine.get_available_actions(&doc, &clerk()).unwrap();
    assert_eq!(
        creator.actions,
        BTreeSet::from([ActionKind::Submit, ActionKind::Cancel])
    );
    assert!(creator.can_edit);

    fx.submit(&doc);
    let approver = fx.engine.get_available_actions(&doc, &manager()).unwrap();
    assert_eq!(
        approver.actions,
        BTreeSet::from([ActionKind::Approve, ActionKind::Reject, ActionKind::Return])
    );
    assert!(approver.can_view);

    let bystander = fx.engine.get_available_actions(&doc, &director()).unwrap();
    assert!(bystander.actions.is_empty());
}

#[test]
fn sla_deadline_is_reported_from_timeout() {
    let mut stage = NewStage::approver("Manager", role("manager")).final_stage();
    stage.timeout_days = Some(3);
    let fx = Fixture::with_stages(vec![stage]);
    let doc = fx.invoice("INV-100");
    fx.submit(&doc);

    let status = fx.engine.status(&doc).unwrap();
    let entered = status.stage_entered_at.unwrap();
    assert_eq!(status.sla_deadline, Some(entered.plus_days(3)));
}
