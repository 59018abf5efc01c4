//! Scenario and property tests for ApprovalStateMachine over the in-memory store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use chrono::Utc;
use proptest::prelude::*;
use ringi_shared::EngineConfig;
use tokio::task::JoinHandle;

use crate::workflow::catalog::{NodeInput, WorkflowCatalog};
use crate::workflow::error::WorkflowError;
use crate::workflow::graph::NodeGraph;
use crate::workflow::machine::{
    ApprovalAction, ApprovalStateMachine, BusinessChange, BusinessData, StartRequest,
};
use crate::workflow::memory::{
    InMemoryStore, RecordingBusinessData, StaticDirectory, StaticGroupHierarchy,
};
use crate::workflow::service::{ApprovalPlan, Outcome};
use crate::workflow::store::WorkflowStore;
use crate::workflow::types::{
    AUTO_APPROVED_COMMENT, AUTO_REJECTED_COMMENT, ActType, CreateWorkflowInput, InstanceStatus,
    PARAM_ACTION, PARAM_DATASTORE, RelationBinding, RelationFilter, SYSTEM_USER, StepStatus,
    WorkflowDefinition, WorkflowType,
};

const TENANT: &str = "tenant_a";

struct Harness {
    store: Arc<InMemoryStore>,
    business: Arc<RecordingBusinessData>,
    catalog: WorkflowCatalog,
    machine: ApprovalStateMachine,
}

fn harness(directory: StaticDirectory) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let business = Arc::new(RecordingBusinessData::new());
    let groups = StaticGroupHierarchy::new()
        .with_parent("team", "dept")
        .with_parent("dept", "root");
    let machine = ApprovalStateMachine::new(
        store.clone(),
        Arc::new(groups),
        Arc::new(directory),
        business.clone(),
        EngineConfig::default(),
    );
    Harness {
        catalog: WorkflowCatalog::new(store.clone()),
        store,
        business,
        machine,
    }
}

fn node(id: &str, prev: Option<&str>, next: Option<&str>, assignees: &[&str]) -> NodeInput {
    NodeInput {
        node_id: id.to_string(),
        node_name: id.to_uppercase(),
        prev_node: prev.map(str::to_string),
        next_node: next.map(str::to_string),
        assignees: assignees.iter().map(|s| (*s).to_string()).collect(),
        act_type: ActType::Or,
        node_group_id: None,
    }
}

async fn define(h: &Harness, nodes: Vec<NodeInput>, accept: bool) -> WorkflowDefinition {
    let mut params = BTreeMap::new();
    params.insert(PARAM_DATASTORE.to_string(), "ds1".to_string());
    params.insert(PARAM_ACTION.to_string(), "update".to_string());
    let wf = h
        .catalog
        .add_workflow(
            TENANT,
            CreateWorkflowInput {
                group_id: "dept".to_string(),
                app_id: "app".to_string(),
                workflow_type: WorkflowType::InfoChange,
                is_valid: true,
                accept_or_dismiss: accept,
                params,
                writer: "admin".to_string(),
            },
        )
        .await
        .unwrap();
    h.catalog
        .add_nodes(TENANT, &wf.wf_id, nodes, "admin")
        .await
        .unwrap();
    wf
}

async fn start(h: &Harness, wf: &WorkflowDefinition) -> (String, InstanceStatus) {
    let ex = h
        .machine
        .add_example(TENANT, &wf.wf_id, "applicant")
        .await
        .unwrap();
    let status = h
        .machine
        .start_example_instance(
            TENANT,
            &StartRequest {
                wf_id: wf.wf_id.clone(),
                applicant: "applicant".to_string(),
                ex_id: ex.ex_id.clone(),
                domain: "example.com".to_string(),
            },
        )
        .await
        .unwrap();
    (ex.ex_id, status)
}

fn act(ex_id: &str, user: &str, comment: &str) -> ApprovalAction {
    ApprovalAction {
        ex_id: ex_id.to_string(),
        user_id: user.to_string(),
        comment: comment.to_string(),
        domain: "example.com".to_string(),
    }
}

#[tokio::test]
async fn test_single_node_two_assignees_first_admit_wins() {
    let h = harness(StaticDirectory::new());
    let wf = define(&h, vec![node("n1", None, None, &["u_A", "u_B"])], true).await;
    let (ex_id, status) = start(&h, &wf).await;
    assert_eq!(status, InstanceStatus::Pending);

    let ex = h.catalog.find_example(TENANT, &ex_id).await.unwrap();
    assert_eq!(ex.ex_name, format!("{}_applicant", wf.wf_name));

    let steps = h.store.find_processes(TENANT, &ex_id).await.unwrap();
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.status == StepStatus::Pending));

    let status = h.machine.admit(TENANT, &act(&ex_id, "A", "fine")).await.unwrap();
    assert_eq!(status, InstanceStatus::Approved);

    let steps = h.store.find_processes(TENANT, &ex_id).await.unwrap();
    let a = steps.iter().find(|s| s.user_id == "A").unwrap();
    let b = steps.iter().find(|s| s.user_id == "B").unwrap();
    assert_eq!(a.status, StepStatus::Approved);
    assert_eq!(a.comment, "fine");
    assert_eq!(b.status, StepStatus::Approved);
    assert_eq!(b.comment, AUTO_APPROVED_COMMENT);

    let commits = h.business.commits().await;
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].ex_id, ex_id);
    assert_eq!(commits[0].object_id.as_deref(), Some("ds1"));
    assert_eq!(commits[0].actor, "A");
}

#[tokio::test]
async fn test_admit_on_first_node_opens_second() {
    let h = harness(StaticDirectory::new());
    let wf = define(
        &h,
        vec![
            node("N1", None, Some("N2"), &["u_A"]),
            node("N2", Some("N1"), Some("0"), &["u_B"]),
        ],
        true,
    )
    .await;
    let (ex_id, _) = start(&h, &wf).await;

    let status = h.machine.admit(TENANT, &act(&ex_id, "A", "ok")).await.unwrap();
    assert_eq!(status, InstanceStatus::Pending);

    let queue = h.catalog.find_user_processes(TENANT, "B").await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].current_node, "N2");
    assert!(h.catalog.find_user_processes(TENANT, "A").await.unwrap().is_empty());

    let view = h.machine.get_status(TENANT, &ex_id, "B").await.unwrap();
    assert_eq!(view.approve_status, InstanceStatus::Pending);
    assert_eq!(view.current_node.as_deref(), Some("N2"));
    assert!(view.can_show);
    assert!(h.business.commits().await.is_empty());
}

#[tokio::test]
async fn test_dismiss_rejects_instance_and_discards() {
    let h = harness(StaticDirectory::new());
    let wf = define(
        &h,
        vec![
            node("N1", None, Some("N2"), &["u_A", "u_C"]),
            node("N2", Some("N1"), None, &["u_B"]),
        ],
        true,
    )
    .await;
    let (ex_id, _) = start(&h, &wf).await;

    let status = h.machine.dismiss(TENANT, &act(&ex_id, "C", "no")).await.unwrap();
    assert_eq!(status, InstanceStatus::Rejected);

    let steps = h.store.find_processes(TENANT, &ex_id).await.unwrap();
    let a = steps.iter().find(|s| s.user_id == "A").unwrap();
    assert_eq!(a.status, StepStatus::Rejected);
    assert_eq!(a.comment, AUTO_REJECTED_COMMENT);
    assert_eq!(h.business.discards().await.len(), 1);

    let view = h.machine.get_status(TENANT, &ex_id, "stranger").await.unwrap();
    assert_eq!(view.approver.as_deref(), Some("C"));
    assert!(!view.can_show);

    let err = h.machine.admit(TENANT, &act(&ex_id, "A", "late")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InstanceClosed { .. }));
}

#[tokio::test]
async fn test_stranger_is_not_authorized() {
    let h = harness(StaticDirectory::new());
    let wf = define(&h, vec![node("n1", None, None, &["u_A"])], true).await;
    let (ex_id, _) = start(&h, &wf).await;

    let err = h.machine.admit(TENANT, &act(&ex_id, "mallory", "")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotAuthorized { .. }));
    let err = h.machine.dismiss(TENANT, &act(&ex_id, "mallory", "")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotAuthorized { .. }));
}

#[tokio::test]
async fn test_no_approver_policy_decides_start() {
    let h = harness(StaticDirectory::new());

    let accept = define(&h, vec![node("n1", None, None, &["r_manager"])], true).await;
    let (ex_id, status) = start(&h, &accept).await;
    assert_eq!(status, InstanceStatus::Approved);
    let steps = h.store.find_processes(TENANT, &ex_id).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].user_id, SYSTEM_USER);
    assert_eq!(steps[0].status, StepStatus::Approved);

    let reject = define(&h, vec![node("n1", None, None, &["r_manager"])], false).await;
    let (_, status) = start(&h, &reject).await;
    assert_eq!(status, InstanceStatus::Rejected);
    assert_eq!(h.business.commits().await.len(), 1);
    assert_eq!(h.business.discards().await.len(), 1);
}

#[tokio::test]
async fn test_system_skips_unstaffed_middle_node() {
    let directory = StaticDirectory::new().with_member("boss", "dept", "manager");
    let h = harness(directory);
    let wf = define(
        &h,
        vec![
            node("N1", None, Some("N2"), &["u_A"]),
            node("N2", Some("N1"), Some("N3"), &["r_auditor"]),
            node("N3", Some("N2"), None, &["r_manager"]),
        ],
        true,
    )
    .await;
    let (ex_id, _) = start(&h, &wf).await;

    let status = h.machine.admit(TENANT, &act(&ex_id, "A", "ok")).await.unwrap();
    assert_eq!(status, InstanceStatus::Pending);
    let queue = h.catalog.find_user_processes(TENANT, "boss").await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].current_node, "N3");

    let steps = h.store.find_processes(TENANT, &ex_id).await.unwrap();
    assert!(steps.iter().any(|s| s.current_node == "N2" && s.user_id == SYSTEM_USER));
}

#[tokio::test]
async fn test_unanimous_node_waits_for_all() {
    let h = harness(StaticDirectory::new());
    let mut only = node("n1", None, None, &["u_A", "u_B"]);
    only.act_type = ActType::And;
    let wf = define(&h, vec![only], true).await;
    let (ex_id, _) = start(&h, &wf).await;

    assert_eq!(
        h.machine.admit(TENANT, &act(&ex_id, "A", "ok")).await.unwrap(),
        InstanceStatus::Pending
    );
    assert_eq!(
        h.machine.admit(TENANT, &act(&ex_id, "B", "ok")).await.unwrap(),
        InstanceStatus::Approved
    );
}

#[tokio::test]
async fn test_business_failure_leaves_state_untouched() {
    let h = harness(StaticDirectory::new());
    let wf = define(&h, vec![node("n1", None, None, &["u_A"])], true).await;
    let (ex_id, _) = start(&h, &wf).await;

    h.business.set_failing(true);
    let err = h.machine.admit(TENANT, &act(&ex_id, "A", "ok")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::UpstreamUnavailable(_)));

    let ex = h.catalog.find_example(TENANT, &ex_id).await.unwrap();
    assert_eq!(ex.status, InstanceStatus::Pending);
    let steps = h.store.find_processes(TENANT, &ex_id).await.unwrap();
    assert!(steps.iter().all(|s| s.status == StepStatus::Pending));

    h.business.set_failing(false);
    let status = h.machine.admit(TENANT, &act(&ex_id, "A", "ok")).await.unwrap();
    assert_eq!(status, InstanceStatus::Approved);
}

#[tokio::test]
async fn test_second_plan_from_same_read_is_refused() {
    let h = harness(StaticDirectory::new());
    let mut only = node("n1", None, None, &["u_A", "u_B"]);
    only.act_type = ActType::And;
    let wf = define(&h, vec![only], true).await;
    let (ex_id, _) = start(&h, &wf).await;

    let graph = NodeGraph::new(h.store.find_nodes(TENANT, &wf.wf_id).await.unwrap()).unwrap();
    let example = h.catalog.find_example(TENANT, &ex_id).await.unwrap();
    let steps = h.store.find_processes(TENANT, &ex_id).await.unwrap();

    // Both approvers build their plan before either is applied.
    let mut by_a = ApprovalPlan::new(example.clone(), steps.clone(), "A", Utc::now(), 7).unwrap();
    let mut by_b = ApprovalPlan::new(example, steps, "B", Utc::now(), 7).unwrap();
    assert_eq!(by_a.admit("A", "ok", &graph).unwrap(), Outcome::Waiting);
    assert_eq!(by_b.admit("B", "ok", &graph).unwrap(), Outcome::Waiting);

    h.store
        .apply(TENANT, &by_a.into_transition(), None)
        .await
        .unwrap();
    let err = h
        .store
        .apply(TENANT, &by_b.into_transition(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::StaleInstance(id) if id == ex_id));

    let steps = h.store.find_processes(TENANT, &ex_id).await.unwrap();
    let b_step = steps.iter().find(|s| s.user_id == "B").unwrap();
    assert_eq!(b_step.status, StepStatus::Pending);

    // A retry from a fresh read finishes the node.
    let status = h.machine.admit(TENANT, &act(&ex_id, "B", "ok")).await.unwrap();
    assert_eq!(status, InstanceStatus::Approved);
}

/// Starts a rival Dismiss while the final commit is in flight.
#[derive(Default)]
struct RivalDuringCommit {
    machine: OnceLock<ApprovalStateMachine>,
    ex_id: OnceLock<String>,
    rival: StdMutex<Option<JoinHandle<Result<InstanceStatus, WorkflowError>>>>,
    commits: AtomicUsize,
    discards: AtomicUsize,
}

#[async_trait]
impl BusinessData for RivalDuringCommit {
    async fn commit(&self, _tenant: &str, _change: &BusinessChange) -> Result<(), WorkflowError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let machine = self.machine.get().unwrap().clone();
        let ex_id = self.ex_id.get().unwrap().clone();
        let handle = tokio::spawn(async move {
            machine.dismiss(TENANT, &act(&ex_id, "B", "no")).await
        });
        *self.rival.lock().unwrap() = Some(handle);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    async fn discard(&self, _tenant: &str, _change: &BusinessChange) -> Result<(), WorkflowError> {
        self.discards.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dismiss_during_final_commit_loses() {
    let store = Arc::new(InMemoryStore::new());
    let business = Arc::new(RivalDuringCommit::default());
    let machine = ApprovalStateMachine::new(
        store.clone(),
        Arc::new(
            StaticGroupHierarchy::new()
                .with_parent("team", "dept")
                .with_parent("dept", "root"),
        ),
        Arc::new(StaticDirectory::new()),
        business.clone(),
        EngineConfig::default(),
    );
    let h = Harness {
        catalog: WorkflowCatalog::new(store.clone()),
        store,
        business: Arc::new(RecordingBusinessData::new()),
        machine: machine.clone(),
    };
    let _ = business.machine.set(machine);

    let wf = define(&h, vec![node("n1", None, None, &["u_A", "u_B"])], true).await;
    let (ex_id, _) = start(&h, &wf).await;
    let _ = business.ex_id.set(ex_id.clone());

    let status = h.machine.admit(TENANT, &act(&ex_id, "A", "ok")).await.unwrap();
    assert_eq!(status, InstanceStatus::Approved);

    let rival = business.rival.lock().unwrap().take().unwrap();
    let err = rival.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InstanceClosed {
            status: InstanceStatus::Approved,
            ..
        }
    ));

    assert_eq!(business.commits.load(Ordering::SeqCst), 1);
    assert_eq!(business.discards.load(Ordering::SeqCst), 0);
    let ex = h.catalog.find_example(TENANT, &ex_id).await.unwrap();
    assert_eq!(ex.status, InstanceStatus::Approved);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let h = harness(StaticDirectory::new());
    let wf = define(&h, vec![node("n1", None, None, &["u_A"])], true).await;
    let (ex_id, _) = start(&h, &wf).await;

    let err = h
        .machine
        .start_example_instance(
            TENANT,
            &StartRequest {
                wf_id: wf.wf_id.clone(),
                applicant: "applicant".to_string(),
                ex_id,
                domain: String::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
}

#[tokio::test]
async fn test_incomplete_graph_fails_at_start() {
    let h = harness(StaticDirectory::new());
    let wf = define(&h, vec![node("n1", None, None, &["u_A"])], true).await;
    // A second start node authored by hand.
    h.catalog
        .add_node(TENANT, &wf.wf_id, node("n2", None, None, &["u_B"]), "admin")
        .await
        .unwrap();

    let ex = h
        .machine
        .add_example(TENANT, &wf.wf_id, "applicant")
        .await
        .unwrap();
    let err = h
        .machine
        .start_example_instance(
            TENANT,
            &StartRequest {
                wf_id: wf.wf_id.clone(),
                applicant: "applicant".to_string(),
                ex_id: ex.ex_id,
                domain: String::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidGraph(_)));
}

// ============================================================================
// Cascade delete
// ============================================================================

async fn populated(h: &Harness, examples: usize) -> WorkflowDefinition {
    let wf = define(
        h,
        vec![
            node("N1", None, Some("N2"), &["u_A"]),
            node("N2", Some("N1"), None, &["u_B"]),
        ],
        true,
    )
    .await;
    h.catalog
        .add_relation(
            TENANT,
            RelationBinding {
                app_id: "app".into(),
                object_id: "ds1".into(),
                group_id: "team".into(),
                workflow_id: wf.wf_id.clone(),
                action: "update".into(),
            },
        )
        .await
        .unwrap();
    for _ in 0..examples {
        let (ex_id, _) = start(h, &wf).await;
        h.machine.admit(TENANT, &act(&ex_id, "A", "ok")).await.unwrap();
    }
    wf
}

async fn footprint(h: &Harness, wf_id: &str) -> (usize, usize, usize, usize) {
    let nodes = h.store.find_nodes(TENANT, wf_id).await.unwrap().len();
    let relations = h
        .store
        .find_relations(
            TENANT,
            &RelationFilter {
                app_id: "app".into(),
                workflow_id: Some(wf_id.to_string()),
                ..RelationFilter::default()
            },
        )
        .await
        .unwrap()
        .len();
    let examples = h.store.find_examples(TENANT, wf_id).await.unwrap();
    let mut steps = 0;
    for ex in &examples {
        steps += h.store.find_processes(TENANT, &ex.ex_id).await.unwrap().len();
    }
    (nodes, relations, examples.len(), steps)
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(f)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn prop_cascade_delete_is_complete_and_scoped(n1 in 0usize..4, n2 in 0usize..4) {
        block_on(async {
            let h = harness(StaticDirectory::new());
            let w1 = populated(&h, n1).await;
            let w2 = populated(&h, n2).await;
            let before_w2 = footprint(&h, &w2.wf_id).await;
            let orphan_steps: Vec<String> = h
                .store
                .find_examples(TENANT, &w1.wf_id).await.unwrap()
                .into_iter().map(|e| e.ex_id).collect();

            h.catalog.delete_workflows(TENANT, &[w1.wf_id.clone()]).await.unwrap();

            assert_eq!(footprint(&h, &w1.wf_id).await, (0, 0, 0, 0));
            assert!(h.store.find_workflow(TENANT, &w1.wf_id).await.unwrap().is_none());
            for ex_id in orphan_steps {
                assert!(h.store.find_processes(TENANT, &ex_id).await.unwrap().is_empty());
            }
            assert_eq!(footprint(&h, &w2.wf_id).await, before_w2);
        });
    }

    #[test]
    fn prop_cascade_delete_with_missing_id_changes_nothing(n in 0usize..4) {
        block_on(async {
            let h = harness(StaticDirectory::new());
            let wf = populated(&h, n).await;
            let before = footprint(&h, &wf.wf_id).await;

            let err = h
                .catalog
                .delete_workflows(TENANT, &[wf.wf_id.clone(), "missing".to_string()])
                .await
                .unwrap_err();
            assert!(matches!(err, WorkflowError::WorkflowNotFound(_)));

            assert_eq!(footprint(&h, &wf.wf_id).await, before);
            assert!(h.store.find_workflow(TENANT, &wf.wf_id).await.unwrap().is_some());
        });
    }
}

#[tokio::test]
async fn test_modify_workflow_and_tenant_isolation() {
    let h = harness(StaticDirectory::new());
    let wf = define(&h, vec![node("n1", None, None, &["u_A"])], true).await;

    let updated = h
        .catalog
        .modify_workflow(
            TENANT,
            &wf.wf_id,
            crate::workflow::types::UpdateWorkflowInput {
                is_valid: Some(false),
                accept_or_dismiss: None,
                fields: Some("amount,rate".to_string()),
                writer: "admin2".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(!updated.is_valid);
    assert!(updated.accept_or_dismiss);
    assert_eq!(updated.change_fields(), vec!["amount", "rate"]);
    assert_eq!(updated.updated_by, "admin2");
    assert!(updated.updated_at >= wf.updated_at);

    let other = h.catalog.find_workflow("tenant_b", &wf.wf_id).await.unwrap_err();
    assert!(matches!(other, WorkflowError::WorkflowNotFound(_)));
    assert!(Utc::now() >= updated.created_at);
}
