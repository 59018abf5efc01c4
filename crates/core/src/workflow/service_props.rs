//! Property-based tests for ApprovalPlan.
//!
//! Random linear graphs with random assignees are driven by random
//! sequences of Admit/Dismiss calls.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use proptest::prelude::*;

use crate::workflow::error::WorkflowError;
use crate::workflow::graph::NodeGraph;
use crate::workflow::graph::tests::node;
use crate::workflow::service::tests::example;
use crate::workflow::service::{ApprovalPlan, Outcome};
use crate::workflow::types::{ActType, InstanceStatus, StepStatus};

/// One node: completion rule plus indices into the user pool.
fn arb_node_spec() -> impl Strategy<Value = (ActType, Vec<usize>)> {
    (
        prop_oneof![Just(ActType::Or), Just(ActType::And)],
        proptest::sample::subsequence(vec![0usize, 1, 2, 3], 1..=3),
    )
}

/// (user index, admit?) pairs.
fn arb_actions() -> impl Strategy<Value = Vec<(usize, bool)>> {
    prop::collection::vec((0usize..4, any::<bool>()), 0..16)
}

fn build(specs: &[(ActType, Vec<usize>)]) -> (NodeGraph, Vec<Vec<String>>) {
    let ids: Vec<String> = (0..specs.len()).map(|i| format!("n{i}")).collect();
    let nodes = specs
        .iter()
        .enumerate()
        .map(|(i, (act, _))| {
            let prev = i.checked_sub(1).map(|p| ids[p].as_str());
            let next = ids.get(i + 1).map(String::as_str);
            let mut n = node(&ids[i], prev, next);
            n.act_type = *act;
            n
        })
        .collect();
    let approvers = specs
        .iter()
        .map(|(_, users)| users.iter().map(|u| format!("u{u}")).collect())
        .collect();
    (NodeGraph::new(nodes).unwrap(), approvers)
}

fn node_index(node_id: &str) -> usize {
    node_id.trim_start_matches('n').parse().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // =========================================================================
    // Decided steps never change again, and a dismissal ends the instance.
    // =========================================================================

    #[test]
    fn prop_step_status_is_monotonic_and_rejection_dominates(
        specs in prop::collection::vec(arb_node_spec(), 1..4),
        actions in arb_actions(),
    ) {
        let (graph, approvers) = build(&specs);
        let mut plan = ApprovalPlan::new(
            example(InstanceStatus::Pending), vec![], "applicant", Utc::now(), 5,
        ).unwrap();
        plan.open_node("n0", &approvers[0]);

        let mut decided: HashMap<String, StepStatus> = HashMap::new();
        let mut dismissed = false;

        for (u, admit) in actions {
            let user = format!("u{u}");
            let result = if admit {
                plan.admit(&user, "ok", &graph)
            } else {
                plan.dismiss(&user, "no")
            };
            match result {
                Ok(Outcome::Advance(next)) => {
                    let i = node_index(&next);
                    plan.open_node(&next, &approvers[i]);
                }
                Ok(Outcome::Finished(InstanceStatus::Rejected)) => dismissed = true,
                Ok(_) | Err(WorkflowError::NotAuthorized { .. }) => {}
                Err(e) => prop_assert!(false, "unexpected error {e}"),
            }

            for step in plan.steps() {
                match decided.get(&step.pro_id) {
                    Some(prev) => prop_assert_eq!(*prev, step.status),
                    None if step.status != StepStatus::Pending => {
                        decided.insert(step.pro_id.clone(), step.status);
                    }
                    None => {}
                }
            }

            if dismissed {
                prop_assert_eq!(plan.status(), InstanceStatus::Rejected);
                prop_assert!(plan.steps().iter().all(|s| s.status != StepStatus::Pending));
            }
        }
    }

    // =========================================================================
    // Pending steps always sit on one node, one per approver.
    // =========================================================================

    #[test]
    fn prop_single_active_node_and_step_per_approver(
        specs in prop::collection::vec(arb_node_spec(), 1..4),
        actions in arb_actions(),
    ) {
        let (graph, approvers) = build(&specs);
        let mut plan = ApprovalPlan::new(
            example(InstanceStatus::Pending), vec![], "applicant", Utc::now(), 5,
        ).unwrap();
        plan.open_node("n0", &approvers[0]);

        for (u, admit) in actions {
            let user = format!("u{u}");
            let result = if admit {
                plan.admit(&user, "ok", &graph)
            } else {
                plan.dismiss(&user, "no")
            };
            if let Ok(Outcome::Advance(next)) = result {
                let i = node_index(&next);
                plan.open_node(&next, &approvers[i]);
            }

            let pending: Vec<_> = plan
                .steps()
                .iter()
                .filter(|s| s.status == StepStatus::Pending)
                .collect();
            let nodes: HashSet<&str> = pending.iter().map(|s| s.current_node.as_str()).collect();
            prop_assert!(nodes.len() <= 1);
            let users: HashSet<&str> = pending.iter().map(|s| s.user_id.as_str()).collect();
            prop_assert_eq!(users.len(), pending.len());
            prop_assert_eq!(
                pending.is_empty(),
                plan.status() != InstanceStatus::Pending
            );
        }
    }

    // =========================================================================
    // An approved instance had every unanimous node fully admitted.
    // =========================================================================

    #[test]
    fn prop_approval_respects_unanimous_nodes(
        specs in prop::collection::vec(arb_node_spec(), 1..4),
    ) {
        let (graph, approvers) = build(&specs);
        let mut plan = ApprovalPlan::new(
            example(InstanceStatus::Pending), vec![], "applicant", Utc::now(), 5,
        ).unwrap();
        plan.open_node("n0", &approvers[0]);

        // Everyone admits in pool order until the instance ends.
        for _ in 0..32 {
            if plan.status() != InstanceStatus::Pending {
                break;
            }
            for u in 0..4 {
                let user = format!("u{u}");
                if let Ok(Outcome::Advance(next)) = plan.admit(&user, "ok", &graph) {
                    let i = node_index(&next);
                    plan.open_node(&next, &approvers[i]);
                }
            }
        }

        prop_assert_eq!(plan.status(), InstanceStatus::Approved);
        let t = plan.into_transition();
        for (i, (act, users)) in specs.iter().enumerate() {
            let on_node: Vec<_> = t
                .new_steps
                .iter()
                .filter(|s| s.current_node == format!("n{i}"))
                .collect();
            prop_assert_eq!(on_node.len(), users.len());
            if *act == ActType::And {
                prop_assert!(on_node.iter().all(|s| s.comment == "ok"));
            }
        }
    }
}
