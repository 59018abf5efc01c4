//! Property-based and scenario tests for WorkflowResolver.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use proptest::prelude::*;
use ringi_shared::ResolutionPolicy;

use crate::workflow::error::WorkflowError;
use crate::workflow::memory::{InMemoryStore, StaticGroupHierarchy};
use crate::workflow::resolver::{
    GroupHierarchy, MockGroupHierarchy, ROOT_GROUP, Resolution, ResolveQuery, WorkflowResolver,
};
use crate::workflow::store::WorkflowStore;
use crate::workflow::types::{
    PARAM_ACTION, PARAM_DATASTORE, RelationBinding, WorkflowDefinition, WorkflowType,
};

const TENANT: &str = "tenant_a";

/// Counts hierarchy lookups.
struct Counting {
    inner: StaticGroupHierarchy,
    calls: AtomicUsize,
}

#[async_trait]
impl GroupHierarchy for Counting {
    async fn parent_group(
        &self,
        tenant: &str,
        group_id: &str,
    ) -> Result<Option<String>, WorkflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.parent_group(tenant, group_id).await
    }
}

fn workflow(id: &str, group: &str, object: &str, action: &str, age_secs: i64) -> WorkflowDefinition {
    let at = Utc::now() - Duration::seconds(age_secs);
    let mut params = BTreeMap::new();
    params.insert(PARAM_DATASTORE.to_string(), object.to_string());
    params.insert(PARAM_ACTION.to_string(), action.to_string());
    WorkflowDefinition {
        wf_id: id.to_string(),
        wf_name: WorkflowDefinition::display_name("X", id),
        menu_name: WorkflowDefinition::menu_key("X", id),
        is_valid: true,
        group_id: group.to_string(),
        app_id: "X".to_string(),
        workflow_type: WorkflowType::InfoChange,
        accept_or_dismiss: true,
        params,
        created_at: at,
        created_by: "admin".to_string(),
        updated_at: at,
        updated_by: "admin".to_string(),
    }
}

fn query(group: &str, action: &str) -> ResolveQuery {
    ResolveQuery {
        tenant: TENANT.to_string(),
        group_id: group.to_string(),
        app_id: "X".to_string(),
        object_id: "Y".to_string(),
        action: action.to_string(),
    }
}

/// g0 (leaf) -> g1 -> ... -> g{depth-1} -> root
fn chain(depth: usize) -> StaticGroupHierarchy {
    (0..depth).fold(StaticGroupHierarchy::new(), |h, i| {
        let parent = if i + 1 == depth {
            ROOT_GROUP.to_string()
        } else {
            format!("g{}", i + 1)
        };
        h.with_parent(&format!("g{i}"), &parent)
    })
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(f)
}

fn ids(resolution: &Resolution) -> Vec<String> {
    match resolution {
        Resolution::Matched(wfs) => wfs.iter().map(|w| w.wf_id.clone()).collect(),
        Resolution::NotConfigured => vec![],
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // =========================================================================
    // Termination: a tree of depth D needs at most D hierarchy lookups.
    // =========================================================================

    #[test]
    fn prop_unconfigured_chain_terminates(depth in 1usize..24) {
        let store = InMemoryStore::new();
        let groups = Counting { inner: chain(depth), calls: AtomicUsize::new(0) };
        let resolver = WorkflowResolver::new(&store, &groups, 64);

        let result = block_on(resolver.resolve(&query("g0", "Z"))).unwrap();
        prop_assert_eq!(result, Resolution::NotConfigured);
        prop_assert!(groups.calls.load(Ordering::SeqCst) <= depth);
    }

    // =========================================================================
    // Nearest match: the closest configured level wins, never an ancestor.
    // =========================================================================

    #[test]
    fn prop_nearest_level_wins(
        depth in 2usize..12,
        near_offset in 0usize..11,
        gap in 1usize..11,
    ) {
        let near = near_offset % (depth - 1);
        let far = (near + gap).min(depth - 1);
        prop_assume!(far > near);

        let store = InMemoryStore::new();
        block_on(async {
            store.insert_workflow(TENANT, &workflow("near", &format!("g{near}"), "Y", "Z", 10)).await.unwrap();
            store.insert_workflow(TENANT, &workflow("far", &format!("g{far}"), "Y", "Z", 0)).await.unwrap();
        });
        let groups = chain(depth);
        let resolver = WorkflowResolver::new(&store, &groups, 64);

        let result = block_on(resolver.resolve(&query("g0", "Z"))).unwrap();
        prop_assert_eq!(ids(&result), vec!["near".to_string()]);
    }

    // =========================================================================
    // Escalation: a template only at the top-level group is found from below.
    // =========================================================================

    #[test]
    fn prop_top_level_template_found(depth in 1usize..16) {
        let store = InMemoryStore::new();
        let top = format!("g{}", depth - 1);
        block_on(store.insert_workflow(TENANT, &workflow("top", &top, "Y", "Z", 0))).unwrap();
        let groups = chain(depth);
        let resolver = WorkflowResolver::new(&store, &groups, 64);

        let result = block_on(resolver.resolve(&query("g0", "Z"))).unwrap();
        prop_assert_eq!(ids(&result), vec!["top".to_string()]);
    }
}

#[tokio::test]
async fn test_three_level_scenario_resolves_to_top_group() {
    // G3 -> G2 -> G1, G1 is top-level; only G1 is configured.
    let store = InMemoryStore::new();
    store
        .insert_workflow(TENANT, &workflow("w1", "G1", "Y", "Z", 0))
        .await
        .unwrap();
    let groups = StaticGroupHierarchy::new()
        .with_parent("G3", "G2")
        .with_parent("G2", "G1")
        .with_parent("G1", ROOT_GROUP);
    let resolver = WorkflowResolver::new(&store, &groups, 64);

    let result = resolver.resolve(&query("G3", "Z")).await.unwrap();
    assert_eq!(ids(&result), vec!["w1".to_string()]);
}

#[tokio::test]
async fn test_cyclic_hierarchy_is_bounded() {
    let store = InMemoryStore::new();
    let groups = StaticGroupHierarchy::new()
        .with_parent("a", "b")
        .with_parent("b", "a");
    let resolver = WorkflowResolver::new(&store, &groups, 16);

    let err = resolver.resolve(&query("a", "Z")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidGraph(_)));
}

#[tokio::test]
async fn test_filters_invalid_and_mismatched_templates() {
    let store = InMemoryStore::new();
    let mut invalid = workflow("invalid", "g0", "Y", "Z", 0);
    invalid.is_valid = false;
    store.insert_workflow(TENANT, &invalid).await.unwrap();
    store
        .insert_workflow(TENANT, &workflow("other-object", "g0", "Q", "Z", 0))
        .await
        .unwrap();
    store
        .insert_workflow(TENANT, &workflow("other-action", "g0", "Y", "W", 0))
        .await
        .unwrap();
    let groups = StaticGroupHierarchy::new();
    let resolver = WorkflowResolver::new(&store, &groups, 64);

    let result = resolver.resolve(&query("g0", "Z")).await.unwrap();
    assert_eq!(result, Resolution::NotConfigured);

    // An empty action matches templates for any action.
    let any = resolver.resolve(&query("g0", "")).await.unwrap();
    assert_eq!(ids(&any), vec!["other-action".to_string()]);
}

#[tokio::test]
async fn test_results_newest_first_across_bindings() {
    let store = InMemoryStore::new();
    store
        .insert_workflow(TENANT, &workflow("old", "g0", "Y", "Z", 100))
        .await
        .unwrap();
    // Bound through a relation; owned by another group.
    store
        .insert_workflow(TENANT, &workflow("bound", "elsewhere", "other", "other", 0))
        .await
        .unwrap();
    store
        .insert_relation(
            TENANT,
            &RelationBinding {
                app_id: "X".into(),
                object_id: "Y".into(),
                group_id: "g0".into(),
                workflow_id: "bound".into(),
                action: "Z".into(),
            },
        )
        .await
        .unwrap();
    let groups = StaticGroupHierarchy::new();
    let resolver = WorkflowResolver::new(&store, &groups, 64);

    let result = resolver.resolve(&query("g0", "Z")).await.unwrap();
    assert_eq!(ids(&result), vec!["bound".to_string(), "old".to_string()]);
}

#[tokio::test]
async fn test_hierarchy_failure_respects_policy() {
    let store = InMemoryStore::new();
    let mut groups = MockGroupHierarchy::new();
    groups
        .expect_parent_group()
        .returning(|_, _| Err(WorkflowError::UpstreamUnavailable("manage down".into())));
    let resolver = WorkflowResolver::new(&store, &groups, 64);

    let open = resolver
        .resolve_with_policy(&query("g0", "Z"), ResolutionPolicy::FailOpen)
        .await
        .unwrap();
    assert!(open.is_empty());

    let closed = resolver
        .resolve_with_policy(&query("g0", "Z"), ResolutionPolicy::FailClosed)
        .await
        .unwrap_err();
    assert!(matches!(closed, WorkflowError::UpstreamUnavailable(_)));
}
