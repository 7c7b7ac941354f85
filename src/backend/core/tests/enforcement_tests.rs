//! Integration tests for the enforcer.
//!
//! Tests cover:
//! - Transitive inheritance and the end-to-end editor/viewer scenario
//! - Denial without an assignment and after a role is replaced
//! - Cycle and duplicate rejection leaving the store untouched
//! - Snapshot swap atomicity under concurrent readers
//! - Reloads reading one consistent view while the store changes
//! - Administrative mutations serialized against each other
//! - Reload failure and timeout keeping the last good snapshot

mod common;

use common::FlakyStore;
use gatekeeper_core::error::AuthzError;
use gatekeeper_core::rbac::{
    Action, Enforcer, MemoryPolicyStore, PolicyAdminService, PolicyRule, PolicyStore,
    RoleInheritance, RoleName, UserId,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

async fn setup() -> (Arc<dyn PolicyStore>, Arc<Enforcer>, PolicyAdminService) {
    let store: Arc<dyn PolicyStore> = Arc::new(MemoryPolicyStore::new());
    let enforcer = Arc::new(
        Enforcer::build(store.clone(), Duration::from_secs(1))
            .await
            .unwrap(),
    );
    let admin = PolicyAdminService::new(store.clone(), enforcer.clone());
    (store, enforcer, admin)
}

// ============================================================================
// Decision Properties
// ============================================================================

#[tokio::test]
async fn test_inheritance_is_transitive() {
    let (_, enforcer, admin) = setup().await;

    admin
        .create_policy(&PolicyRule::new("user", "/api/posts", Action::Read))
        .await
        .unwrap();
    admin
        .create_inheritance(&RoleInheritance::new("moderator", "user"))
        .await
        .unwrap();
    admin
        .create_inheritance(&RoleInheritance::new("admin", "moderator"))
        .await
        .unwrap();
    admin
        .assign_user_role(&UserId::from("root"), &RoleName::from("admin"))
        .await
        .unwrap();

    assert!(enforcer.is_allowed("root", "/api/posts", Action::Read));
    assert!(!enforcer.is_allowed("root", "/api/posts", Action::Delete));
}

#[tokio::test]
async fn test_end_to_end_editor_viewer() {
    let (_, enforcer, admin) = setup().await;

    admin
        .create_inheritance(&RoleInheritance::new("editor", "viewer"))
        .await
        .unwrap();
    admin
        .create_policy(&PolicyRule::new("viewer", "/docs", Action::Read))
        .await
        .unwrap();
    admin
        .assign_user_role(&UserId::from("u1"), &RoleName::from("editor"))
        .await
        .unwrap();

    assert!(enforcer.is_allowed("u1", "/docs", Action::Read));
    assert!(!enforcer.is_allowed("u1", "/docs", Action::Delete));
}

#[tokio::test]
async fn test_no_assignment_is_always_denied() {
    let (_, enforcer, admin) = setup().await;

    for action in Action::ALL {
        admin
            .create_policy(&PolicyRule::new("viewer", "/docs", action))
            .await
            .unwrap();
    }

    for action in Action::ALL {
        assert!(!enforcer.is_allowed("stranger", "/docs", action));
        assert!(!enforcer.is_allowed("", "/docs", action));
    }
}

#[tokio::test]
async fn test_replace_semantics_drop_previous_grants() {
    let (store, enforcer, admin) = setup().await;
    let user = UserId::from("alice");

    admin
        .create_policy(&PolicyRule::new("admin", "/api/users", Action::Delete))
        .await
        .unwrap();
    admin
        .create_policy(&PolicyRule::new("user", "/api/me", Action::Read))
        .await
        .unwrap();

    admin
        .assign_user_role(&user, &RoleName::from("admin"))
        .await
        .unwrap();
    assert!(enforcer.is_allowed("alice", "/api/users", Action::Delete));

    admin
        .assign_user_role(&user, &RoleName::from("user"))
        .await
        .unwrap();

    let assignments = store.list_role_assignments().await.unwrap();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].role, RoleName::from("user"));
    assert!(!enforcer.is_allowed("alice", "/api/users", Action::Delete));
    assert!(enforcer.is_allowed("alice", "/api/me", Action::Read));
}

#[tokio::test]
async fn test_cycle_rejected_before_persisting() {
    let (store, _, admin) = setup().await;

    admin
        .create_inheritance(&RoleInheritance::new("admin", "moderator"))
        .await
        .unwrap();
    admin
        .create_inheritance(&RoleInheritance::new("moderator", "user"))
        .await
        .unwrap();
    let before = store.list_inheritance().await.unwrap();

    let err = admin
        .create_inheritance(&RoleInheritance::new("user", "admin"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::CycleDetected { .. }));

    let err = admin
        .create_inheritance(&RoleInheritance::new("user", "user"))
        .await
        .unwrap_err();
    match err {
        AuthzError::CycleDetected { path } => assert_eq!(path, vec!["user", "user"]),
        other => panic!("expected CycleDetected, got {:?}", other),
    }

    assert_eq!(store.list_inheritance().await.unwrap(), before);
}

#[tokio::test]
async fn test_duplicate_rule_rejected() {
    let (store, _, admin) = setup().await;
    let rule = PolicyRule::new("admin", "/api/x", Action::Read);

    admin.create_policy(&rule).await.unwrap();
    let err = admin.create_policy(&rule).await.unwrap_err();

    assert!(matches!(err, AuthzError::DuplicateRule(_)));
    assert_eq!(store.list_policies().await.unwrap(), vec![rule]);
}

#[tokio::test]
async fn test_decisions_wait_for_reload() {
    let (store, enforcer, _) = setup().await;

    store
        .create_policy(&PolicyRule::new("viewer", "/docs", Action::Read))
        .await
        .unwrap();
    store
        .set_user_role(&UserId::from("u1"), &RoleName::from("viewer"))
        .await
        .unwrap();

    assert!(!enforcer.is_allowed("u1", "/docs", Action::Read));

    enforcer.reload().await.unwrap();
    assert!(enforcer.is_allowed("u1", "/docs", Action::Read));
}

// ============================================================================
// Reload Atomicity
// ============================================================================

/// Moves `/docs` read from `viewer` to `writer` and the `editor` edge with it.
///
/// Both complete states allow `u1`; any mix of the old graph with the new
/// index (or the reverse) denies.
async fn swap_grant(store: &dyn PolicyStore, from: &str, to: &str) {
    store
        .delete_policy(&PolicyRule::new(from, "/docs", Action::Read))
        .await
        .unwrap();
    store
        .delete_inheritance(&RoleInheritance::new("editor", from))
        .await
        .unwrap();
    store
        .create_inheritance(&RoleInheritance::new("editor", to))
        .await
        .unwrap();
    store
        .create_policy(&PolicyRule::new(to, "/docs", Action::Read))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_never_see_mixed_state() {
    let (store, enforcer, admin) = setup().await;

    admin
        .create_policy(&PolicyRule::new("viewer", "/docs", Action::Read))
        .await
        .unwrap();
    admin
        .create_inheritance(&RoleInheritance::new("editor", "viewer"))
        .await
        .unwrap();
    admin
        .assign_user_role(&UserId::from("u1"), &RoleName::from("editor"))
        .await
        .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let denials = Arc::new(AtomicUsize::new(0));
    let checks = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let enforcer = enforcer.clone();
            let stop = stop.clone();
            let denials = denials.clone();
            let checks = checks.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    if !enforcer.is_allowed("u1", "/docs", Action::Read) {
                        denials.fetch_add(1, Ordering::Relaxed);
                    }
                    checks.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for round in 0..50 {
        let (from, to) = if round % 2 == 0 {
            ("viewer", "writer")
        } else {
            ("writer", "viewer")
        };
        swap_grant(store.as_ref(), from, to).await;
        enforcer.reload().await.unwrap();
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    assert!(checks.load(Ordering::Relaxed) > 0);
    assert_eq!(denials.load(Ordering::Relaxed), 0);
    assert!(enforcer.generation() > 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reloads_are_serialized() {
    let (store, enforcer, _) = setup().await;
    store
        .create_policy(&PolicyRule::new("viewer", "/docs", Action::Read))
        .await
        .unwrap();

    let start = enforcer.generation();
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let enforcer = enforcer.clone();
            tokio::spawn(async move { enforcer.reload().await.unwrap().generation })
        })
        .collect();

    let mut generations = Vec::new();
    for task in tasks {
        generations.push(task.await.unwrap());
    }
    generations.sort_unstable();

    let expected: Vec<u64> = (start + 1..=start + 16).collect();
    assert_eq!(generations, expected);
    assert_eq!(enforcer.generation(), start + 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reload_reads_one_consistent_view() {
    let flaky = Arc::new(FlakyStore::new());
    let store: Arc<dyn PolicyStore> = flaky.clone();

    store
        .create_policy(&PolicyRule::new("viewer", "/docs", Action::Read))
        .await
        .unwrap();
    store
        .create_inheritance(&RoleInheritance::new("editor", "viewer"))
        .await
        .unwrap();
    store
        .set_user_role(&UserId::from("u1"), &RoleName::from("editor"))
        .await
        .unwrap();

    let enforcer = Arc::new(
        Enforcer::build(store.clone(), Duration::from_secs(1))
            .await
            .unwrap(),
    );
    assert!(enforcer.is_allowed("u1", "/docs", Action::Read));

    // A reload listing the tables one by one would pick up the old rules
    // and, after this stall, the new edges.
    flaky.delay_edge_listing(Some(Duration::from_millis(100)));
    let reload = {
        let enforcer = enforcer.clone();
        tokio::spawn(async move { enforcer.reload().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    swap_grant(store.as_ref(), "viewer", "writer").await;

    reload.await.unwrap().unwrap();
    assert!(enforcer.is_allowed("u1", "/docs", Action::Read));

    enforcer.reload().await.unwrap();
    assert!(enforcer.is_allowed("u1", "/docs", Action::Read));
    assert_eq!(enforcer.snapshot().edge_count(), 1);
}

// ============================================================================
// Serialized Administration
// ============================================================================

async fn slow_admin() -> (Arc<FlakyStore>, Arc<PolicyAdminService>) {
    let flaky = Arc::new(FlakyStore::new());
    let store: Arc<dyn PolicyStore> = flaky.clone();
    let enforcer = Arc::new(
        Enforcer::build(store.clone(), Duration::from_secs(1))
            .await
            .unwrap(),
    );
    (flaky, Arc::new(PolicyAdminService::new(store, enforcer)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_assignment_waits_for_concurrent_policy_delete() {
    let (flaky, admin) = slow_admin().await;
    let rule = PolicyRule::new("auditor", "/logs", Action::Read);
    admin.create_policy(&rule).await.unwrap();

    flaky.delay_writes(Some(Duration::from_millis(100)));
    let delete = {
        let admin = admin.clone();
        let rule = rule.clone();
        tokio::spawn(async move { admin.delete_policy(&rule).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The delete is still stalled in the store; the assignment must not
    // validate against the rule it is removing.
    let err = admin
        .assign_user_role(&UserId::from("u1"), &RoleName::from("auditor"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::UnknownRole(role) if role == "auditor"));

    delete.await.unwrap().unwrap();
    assert!(admin.role_of_user(&UserId::from("u1")).await.is_err());
    assert!(admin.list_roles().await.unwrap().is_empty());
    assert!(!admin.enforcer().is_allowed("u1", "/logs", Action::Read));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_not_broken_by_concurrent_create() {
    let (flaky, admin) = slow_admin().await;
    let old = PolicyRule::new("viewer", "/docs", Action::Read);
    let new = PolicyRule::new("viewer", "/docs", Action::Update);
    admin.create_policy(&old).await.unwrap();

    flaky.delay_writes(Some(Duration::from_millis(100)));
    let update = {
        let admin = admin.clone();
        let (old, new) = (old.clone(), new.clone());
        tokio::spawn(async move { admin.update_policy(&old, &new).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = admin.create_policy(&new).await.unwrap_err();
    assert!(matches!(err, AuthzError::DuplicateRule(rule) if rule == new));

    let receipt = update.await.unwrap().unwrap();
    assert!(receipt.stage.is_effective());
    assert_eq!(flaky.list_policies().await.unwrap(), vec![new]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_assignments_leave_one_role() {
    let (flaky, admin) = slow_admin().await;
    for role in ["a", "b"] {
        admin
            .create_policy(&PolicyRule::new(role, "/docs", Action::Read))
            .await
            .unwrap();
    }

    flaky.delay_writes(Some(Duration::from_millis(10)));
    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let admin = admin.clone();
            let role = if i % 2 == 0 { "a" } else { "b" };
            tokio::spawn(async move {
                admin
                    .assign_user_role(&UserId::from("u1"), &RoleName::from(role))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let assignments = admin.list_assignments().await.unwrap();
    assert_eq!(assignments.len(), 1);
    assert_eq!(
        admin.role_of_user(&UserId::from("u1")).await.unwrap(),
        assignments[0].role
    );
    assert!(admin.enforcer().is_allowed("u1", "/docs", Action::Read));
}

// ============================================================================
// Reload Failure
// ============================================================================

async fn flaky_setup() -> (Arc<FlakyStore>, Arc<Enforcer>) {
    let flaky = Arc::new(FlakyStore::new());
    let store: Arc<dyn PolicyStore> = flaky.clone();

    store
        .create_policy(&PolicyRule::new("viewer", "/docs", Action::Read))
        .await
        .unwrap();
    store
        .set_user_role(&UserId::from("u1"), &RoleName::from("viewer"))
        .await
        .unwrap();

    let enforcer = Arc::new(
        Enforcer::build(store, Duration::from_millis(50))
            .await
            .unwrap(),
    );
    (flaky, enforcer)
}

#[tokio::test]
async fn test_store_failure_keeps_last_good_snapshot() {
    let (flaky, enforcer) = flaky_setup().await;
    let generation = enforcer.generation();

    flaky.fail_reads(true);
    let err = enforcer.reload().await.unwrap_err();

    assert!(matches!(err, AuthzError::StoreUnavailable { .. }));
    assert_eq!(enforcer.generation(), generation);
    assert!(enforcer.is_allowed("u1", "/docs", Action::Read));
    assert!(enforcer.last_reload_error().is_some());

    flaky.fail_reads(false);
    enforcer.reload().await.unwrap();
    assert_eq!(enforcer.generation(), generation + 1);
    assert!(enforcer.last_reload_error().is_none());
}

#[tokio::test]
async fn test_reload_timeout_keeps_last_good_snapshot() {
    let (flaky, enforcer) = flaky_setup().await;
    let generation = enforcer.generation();

    flaky.delay_reads(Some(Duration::from_millis(500)));
    let err = enforcer.reload().await.unwrap_err();

    assert!(matches!(err, AuthzError::ReloadTimeout(_)));
    assert_eq!(enforcer.generation(), generation);
    assert!(enforcer.is_allowed("u1", "/docs", Action::Read));
}

#[tokio::test]
async fn test_cyclic_store_keeps_last_good_snapshot() {
    let (flaky, enforcer) = flaky_setup().await;

    // Written straight to the store, bypassing the cycle check.
    flaky
        .create_inheritance(&RoleInheritance::new("a", "b"))
        .await
        .unwrap();
    flaky
        .create_inheritance(&RoleInheritance::new("b", "a"))
        .await
        .unwrap();

    let err = enforcer.reload().await.unwrap_err();
    assert!(matches!(err, AuthzError::CycleDetected { .. }));
    assert!(enforcer.is_allowed("u1", "/docs", Action::Read));
    assert_eq!(enforcer.snapshot().edge_count(), 0);
}

#[tokio::test]
async fn test_initial_build_fails_without_store() {
    let flaky = Arc::new(FlakyStore::new());
    flaky.fail_reads(true);

    let result = Enforcer::build(flaky, Duration::from_millis(50)).await;
    assert!(matches!(result, Err(AuthzError::StoreUnavailable { .. })));
}
