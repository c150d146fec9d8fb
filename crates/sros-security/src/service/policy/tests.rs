use proptest::prelude::*;
use tempfile::TempDir;

use super::*;
use crate::adapters::graph::MemoryAccessGraph;
use crate::domain::config::SecurityConfig;

fn policy(mode: PolicyMode, graph: MemoryAccessGraph) -> AccessPolicy {
    AccessPolicy::with_graph(mode, Some(Box::new(graph)))
}

fn config_in(dir: &TempDir, mode: PolicyMode) -> SecurityConfig {
    SecurityConfig {
        graph_name: Some("pubsub".to_string()),
        graph_mode: mode,
        graph_dir: dir.path().to_path_buf(),
        ..SecurityConfig::default()
    }
}

#[test]
fn test_train_learns_and_persists_edge() {
    let dir = TempDir::new().unwrap();
    let policy = AccessPolicy::from_config(&config_in(&dir, PolicyMode::Train)).unwrap();

    assert!(policy.is_registration_allowed("/talker_99_1700000000000", "/chatter", PermissionMask::Write));
    assert!(policy.is_registration_allowed("/talker", "/chatter", PermissionMask::Write));

    let stored = FileAccessGraph::open(dir.path().join("pubsub.json")).unwrap();
    assert!(stored.check("/talker", "/chatter", PermissionMask::Write).allowed);
    assert!(!stored.check("/talker", "/chatter", PermissionMask::Read).allowed);
    assert_eq!(stored.edge_count(), 1);
}

#[test]
fn test_train_retries_edge_that_failed_to_persist() {
    let dir = TempDir::new().unwrap();
    let policy = AccessPolicy::from_config(&config_in(&dir, PolicyMode::Train)).unwrap();
    let blocker = dir.path().join("pubsub.tmp");
    std::fs::create_dir(&blocker).unwrap();

    assert!(policy.allow_register_publisher("/talker", "/chatter"));
    assert!(policy.allow_register_publisher("/talker", "/chatter"));
    assert!(!dir.path().join("pubsub.json").exists());

    std::fs::remove_dir(&blocker).unwrap();
    assert!(policy.allow_register_publisher("/talker", "/chatter"));
    let stored = FileAccessGraph::open(dir.path().join("pubsub.json")).unwrap();
    assert!(stored.check("/talker", "/chatter", PermissionMask::Write).allowed);
}

#[test]
fn test_train_learned_edge_satisfies_enforce() {
    let dir = TempDir::new().unwrap();
    let trainer = AccessPolicy::from_config(&config_in(&dir, PolicyMode::Train)).unwrap();
    trainer.allow_register_subscriber("/listener", "/chatter");

    let enforcer = AccessPolicy::from_config(&config_in(&dir, PolicyMode::Enforce)).unwrap();
    assert!(enforcer.allow_register_subscriber("/listener-7", "/chatter"));
    assert!(!enforcer.allow_register_publisher("/listener", "/chatter"));
}

#[test]
fn test_enforce_respects_mask() {
    let graph = MemoryAccessGraph::new().with_edge("/n", "/t", PermissionMask::Read);
    let policy = policy(PolicyMode::Enforce, graph);

    assert!(!policy.is_registration_allowed("/n", "/t", PermissionMask::Write));
    assert!(policy.is_registration_allowed("/n", "/t", PermissionMask::Read));
    assert!(!policy.is_registration_allowed("/other", "/t", PermissionMask::Read));
}

#[test]
fn test_enforce_with_missing_file_denies_everything() {
    let dir = TempDir::new().unwrap();
    let policy = AccessPolicy::from_config(&config_in(&dir, PolicyMode::Enforce)).unwrap();

    assert!(!policy.allow_register_publisher("/talker", "/chatter"));
    assert!(!dir.path().join("pubsub.json").exists());
}

#[test]
fn test_audit_without_graph_allows() {
    let dir = TempDir::new().unwrap();
    let policy = AccessPolicy::from_config(&config_in(&dir, PolicyMode::Audit)).unwrap();

    assert!(policy.graph_location().is_none());
    assert!(policy.allow_register_publisher("/talker", "/chatter"));
}

#[test]
fn test_audit_with_graph_can_deny() {
    let graph = MemoryAccessGraph::new()
        .with_edge("/n", "/t", PermissionMask::Write)
        .with_audit("/n", "/t");
    let policy = policy(PolicyMode::Audit, graph);

    assert!(policy.allow_register_publisher("/n", "/t"));
    assert!(!policy.allow_register_subscriber("/n", "/t"));
}

#[test]
fn test_disabled_never_consults_graph() {
    let policy = policy(PolicyMode::Disabled, MemoryAccessGraph::new());
    assert!(policy.allow_register_publisher("/anyone", "/anything"));
    assert!(AccessPolicy::disabled().allow_register_subscriber("/anyone", "/anything"));
}

#[test]
fn test_unnamed_graph_means_disabled() {
    let config = SecurityConfig {
        graph_mode: PolicyMode::Enforce,
        ..SecurityConfig::default()
    };
    let policy = AccessPolicy::from_config(&config).unwrap();
    assert_eq!(policy.mode(), PolicyMode::Disabled);
}

#[test]
fn test_malformed_graph_is_config_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("pubsub.json"), b"{ not json").unwrap();

    let err = AccessPolicy::from_config(&config_in(&dir, PolicyMode::Complain)).unwrap_err();
    assert!(matches!(err, SecurityError::Config(_)));
}

#[test]
fn test_traversing_graph_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = SecurityConfig {
        graph_name: Some("../escape".to_string()),
        ..config_in(&dir, PolicyMode::Enforce)
    };
    assert!(matches!(
        AccessPolicy::from_config(&config),
        Err(SecurityError::InvalidName { .. })
    ));
}

fn edges() -> impl Strategy<Value = Vec<(String, String, bool)>> {
    prop::collection::vec(("/[a-c]", "/[x-z]", any::<bool>()), 0..8)
}

proptest! {
    #[test]
    fn complain_never_denies(
        edges in edges(),
        node in "/[a-d]",
        topic in "/[w-z]",
        write in any::<bool>(),
    ) {
        let mut graph = MemoryAccessGraph::new();
        for (n, t, w) in &edges {
            let mask = if *w { PermissionMask::Write } else { PermissionMask::Read };
            graph = graph.with_edge(n, t, mask);
        }
        let policy = policy(PolicyMode::Complain, graph);
        let mask = if write { PermissionMask::Write } else { PermissionMask::Read };
        prop_assert!(policy.is_registration_allowed(&node, &topic, mask));
    }
}
