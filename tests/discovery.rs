// tests/discovery.rs

//! Discovery: enabled sets, disable ordering, unknown-release purging.

mod common;

use std::sync::Arc;

use common::{fixture, test_manager, MockHookExecutor, MockPackageManager, ProbeBehavior};
use helmsman::{ClusterConfig, Toggle};

#[tokio::test]
async fn enabled_set_is_a_catalog_subsequence() {
    let pm = Arc::new(MockPackageManager::default());
    let executor = Arc::new(MockHookExecutor::new());
    let (manager, _events) = test_manager(
        &[
            fixture("a", Toggle::On, false),
            fixture("b", Toggle::On, false),
            fixture("c", Toggle::On, false),
        ],
        pm,
        executor,
    );
    manager.init(ClusterConfig::default());

    let state = manager.discover_modules_state().await.unwrap();
    assert_eq!(state.enabled_modules, vec!["a", "b", "c"]);
    assert_eq!(state.newly_enabled_modules, vec!["a", "b", "c"]);
    assert!(state.modules_to_disable.is_empty());
    assert!(state.released_unknown_modules.is_empty());
}

#[tokio::test]
async fn probes_see_their_enabled_predecessors() {
    let pm = Arc::new(MockPackageManager::default());
    let executor = Arc::new(MockHookExecutor::new());
    executor.set_probe("b", ProbeBehavior::Reject);
    let (manager, _events) = test_manager(
        &[
            fixture("a", Toggle::On, true),
            fixture("b", Toggle::On, true),
            fixture("c", Toggle::On, true),
        ],
        pm,
        executor.clone(),
    );
    manager.init(ClusterConfig::default());

    let state = manager.discover_modules_state().await.unwrap();
    assert_eq!(state.enabled_modules, vec!["a", "c"]);

    // Each probe observed exactly the accepted modules ahead of it
    let runs = executor.probe_runs();
    assert_eq!(runs[0], ("a".to_string(), vec![]));
    assert_eq!(runs[1], ("b".to_string(), vec!["a".to_string()]));
    assert_eq!(runs[2], ("c".to_string(), vec!["a".to_string()]));
}

#[tokio::test]
async fn unknown_releases_are_purged_in_reverse_lexical_order() {
    // Scenario: package manager lists [a, zombie], catalog is [a, b],
    // effective is [a]
    let pm = Arc::new(MockPackageManager::with_releases(&["a", "zombie", "alpha"]));
    let executor = Arc::new(MockHookExecutor::new());
    let (manager, _events) = test_manager(
        &[fixture("a", Toggle::On, false), fixture("b", Toggle::Unset, false)],
        pm,
        executor,
    );
    manager.init(ClusterConfig::default());

    let state = manager.discover_modules_state().await.unwrap();
    assert_eq!(state.enabled_modules, vec!["a"]);
    assert_eq!(state.released_unknown_modules, vec!["zombie", "alpha"]);
    assert!(state.modules_to_disable.is_empty());
}

#[tokio::test]
async fn disable_order_is_reverse_catalog_order() {
    // Previous effective [a, b, c] with releases for all; new effective
    // shrinks to [a]
    let pm = Arc::new(MockPackageManager::with_releases(&["a", "b", "c"]));
    let executor = Arc::new(MockHookExecutor::new());
    let (manager, _events) = test_manager(
        &[
            fixture("a", Toggle::On, false),
            fixture("b", Toggle::On, true),
            fixture("c", Toggle::On, true),
        ],
        pm,
        executor.clone(),
    );
    manager.init(ClusterConfig::default());

    let state = manager.discover_modules_state().await.unwrap();
    assert_eq!(state.enabled_modules, vec!["a", "b", "c"]);

    executor.set_probe("b", ProbeBehavior::Reject);
    executor.set_probe("c", ProbeBehavior::Reject);

    let state = manager.discover_modules_state().await.unwrap();
    assert_eq!(state.enabled_modules, vec!["a"]);
    assert_eq!(state.modules_to_disable, vec!["c", "b"]);
    assert!(state.newly_enabled_modules.is_empty());
}

#[tokio::test]
async fn newly_enabled_is_the_order_preserving_difference() {
    let pm = Arc::new(MockPackageManager::default());
    let executor = Arc::new(MockHookExecutor::new());
    executor.set_probe("b", ProbeBehavior::Reject);
    let (manager, _events) = test_manager(
        &[
            fixture("a", Toggle::On, false),
            fixture("b", Toggle::On, true),
            fixture("c", Toggle::On, false),
        ],
        pm,
        executor.clone(),
    );
    manager.init(ClusterConfig::default());

    let state = manager.discover_modules_state().await.unwrap();
    assert_eq!(state.newly_enabled_modules, vec!["a", "c"]);

    executor.set_probe("b", ProbeBehavior::Accept);
    let state = manager.discover_modules_state().await.unwrap();
    assert_eq!(state.enabled_modules, vec!["a", "b", "c"]);
    assert_eq!(state.newly_enabled_modules, vec!["b"]);

    // Invariants: disjointness of the result sets
    for name in &state.modules_to_disable {
        assert!(!state.enabled_modules.contains(name));
    }
    for name in &state.released_unknown_modules {
        assert!(manager.catalog().get(name).is_none());
    }
}

#[tokio::test]
async fn probe_failure_aborts_discovery() {
    let pm = Arc::new(MockPackageManager::default());
    let executor = Arc::new(MockHookExecutor::new());
    executor.set_probe("a", ProbeBehavior::Fail("boom".to_string()));
    let (manager, _events) = test_manager(&[fixture("a", Toggle::On, true)], pm, executor);
    manager.init(ClusterConfig::default());

    let err = manager.discover_modules_state().await.unwrap_err();
    assert!(err.to_string().contains("boom"));
    // Nothing was committed
    assert!(manager.module_names_in_order().is_empty());
}
