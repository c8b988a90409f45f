// tests/lifecycle.rs

//! Module lifecycle ordering: hooks around the package-manager upgrade
//! and delete, failed-revision hygiene.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{
    fixture, journal, never_cancelled, test_manager, MockHookExecutor, MockPackageManager,
};
use helmsman::hooks::HookBinding;
use helmsman::release::PackageManager;
use helmsman::{Binding, ClusterConfig, ModuleHook, ReleaseState, ReleaseStatus, Toggle};

fn module_hook(name: &str, binding: Binding, order: i64) -> ModuleHook {
    ModuleHook {
        name: name.to_string(),
        path: format!("/modules/010-m/hooks/{}", name).into(),
        module_index: 0,
        bindings: vec![HookBinding { binding, order }],
        config: Default::default(),
    }
}

#[tokio::test]
async fn run_module_orders_hooks_around_the_upgrade() {
    let log = journal();
    let pm = Arc::new(MockPackageManager::with_journal(log.clone()));
    let executor = Arc::new(MockHookExecutor::with_journal(log.clone()));
    let (manager, _events) = test_manager(&[fixture("m", Toggle::On, false)], pm, executor);
    manager.init(ClusterConfig::default());

    manager.register_module_hooks(
        "m",
        vec![
            module_hook("m/20-post.sh", Binding::AfterHelm, 20),
            module_hook("m/10-pre.sh", Binding::BeforeHelm, 10),
            module_hook("m/05-startup.sh", Binding::OnStartup, 5),
            module_hook("m/15-pre.sh", Binding::BeforeHelm, 15),
        ],
    );

    manager.run_module("m", true, &BTreeMap::new()).await.unwrap();

    assert_eq!(
        log.lock().unwrap().clone(),
        vec![
            "hook m/05-startup.sh onStartup",
            "hook m/10-pre.sh beforeHelm",
            "hook m/15-pre.sh beforeHelm",
            "upgrade m",
            "hook m/20-post.sh afterHelm",
        ]
    );
}

#[tokio::test]
async fn run_module_without_startup_skips_startup_hooks() {
    let log = journal();
    let pm = Arc::new(MockPackageManager::with_journal(log.clone()));
    let executor = Arc::new(MockHookExecutor::with_journal(log.clone()));
    let (manager, _events) = test_manager(&[fixture("m", Toggle::On, false)], pm, executor);
    manager.init(ClusterConfig::default());

    manager.register_module_hooks(
        "m",
        vec![module_hook("m/05-startup.sh", Binding::OnStartup, 5)],
    );

    manager.run_module("m", false, &BTreeMap::new()).await.unwrap();
    assert_eq!(log.lock().unwrap().clone(), vec!["upgrade m"]);
}

#[tokio::test]
async fn delete_module_runs_cleanup_hooks_after_the_delete() {
    let log = journal();
    let pm = Arc::new(MockPackageManager::with_journal(log.clone()));
    let executor = Arc::new(MockHookExecutor::with_journal(log.clone()));
    let (manager, _events) = test_manager(&[fixture("m", Toggle::On, false)], pm, executor);
    manager.init(ClusterConfig::default());

    manager.register_module_hooks(
        "m",
        vec![module_hook("m/cleanup.sh", Binding::AfterDeleteHelm, 1)],
    );

    manager.delete_module("m", &BTreeMap::new()).await.unwrap();

    assert_eq!(
        log.lock().unwrap().clone(),
        vec!["delete m", "hook m/cleanup.sh afterDeleteHelm"]
    );
    // Hook index entries are gone only now that the delete succeeded
    assert!(manager.get_module_hook("m/cleanup.sh").is_err());
}

#[tokio::test]
async fn failed_first_revision_is_purged_before_the_upgrade() {
    let log = journal();
    let pm = Arc::new(MockPackageManager::with_journal(log.clone()));
    pm.statuses.lock().unwrap().insert(
        "m".to_string(),
        ReleaseStatus { revision: 1, status: ReleaseState::Failed },
    );
    let executor = Arc::new(MockHookExecutor::with_journal(log.clone()));
    let (manager, _events) = test_manager(&[fixture("m", Toggle::On, false)], pm, executor);
    manager.init(ClusterConfig::default());

    manager.run_module("m", false, &BTreeMap::new()).await.unwrap();
    assert_eq!(log.lock().unwrap().clone(), vec!["delete m", "upgrade m"]);
}

#[tokio::test]
async fn later_failed_revisions_are_kept_on_run() {
    let log = journal();
    let pm = Arc::new(MockPackageManager::with_journal(log.clone()));
    pm.statuses.lock().unwrap().insert(
        "m".to_string(),
        ReleaseStatus { revision: 4, status: ReleaseState::Failed },
    );
    let executor = Arc::new(MockHookExecutor::with_journal(log.clone()));
    let (manager, _events) = test_manager(&[fixture("m", Toggle::On, false)], pm, executor);
    manager.init(ClusterConfig::default());

    manager.run_module("m", false, &BTreeMap::new()).await.unwrap();
    // Revision 4 stays as evidence; only the upgrade runs
    assert_eq!(log.lock().unwrap().clone(), vec!["upgrade m"]);
}

#[tokio::test]
async fn old_failed_revision_records_keep_the_newest() {
    let pm = MockPackageManager::default();
    pm.failed_records.lock().unwrap().insert(
        "m".to_string(),
        vec!["m.v1".to_string(), "m.v3".to_string(), "m.v2".to_string()],
    );

    pm.delete_old_failed_revisions("m", never_cancelled()).await.unwrap();
    assert_eq!(pm.calls(), vec!["delete-record m.v1", "delete-record m.v2"]);
}

#[tokio::test]
async fn run_module_for_unknown_module_is_not_found() {
    let pm = Arc::new(MockPackageManager::default());
    let executor = Arc::new(MockHookExecutor::new());
    let (manager, _events) = test_manager(&[fixture("m", Toggle::On, false)], pm, executor);
    manager.init(ClusterConfig::default());

    let err = manager.run_module("ghost", false, &BTreeMap::new()).await.unwrap_err();
    assert!(matches!(err, helmsman::Error::ModuleNotFound(_)));
}
