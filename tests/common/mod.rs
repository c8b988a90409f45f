// tests/common/mod.rs

//! Shared test utilities: mock collaborators and fixture builders.

// Not every test binary uses every helper here.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use helmsman::catalog::{module_def, Catalog, ModuleDef};
use helmsman::config::ConfigTx;
use helmsman::hooks::{HookConfigSpec, HookOutput, HookRequest, ProbeRequest};
use helmsman::{
    ClusterConfig, ConfigSource, Error, Event, EventReceiver, HookExecutor, ManagerConfig,
    ModuleManager, PackageManager, ReleaseStatus, Result, Toggle, Values, ValuesPatch,
};

/// Shared operation journal; both mocks append so tests can assert the
/// interleaving of hook runs and package-manager calls
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// A cancellation token that never fires, for driving trait methods
/// directly in tests
pub fn never_cancelled() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    drop(tx);
    rx
}

/// Package manager test double backed by in-memory release lists
#[derive(Default)]
pub struct MockPackageManager {
    pub releases: Mutex<Vec<String>>,
    pub statuses: Mutex<HashMap<String, ReleaseStatus>>,
    pub failed_records: Mutex<HashMap<String, Vec<String>>>,
    /// Operation log: "upgrade ingress", "delete zombie", ...
    pub calls: Mutex<Vec<String>>,
    journal: Option<Journal>,
}

impl MockPackageManager {
    pub fn with_releases(names: &[&str]) -> Self {
        Self {
            releases: Mutex::new(names.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self { journal: Some(journal), ..Self::default() }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(entry.clone());
        }
        self.calls.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl PackageManager for MockPackageManager {
    async fn list_release_names(&self, _cancel: watch::Receiver<bool>) -> Result<Vec<String>> {
        Ok(self.releases.lock().unwrap().clone())
    }

    async fn last_release_status(
        &self,
        release: &str,
        _cancel: watch::Receiver<bool>,
    ) -> Result<ReleaseStatus> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(release)
            .cloned()
            .unwrap_or_else(ReleaseStatus::absent))
    }

    async fn upgrade_release(
        &self,
        release: &str,
        _chart: &Path,
        _value_files: &[PathBuf],
        _set_args: &[String],
        _namespace: &str,
        _cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        self.record(format!("upgrade {}", release));
        self.releases.lock().unwrap().push(release.to_string());
        Ok(())
    }

    async fn delete_release(&self, release: &str, _cancel: watch::Receiver<bool>) -> Result<()> {
        self.record(format!("delete {}", release));
        self.releases.lock().unwrap().retain(|r| r != release);
        Ok(())
    }

    async fn get_release_values(
        &self,
        _release: &str,
        _cancel: watch::Receiver<bool>,
    ) -> Result<Values> {
        Ok(Values::new())
    }

    async fn list_failed_revision_records(
        &self,
        release: &str,
        _cancel: watch::Receiver<bool>,
    ) -> Result<Vec<String>> {
        Ok(self
            .failed_records
            .lock()
            .unwrap()
            .get(release)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_revision_record(
        &self,
        record: &str,
        _cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        self.record(format!("delete-record {}", record));
        Ok(())
    }
}

/// How a module's enable probe behaves under the mock executor
#[derive(Debug, Clone)]
pub enum ProbeBehavior {
    Accept,
    Reject,
    Fail(String),
}

/// Hook executor test double: scripted probe verdicts, canned hook
/// configs and patches, full invocation recording
#[derive(Default)]
pub struct MockHookExecutor {
    pub probe_behavior: Mutex<HashMap<String, ProbeBehavior>>,
    /// Probe invocations: (module, enabled prefix observed)
    pub probe_runs: Mutex<Vec<(String, Vec<String>)>>,
    /// Hook config per hook path
    pub hook_configs: Mutex<HashMap<PathBuf, HookConfigSpec>>,
    /// Patch emitted per hook name
    pub hook_patches: Mutex<HashMap<String, ValuesPatch>>,
    /// Hook invocations: (hook name, binding name)
    pub hook_runs: Mutex<Vec<(String, String)>>,
    journal: Option<Journal>,
}

impl MockHookExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self { journal: Some(journal), ..Self::default() }
    }

    pub fn set_probe(&self, module: &str, behavior: ProbeBehavior) {
        self.probe_behavior
            .lock()
            .unwrap()
            .insert(module.to_string(), behavior);
    }

    pub fn set_patch(&self, hook: &str, patch: ValuesPatch) {
        self.hook_patches.lock().unwrap().insert(hook.to_string(), patch);
    }

    pub fn probe_runs(&self) -> Vec<(String, Vec<String>)> {
        self.probe_runs.lock().unwrap().clone()
    }

    pub fn hook_runs(&self) -> Vec<(String, String)> {
        self.hook_runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl HookExecutor for MockHookExecutor {
    async fn hook_config(
        &self,
        path: &Path,
        _cancel: watch::Receiver<bool>,
    ) -> Result<HookConfigSpec> {
        Ok(self
            .hook_configs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn run_hook(
        &self,
        req: &HookRequest,
        _cancel: watch::Receiver<bool>,
    ) -> Result<HookOutput> {
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .unwrap()
                .push(format!("hook {} {}", req.hook_name, req.binding));
        }
        self.hook_runs
            .lock()
            .unwrap()
            .push((req.hook_name.clone(), req.binding.to_string()));
        let patch = self
            .hook_patches
            .lock()
            .unwrap()
            .get(&req.hook_name)
            .cloned()
            .unwrap_or_default();
        Ok(HookOutput { patch })
    }

    async fn run_enabled_probe(
        &self,
        req: &ProbeRequest,
        _cancel: watch::Receiver<bool>,
    ) -> Result<bool> {
        self.probe_runs
            .lock()
            .unwrap()
            .push((req.module.clone(), req.enabled.clone()));
        let behavior = self
            .probe_behavior
            .lock()
            .unwrap()
            .get(&req.module)
            .cloned()
            .unwrap_or(ProbeBehavior::Accept);
        match behavior {
            ProbeBehavior::Accept => Ok(true),
            ProbeBehavior::Reject => Ok(false),
            ProbeBehavior::Fail(reason) => {
                Err(Error::Enablement { module: req.module.clone(), reason })
            }
        }
    }
}

/// Catalog fixture entry: name, static enabled flag, probe attached
pub struct FixtureModule {
    pub name: &'static str,
    pub static_enabled: Toggle,
    pub with_probe: bool,
}

pub fn fixture(name: &'static str, static_enabled: Toggle, with_probe: bool) -> FixtureModule {
    FixtureModule { name, static_enabled, with_probe }
}

/// Build a catalog out of fixture entries, orders 10, 20, 30, ...
pub fn test_catalog(entries: &[FixtureModule]) -> Catalog {
    let modules: Vec<ModuleDef> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let mut def = module_def(
                entry.name,
                (i as u32 + 1) * 10,
                Path::new(&format!("/modules/{:03}-{}", (i + 1) * 10, entry.name)),
            );
            def.static_enabled = entry.static_enabled;
            if entry.with_probe {
                def.enabled_script = Some(def.path.join("enabled"));
            }
            def
        })
        .collect();
    Catalog::new(modules).unwrap()
}

/// Build a manager over a fixture catalog with the given collaborators
pub fn test_manager(
    entries: &[FixtureModule],
    package_manager: Arc<MockPackageManager>,
    executor: Arc<MockHookExecutor>,
) -> (Arc<ModuleManager>, EventReceiver) {
    let config = ManagerConfig {
        modules_dir: PathBuf::from("/modules"),
        global_hooks_dir: PathBuf::from("/global-hooks"),
        namespace: "addons".to_string(),
    };
    let (manager, events) = ModuleManager::new(
        test_catalog(entries),
        Values::new(),
        config,
        package_manager,
        executor,
    );
    (Arc::new(manager), events)
}

/// Config source that hands its update channel to the test
pub struct TestConfigSource {
    initial: ClusterConfig,
    tx_slot: Arc<Mutex<Option<ConfigTx>>>,
}

impl TestConfigSource {
    pub fn new(initial: ClusterConfig) -> (Self, Arc<Mutex<Option<ConfigTx>>>) {
        let tx_slot = Arc::new(Mutex::new(None));
        (Self { initial, tx_slot: tx_slot.clone() }, tx_slot)
    }
}

impl ConfigSource for TestConfigSource {
    fn initial(&mut self) -> Result<ClusterConfig> {
        Ok(self.initial.clone())
    }

    fn start(self: Box<Self>, tx: ConfigTx, _shutdown: watch::Receiver<bool>) {
        *self.tx_slot.lock().unwrap() = Some(tx);
    }
}

/// Feed a full config replacement into the running loop
pub fn send_replaced(slot: &Arc<Mutex<Option<ConfigTx>>>, config: ClusterConfig) {
    slot.lock()
        .unwrap()
        .as_ref()
        .expect("event loop not started")
        .replaced
        .send(config);
}

/// Feed a module-sections update into the running loop
pub fn send_sections(
    slot: &Arc<Mutex<Option<ConfigTx>>>,
    sections: helmsman::config::ModuleSections,
) {
    slot.lock()
        .unwrap()
        .as_ref()
        .expect("event loop not started")
        .sections
        .send(sections);
}

/// Wait for the config channel to be handed over by the running loop
pub async fn wait_for_tx(slot: &Arc<Mutex<Option<ConfigTx>>>) {
    for _ in 0..100 {
        if slot.lock().unwrap().is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("event loop did not start");
}

/// Receive the next event or fail the test after a timeout
pub async fn recv_event(events: &mut EventReceiver) -> Event {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
}

/// Give the loop a moment to process conflated inputs
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
