// src/manager/mod.rs

//! The module manager: the controller core.
//!
//! Owns the catalog, the layered values store, the hook registry and the
//! enabled-set state. A single event-loop task ([`ModuleManager::run`])
//! performs all mutations of the enabled sets and the retry buffer;
//! read-only accessors are callable from any task. The package manager,
//! the config source and the hook execution framework are injected at
//! construction.

mod discovery;
mod enablement;
mod events;
mod lifecycle;
mod run;

pub use discovery::ModulesState;
pub use events::{event_channel, ChangeType, Event, EventPublisher, EventReceiver, ModuleChange};

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::catalog::{scan, Catalog, ModuleDef};
use crate::config::{ClusterConfig, ModuleSections, Toggle};
use crate::conflate;
use crate::error::{Error, Result};
use crate::hooks::{self, Binding, GlobalHook, HookExecutor, HookRegistry, ModuleHook};
use crate::release::PackageManager;
use crate::values::{Values, ValuesStore};

/// Static settings of the controller
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory holding the module catalog (`MODULES_DIR`)
    pub modules_dir: PathBuf,
    /// Directory holding global hooks (`GLOBAL_HOOKS_DIR`)
    pub global_hooks_dir: PathBuf,
    /// Namespace releases are deployed into
    pub namespace: String,
}

/// Mutable state owned by the event loop
#[derive(Debug, Default)]
struct ManagerState {
    /// Modules enabled by static config plus cluster config, catalog order
    enabled_by_config: Vec<String>,
    /// Effective enabled set: enabled by config and accepted by probes.
    /// Committed by discovery.
    enabled: Vec<String>,
    /// Module sections saved before an ambiguous reconciliation, replayed
    /// by `retry`
    retry_sections: Option<ModuleSections>,
}

/// Internal change-notification senders used by the hook runner
pub(crate) struct Signals {
    pub global_values_changed: conflate::Sender<()>,
    pub module_values_changed: conflate::Sender<String>,
    pub retry: conflate::Sender<()>,
}

/// Receiver ends consumed once by the event loop
pub(crate) struct LoopInputs {
    pub global_values_changed: conflate::Receiver<()>,
    pub module_values_changed: conflate::Receiver<String>,
    pub retry: conflate::Receiver<()>,
}

pub struct ModuleManager {
    config: ManagerConfig,
    catalog: Catalog,
    store: ValuesStore,
    registry: RwLock<HookRegistry>,
    state: RwLock<ManagerState>,
    package_manager: Arc<dyn PackageManager>,
    executor: Arc<dyn HookExecutor>,
    events: EventPublisher,
    signals: Signals,
    loop_inputs: Mutex<Option<LoopInputs>>,
    /// Sender of the module-sections stream, present while the loop runs;
    /// `retry` re-feeds the saved sections through it
    sections_feed: Mutex<Option<conflate::Sender<ModuleSections>>>,
    /// Shutdown flag; clones of the receiver are the cancellation tokens
    /// passed into every collaborator call
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ModuleManager {
    /// Build a manager over a prepared catalog
    pub fn new(
        catalog: Catalog,
        common_static: Values,
        config: ManagerConfig,
        package_manager: Arc<dyn PackageManager>,
        executor: Arc<dyn HookExecutor>,
    ) -> (Self, EventReceiver) {
        let store = ValuesStore::new();
        store.set_common_static(common_static);
        for module in catalog.iter() {
            store.set_module_static(&module.name, module.static_values.clone());
        }

        let (events, events_rx) = event_channel();
        let (global_tx, global_rx) = conflate::channel();
        let (module_tx, module_rx) = conflate::channel();
        let (retry_tx, retry_rx) = conflate::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let manager = Self {
            config,
            catalog,
            store,
            registry: RwLock::new(HookRegistry::new()),
            state: RwLock::new(ManagerState::default()),
            package_manager,
            executor,
            events,
            signals: Signals {
                global_values_changed: global_tx,
                module_values_changed: module_tx,
                retry: retry_tx,
            },
            loop_inputs: Mutex::new(Some(LoopInputs {
                global_values_changed: global_rx,
                module_values_changed: module_rx,
                retry: retry_rx,
            })),
            sections_feed: Mutex::new(None),
            shutdown_tx,
            shutdown_rx,
        };
        (manager, events_rx)
    }

    /// Request shutdown: the event loop returns, and every in-flight
    /// collaborator call observes its cancellation token and ends with
    /// `Error::Cancelled`.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// A cancellation token for one external call
    pub(crate) fn cancel_token(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Build a manager by scanning the configured directories: module
    /// catalog from `modules_dir`, global hooks from `global_hooks_dir`
    pub async fn from_filesystem(
        config: ManagerConfig,
        package_manager: Arc<dyn PackageManager>,
        executor: Arc<dyn HookExecutor>,
    ) -> Result<(Self, EventReceiver)> {
        let scanned = scan::scan_modules_dir(&config.modules_dir)?;
        let (manager, events_rx) = Self::new(
            scanned.catalog,
            scanned.common_static,
            config,
            package_manager,
            executor,
        );
        manager.register_global_hooks().await?;
        Ok((manager, events_rx))
    }

    /// Load every global hook from the global hooks directory and index it
    pub async fn register_global_hooks(&self) -> Result<()> {
        let hooks = hooks::load_global_hooks(
            &self.config.global_hooks_dir,
            self.executor.as_ref(),
            self.cancel_token(),
        )
        .await?;
        let mut registry = self.registry.write().expect("hook registry lock");
        for hook in hooks {
            debug!("registered global hook '{}'", hook.name);
            registry.register_global(hook);
        }
        Ok(())
    }

    /// Index a single global hook. Exposed for embedders that supply
    /// hooks without a filesystem scan.
    pub fn register_global_hook(&self, hook: GlobalHook) {
        self.registry.write().expect("hook registry lock").register_global(hook);
    }

    /// Index hooks for one module directly, replacing any previous entry.
    /// The filesystem-scan path registers module hooks during discovery;
    /// this is for embedders that supply hooks themselves.
    pub fn register_module_hooks(&self, module: &str, hooks: Vec<ModuleHook>) {
        self.registry
            .write()
            .expect("hook registry lock")
            .register_module_hooks(module, hooks);
    }

    /// Apply the initial configuration document: cluster values layers and
    /// the enabled-by-config set
    pub fn init(&self, initial: ClusterConfig) {
        let (enabled_by_config, module_values, unknown) =
            self.calculate_enabled_by_config(&initial.modules);
        if !unknown.is_empty() {
            warn!("config document has values for absent modules: {:?}", unknown);
        }

        self.store.set_cluster_global(initial.values);
        self.store.set_cluster_modules(module_values);
        self.state.write().expect("manager state lock").enabled_by_config = enabled_by_config;
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn values_store(&self) -> &ValuesStore {
        &self.store
    }

    /// The indexed module, or a not-found error
    pub fn get_module(&self, name: &str) -> Result<ModuleDef> {
        self.catalog
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }

    /// The effective enabled set, in catalog order
    pub fn module_names_in_order(&self) -> Vec<String> {
        self.state.read().expect("manager state lock").enabled.clone()
    }

    /// Modules enabled by configuration, before probes
    pub fn enabled_by_config(&self) -> Vec<String> {
        self.state.read().expect("manager state lock").enabled_by_config.clone()
    }

    pub fn get_global_hook(&self, name: &str) -> Result<GlobalHook> {
        self.registry
            .read()
            .expect("hook registry lock")
            .global_hook(name)
            .cloned()
            .ok_or_else(|| Error::GlobalHookNotFound(name.to_string()))
    }

    pub fn get_module_hook(&self, name: &str) -> Result<ModuleHook> {
        self.registry
            .read()
            .expect("hook registry lock")
            .module_hook(name)
            .cloned()
            .ok_or_else(|| Error::ModuleHookNotFound(name.to_string()))
    }

    /// Global hook names bound to `binding`, in execution order
    pub fn global_hooks_in_order(&self, binding: Binding) -> Vec<String> {
        self.registry
            .read()
            .expect("hook registry lock")
            .global_hooks_in_order(binding)
    }

    /// Module hook names bound to `binding`, in execution order. Unknown
    /// modules are an error; a known module without hooks is empty.
    pub fn module_hooks_in_order(&self, module: &str, binding: Binding) -> Result<Vec<String>> {
        if !self.catalog.contains(module) {
            return Err(Error::ModuleNotFound(module.to_string()));
        }
        Ok(self
            .registry
            .read()
            .expect("hook registry lock")
            .module_hooks_in_order(module, binding))
    }

    /// Replay the module-sections update saved before an ambiguous
    /// reconciliation. Non-blocking; repeated calls coalesce.
    pub fn retry(&self) {
        self.signals.retry.send(());
    }

    /// Determine the enabled-by-config set and per-module cluster values
    /// from module sections. Returns `(enabled, values, unknown)`;
    /// `enabled` comes out in catalog order.
    pub(crate) fn calculate_enabled_by_config(
        &self,
        sections: &ModuleSections,
    ) -> (
        Vec<String>,
        std::collections::BTreeMap<String, Values>,
        Vec<String>,
    ) {
        let mut enabled = Vec::new();
        let mut values = std::collections::BTreeMap::new();

        for module in self.catalog.iter() {
            match sections.get(&module.name) {
                Some(section) => {
                    let is_enabled = Toggle::resolve(&[
                        module.common_static_enabled,
                        module.static_enabled,
                        section.enabled,
                    ]);
                    debug!(
                        "module '{}': static {}/{}, cluster {} -> {}",
                        module.name,
                        module.common_static_enabled,
                        module.static_enabled,
                        section.enabled,
                        is_enabled
                    );
                    if is_enabled {
                        enabled.push(module.name.clone());
                        values.insert(module.name.clone(), section.values.clone());
                    }
                }
                None => {
                    if module.statically_enabled() {
                        enabled.push(module.name.clone());
                    }
                }
            }
        }

        let unknown: Vec<String> = sections
            .keys()
            .filter(|name| !self.catalog.contains(name.as_str()))
            .cloned()
            .collect();

        (enabled, values, unknown)
    }
}
