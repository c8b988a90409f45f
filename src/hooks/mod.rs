// src/hooks/mod.rs

//! Hooks and the binding model.
//!
//! A hook is an executable invoked at typed lifecycle points or in
//! response to cluster events. Hooks declare their bindings themselves:
//! running a hook with `--config` prints a JSON declaration that is parsed
//! here into typed bindings with per-binding ordering keys.
//!
//! Global hooks may bind `onStartup`, `schedule`, `onKubernetesEvent`,
//! `beforeAll` and `afterAll`; module hooks may bind `onStartup`,
//! `schedule`, `onKubernetesEvent`, `beforeHelm`, `afterHelm` and
//! `afterDeleteHelm`.

pub mod executor;
pub mod registry;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::catalog::{scan, ModuleDef};
use crate::error::{Error, Result};

pub use executor::{HookExecutor, HookRequest, HookOutput, ProbeRequest, ShellHookExecutor};
pub use registry::HookRegistry;

/// The closed set of binding kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Binding {
    OnStartup,
    Schedule,
    KubeEvents,
    BeforeAll,
    AfterAll,
    BeforeHelm,
    AfterHelm,
    AfterDeleteHelm,
}

impl Binding {
    /// The name written into binding-context documents
    pub fn context_name(&self) -> &'static str {
        match self {
            Binding::OnStartup => "onStartup",
            Binding::Schedule => "schedule",
            Binding::KubeEvents => "onKubernetesEvent",
            Binding::BeforeAll => "beforeAll",
            Binding::AfterAll => "afterAll",
            Binding::BeforeHelm => "beforeHelm",
            Binding::AfterHelm => "afterHelm",
            Binding::AfterDeleteHelm => "afterDeleteHelm",
        }
    }

    /// Bindings that may only appear on global hooks
    pub fn global_only(&self) -> bool {
        matches!(self, Binding::BeforeAll | Binding::AfterAll)
    }

    /// Bindings that may only appear on module hooks
    pub fn module_only(&self) -> bool {
        matches!(
            self,
            Binding::BeforeHelm | Binding::AfterHelm | Binding::AfterDeleteHelm
        )
    }

    /// Event-driven bindings: a values change produced under one of these
    /// triggers re-reconciliation
    pub fn is_event_driven(&self) -> bool {
        matches!(self, Binding::Schedule | Binding::KubeEvents)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.context_name())
    }
}

/// A binding with its ordering key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookBinding {
    pub binding: Binding,
    pub order: i64,
}

/// Additional context passed to a hook run for one binding firing
#[derive(Debug, Clone, Serialize)]
pub struct BindingContext {
    pub binding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
}

impl BindingContext {
    pub fn new(binding: Binding) -> Self {
        Self {
            binding: binding.context_name().to_string(),
            event: None,
            object: None,
        }
    }
}

/// One schedule declaration of a hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub crontab: String,
    #[serde(default, rename = "allowFailure")]
    pub allow_failure: bool,
}

/// The JSON declaration a hook prints when run with `--config`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookConfigSpec {
    pub on_startup: Option<i64>,
    pub before_all: Option<i64>,
    pub after_all: Option<i64>,
    pub before_helm: Option<i64>,
    pub after_helm: Option<i64>,
    pub after_delete_helm: Option<i64>,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    /// Cluster-event subscriptions; opaque to the core, consumed by the
    /// event framework
    #[serde(default, rename = "onKubernetesEvent")]
    pub kube_events: Vec<serde_json::Value>,
}

impl HookConfigSpec {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Config(format!("invalid hook config declaration: {}", e)))
    }

    /// Typed bindings for a global hook; module-only bindings are rejected
    pub fn global_bindings(&self, hook_name: &str) -> Result<Vec<HookBinding>> {
        let bindings = self.bindings();
        for hb in &bindings {
            if hb.binding.module_only() {
                return Err(Error::Config(format!(
                    "global hook '{}' declares module-only binding '{}'",
                    hook_name, hb.binding
                )));
            }
        }
        Ok(bindings)
    }

    /// Typed bindings for a module hook; global-only bindings are rejected
    pub fn module_bindings(&self, hook_name: &str) -> Result<Vec<HookBinding>> {
        let bindings = self.bindings();
        for hb in &bindings {
            if hb.binding.global_only() {
                return Err(Error::Config(format!(
                    "module hook '{}' declares global-only binding '{}'",
                    hook_name, hb.binding
                )));
            }
        }
        Ok(bindings)
    }

    fn bindings(&self) -> Vec<HookBinding> {
        let mut out = Vec::new();
        let numeric = [
            (Binding::OnStartup, self.on_startup),
            (Binding::BeforeAll, self.before_all),
            (Binding::AfterAll, self.after_all),
            (Binding::BeforeHelm, self.before_helm),
            (Binding::AfterHelm, self.after_helm),
            (Binding::AfterDeleteHelm, self.after_delete_helm),
        ];
        for (binding, order) in numeric {
            if let Some(order) = order {
                out.push(HookBinding { binding, order });
            }
        }
        if !self.schedule.is_empty() {
            out.push(HookBinding { binding: Binding::Schedule, order: 0 });
        }
        if !self.kube_events.is_empty() {
            out.push(HookBinding { binding: Binding::KubeEvents, order: 0 });
        }
        out
    }
}

/// A hook owned by the operator itself rather than a module
#[derive(Debug, Clone)]
pub struct GlobalHook {
    pub name: String,
    pub path: PathBuf,
    pub bindings: Vec<HookBinding>,
    pub config: HookConfigSpec,
}

/// A hook owned by one module. The owning module is referenced by its
/// catalog index; the name of the module is resolved through the catalog.
#[derive(Debug, Clone)]
pub struct ModuleHook {
    pub name: String,
    pub path: PathBuf,
    pub module_index: usize,
    pub bindings: Vec<HookBinding>,
    pub config: HookConfigSpec,
}

/// Ordering key of a hook for one binding, if bound
pub fn binding_order(bindings: &[HookBinding], binding: Binding) -> Option<i64> {
    bindings.iter().find(|hb| hb.binding == binding).map(|hb| hb.order)
}

/// Load and self-configure every global hook under `dir`
pub async fn load_global_hooks(
    dir: &Path,
    executor: &dyn HookExecutor,
    cancel: watch::Receiver<bool>,
) -> Result<Vec<GlobalHook>> {
    let mut hooks = Vec::new();
    for path in scan::hook_files(dir)? {
        let name = relative_hook_name(dir, &path);
        let config = executor.hook_config(&path, cancel.clone()).await?;
        let bindings = config.global_bindings(&name)?;
        debug!("global hook '{}': {} binding(s)", name, bindings.len());
        hooks.push(GlobalHook { name, path, bindings, config });
    }
    Ok(hooks)
}

/// Load and self-configure every hook of one module
pub async fn load_module_hooks(
    module: &ModuleDef,
    module_index: usize,
    executor: &dyn HookExecutor,
    cancel: watch::Receiver<bool>,
) -> Result<Vec<ModuleHook>> {
    let hooks_dir = module.hooks_dir();
    let mut hooks = Vec::new();
    for path in scan::hook_files(&hooks_dir)? {
        let name = format!("{}/{}", module.name, relative_hook_name(&hooks_dir, &path));
        let config = executor.hook_config(&path, cancel.clone()).await?;
        let bindings = config.module_bindings(&name)?;
        debug!("module hook '{}': {} binding(s)", name, bindings.len());
        hooks.push(ModuleHook { name, path, module_index, bindings, config });
    }
    Ok(hooks)
}

fn relative_hook_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
