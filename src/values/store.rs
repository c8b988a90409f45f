// src/values/store.rs

//! The layered values store.
//!
//! Layers, lowest precedence first:
//! 1. common static values (shared defaults file, `global` + module sections)
//! 2. per-module static values (each module's defaults file)
//! 3. cluster config (global section + per-module sections)
//! 4. dynamic patches (hook-emitted, applied in arrival order)
//!
//! Merges and checksums are pure functions of the current layers. Patches
//! are validated by a dry run against the current snapshot before they are
//! retained; the store never contains a patch known to break.
//!
//! A single writer guards the layer maps; snapshots are built fresh per
//! call so readers never observe a half-applied update.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::debug;

use crate::error::{Error, Result};

use super::{checksum_hex, module_values_key, Values, ValuesPatch, GLOBAL_KEY};

/// Which slice of the tree a patch or checksum refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchScope {
    Global,
    Module(String),
}

impl std::fmt::Display for PatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchScope::Global => write!(f, "global"),
            PatchScope::Module(name) => write!(f, "module '{}'", name),
        }
    }
}

#[derive(Debug, Default)]
struct Layers {
    /// Shared defaults file: `global` section plus per-module sections
    common_static: Values,
    /// Each module's own defaults, keyed by module name
    module_static: BTreeMap<String, Values>,
    /// Global section of the cluster config document
    cluster_global: Values,
    /// Per-module sections of the cluster config, keyed by module name
    cluster_modules: BTreeMap<String, Values>,
    /// Dynamic global patches in arrival order
    global_patches: Vec<ValuesPatch>,
    /// Dynamic per-module patches in arrival order
    module_patches: BTreeMap<String, Vec<ValuesPatch>>,
}

/// Layered, checksum-comparable values store
#[derive(Debug, Default)]
pub struct ValuesStore {
    layers: RwLock<Layers>,
}

impl ValuesStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Static layers are set once at init, before the event loop starts.

    pub fn set_common_static(&self, values: Values) {
        self.layers.write().expect("values store lock").common_static = values;
    }

    pub fn set_module_static(&self, module: &str, values: Values) {
        self.layers
            .write()
            .expect("values store lock")
            .module_static
            .insert(module.to_string(), values);
    }

    // Cluster layers are replaced wholesale by the event loop.

    pub fn set_cluster_global(&self, values: Values) {
        self.layers.write().expect("values store lock").cluster_global = values;
    }

    pub fn set_cluster_modules(&self, sections: BTreeMap<String, Values>) {
        self.layers.write().expect("values store lock").cluster_modules = sections;
    }

    /// Whether the cluster config currently carries a section for `module`
    pub fn has_cluster_module(&self, module: &str) -> bool {
        self.layers
            .read()
            .expect("values store lock")
            .cluster_modules
            .contains_key(module)
    }

    /// Merged global snapshot: `{ "global": ... }` with global patches applied
    pub fn global_values(&self) -> Result<Values> {
        let layers = self.layers.read().expect("values store lock");
        Self::build_global(&layers)
    }

    /// Merged snapshot for one module: the shared `global` subtree plus the
    /// module's own section under its camelCase key, with the module's
    /// patches applied
    pub fn module_values(&self, module: &str) -> Result<Values> {
        let layers = self.layers.read().expect("values store lock");
        Self::build_module(&layers, module)
    }

    /// Validate and retain a dynamic patch. A patch that fails its dry run
    /// is rejected with a descriptive error and never stored.
    pub fn apply_patch(&self, scope: &PatchScope, patch: ValuesPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut layers = self.layers.write().expect("values store lock");
        match scope {
            PatchScope::Global => {
                let snapshot = Self::build_global(&layers)?;
                patch.apply_to(&snapshot).map_err(|e| {
                    Error::PatchInvalid(format!("global patch rejected: {}", e))
                })?;
                layers.global_patches.push(patch);
            }
            PatchScope::Module(name) => {
                let snapshot = Self::build_module(&layers, name)?;
                patch.apply_to(&snapshot).map_err(|e| {
                    Error::PatchInvalid(format!("patch for module '{}' rejected: {}", name, e))
                })?;
                layers.module_patches.entry(name.clone()).or_default().push(patch);
            }
        }
        debug!("retained dynamic patch for {} values", scope);
        Ok(())
    }

    /// Checksum of the current snapshot for a scope
    pub fn checksum(&self, scope: &PatchScope) -> Result<String> {
        let snapshot = match scope {
            PatchScope::Global => self.global_values()?,
            PatchScope::Module(name) => self.module_values(name)?,
        };
        Ok(checksum_hex(&snapshot))
    }

    fn build_global(layers: &Layers) -> Result<Values> {
        let global = Values::merged(&[
            &layers.common_static.section(GLOBAL_KEY),
            &layers.cluster_global,
        ]);
        let mut snapshot = Values::new();
        snapshot.insert(GLOBAL_KEY, global.into_value());
        for patch in &layers.global_patches {
            snapshot = patch.apply_to(&snapshot)?;
        }
        Ok(snapshot)
    }

    fn build_module(layers: &Layers, module: &str) -> Result<Values> {
        let mut snapshot = Self::build_global(layers)?;

        let key = module_values_key(module);
        let empty = Values::new();
        let section = Values::merged(&[
            &layers.common_static.section(&key),
            layers.module_static.get(module).unwrap_or(&empty),
            layers.cluster_modules.get(module).unwrap_or(&empty),
        ]);
        snapshot.insert(key, section.into_value());

        if let Some(patches) = layers.module_patches.get(module) {
            for patch in patches {
                snapshot = patch.apply_to(&snapshot)?;
            }
        }
        Ok(snapshot)
    }
}
