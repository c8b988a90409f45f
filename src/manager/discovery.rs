// src/manager/discovery.rs

//! Modules-state discovery.
//!
//! Diffs the effective enabled set against the previously enabled set and
//! against the releases the package manager knows about, producing the
//! actions the outer operator executes: run enabled modules, disable
//! stale releases, purge releases no module claims.

use tracing::{debug, info};

use crate::error::Result;
use crate::hooks;

use super::{enablement, ModuleManager};

/// The outcome of one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModulesState {
    /// Effective enabled set, catalog order
    pub enabled_modules: Vec<String>,
    /// Known modules with a release but no longer enabled; reverse
    /// catalog order so nothing is torn down before its dependents
    pub modules_to_disable: Vec<String>,
    /// Releases that match no catalog module; reverse lexical order
    pub released_unknown_modules: Vec<String>,
    /// Modules enabled now that were not enabled before, in enabled order
    pub newly_enabled_modules: Vec<String>,
}

impl ModuleManager {
    /// Compute the current [`ModulesState`].
    ///
    /// Runs the enablement resolver over the current enabled-by-config
    /// set, registers hooks of newly effective modules, and commits the
    /// effective set as the new previously-enabled baseline.
    pub async fn discover_modules_state(&self) -> Result<ModulesState> {
        let catalog_names = self.catalog.names_in_order();

        let releases = self.package_manager.list_release_names(self.cancel_token()).await?;
        debug!("package manager reports releases: {:?}", releases);

        // Releases no catalog module claims are purged, newest name first
        let mut released_unknown = subtract(&releases, &catalog_names);
        released_unknown.sort_unstable();
        released_unknown.reverse();
        if !released_unknown.is_empty() {
            info!("found releases of unknown modules: {:?}", released_unknown);
        }
        let releases = intersect(&releases, &catalog_names);

        let enabled_by_config = self.enabled_by_config();
        let effective = enablement::resolve(
            &self.catalog,
            &self.store,
            self.executor.as_ref(),
            &enabled_by_config,
            self.cancel_token(),
        )
        .await?;
        info!("modules enabled after probes: {:?}", effective);

        self.register_new_module_hooks(&effective).await?;

        // Commit: the effective set becomes the baseline for the next diff
        let newly_enabled;
        {
            let mut state = self.state.write().expect("manager state lock");
            newly_enabled = subtract(&effective, &state.enabled);
            state.enabled = effective.clone();
        }

        let to_disable = self
            .catalog
            .reverse_sort_by_catalog(&intersect(&subtract(&catalog_names, &effective), &releases));

        let state = ModulesState {
            enabled_modules: effective,
            modules_to_disable: to_disable,
            released_unknown_modules: released_unknown,
            newly_enabled_modules: newly_enabled,
        };
        debug!("discovered state: {:?}", state);
        Ok(state)
    }

    /// Load and index hooks of effective modules that have none yet
    async fn register_new_module_hooks(&self, effective: &[String]) -> Result<()> {
        let missing: Vec<String> = {
            let registry = self.registry.read().expect("hook registry lock");
            effective
                .iter()
                .filter(|name| !registry.has_module(name.as_str()))
                .cloned()
                .collect()
        };

        for name in missing {
            let module = self.get_module(&name)?;
            let index = self.catalog.index_of(&name).unwrap_or_default();
            let loaded = hooks::load_module_hooks(
                &module,
                index,
                self.executor.as_ref(),
                self.cancel_token(),
            )
            .await?;
            debug!("registered {} hook(s) for module '{}'", loaded.len(), name);
            self.registry
                .write()
                .expect("hook registry lock")
                .register_module_hooks(&name, loaded);
        }
        Ok(())
    }
}

/// Order-preserving `a − b`
pub(crate) fn subtract(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|item| !b.contains(item)).cloned().collect()
}

/// Order-preserving `a ∩ b`
pub(crate) fn intersect(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|item| b.contains(item)).cloned().collect()
}
