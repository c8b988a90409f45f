// src/manager/run.rs

//! Hook runner and the main event loop.
//!
//! The loop is the single owner of the enabled sets and the retry buffer.
//! It selects over five conflated inputs: internal global/module values
//! changes, full config replacements, module-section changes and retry
//! requests. Hook runs and discovery execute outside the loop through the
//! public API; their change notifications feed back in through the
//! conflated channels.

use std::collections::BTreeMap;

use tracing::{debug, error, info, warn};

use crate::config::{config_channel, ClusterConfig, ConfigSource, ModuleSections};
use crate::error::{Error, Result};
use crate::hooks::{Binding, BindingContext, HookRequest};
use crate::values::PatchScope;

use super::{enablement, Event, ModuleChange, ModuleManager};

impl ModuleManager {
    /// Run a global hook at a binding. Emitted patches land in the global
    /// values scope; if the values moved under an event-driven binding,
    /// re-reconciliation is triggered.
    pub async fn run_global_hook(
        &self,
        name: &str,
        binding: Binding,
        contexts: &[BindingContext],
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let hook = self.get_global_hook(name)?;
        let scope = PatchScope::Global;

        let before = self.store.checksum(&scope)?;
        let request = HookRequest {
            hook_name: hook.name.clone(),
            hook_path: hook.path.clone(),
            working_dir: self.config.global_hooks_dir.clone(),
            binding,
            contexts: contexts.to_vec(),
            values: self.store.global_values()?,
            labels: labels.clone(),
        };
        let output = self.executor.run_hook(&request, self.cancel_token()).await?;
        self.store.apply_patch(&scope, output.patch)?;

        let after = self.store.checksum(&scope)?;
        if after != before && binding.is_event_driven() {
            debug!("global values changed by hook '{}'", name);
            self.signals.global_values_changed.send(());
        }
        Ok(())
    }

    /// Run a module hook at a binding. Emitted patches land in the owning
    /// module's values scope.
    pub async fn run_module_hook(
        &self,
        name: &str,
        binding: Binding,
        contexts: &[BindingContext],
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let hook = self.get_module_hook(name)?;
        let module = self
            .catalog
            .by_index(hook.module_index)
            .ok_or_else(|| Error::ModuleHookNotFound(name.to_string()))?;
        let scope = PatchScope::Module(module.name.clone());

        let before = self.store.checksum(&scope)?;
        let request = HookRequest {
            hook_name: hook.name.clone(),
            hook_path: hook.path.clone(),
            working_dir: module.path.clone(),
            binding,
            contexts: contexts.to_vec(),
            values: self.store.module_values(&module.name)?,
            labels: labels.clone(),
        };
        let output = self.executor.run_hook(&request, self.cancel_token()).await?;
        self.store.apply_patch(&scope, output.patch)?;

        let after = self.store.checksum(&scope)?;
        if after != before && binding.is_event_driven() {
            debug!("values of module '{}' changed by hook '{}'", module.name, name);
            self.signals.module_values_changed.send(module.name.clone());
        }
        Ok(())
    }

    /// The event loop. Consumes the loop inputs; a second concurrent call
    /// fails with [`Error::AlreadyRunning`]. Returns when
    /// [`ModuleManager::shutdown`] is called.
    pub async fn run(&self, source: Box<dyn ConfigSource>) -> Result<()> {
        let mut inputs = self
            .loop_inputs
            .lock()
            .expect("loop inputs lock")
            .take()
            .ok_or(Error::AlreadyRunning)?;

        let mut shutdown = self.cancel_token();

        let (config_tx, mut config_rx) = config_channel();
        *self.sections_feed.lock().expect("sections feed lock") =
            Some(config_tx.sections.clone());
        source.start(config_tx, shutdown.clone());

        info!("module manager event loop started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = inputs.global_values_changed.recv() => {
                    debug!("global values changed");
                    self.events.publish(Event::GlobalChanged);
                }
                module = inputs.module_values_changed.recv() => {
                    debug!("values of module '{}' changed", module);
                    self.events.publish(Event::ModulesChanged(vec![ModuleChange::changed(module)]));
                }
                config = config_rx.replaced.recv() => {
                    self.handle_config_replaced(config);
                }
                sections = config_rx.sections.recv() => {
                    self.handle_module_sections(sections).await;
                }
                _ = inputs.retry.recv() => {
                    self.handle_retry();
                }
            }
        }

        *self.sections_feed.lock().expect("sections feed lock") = None;
        *self.loop_inputs.lock().expect("loop inputs lock") = Some(inputs);
        info!("module manager event loop stopped");
        Ok(())
    }

    /// Full config replacement: recompute the enabled-by-config set and
    /// all cluster values layers, then request a discovery pass
    fn handle_config_replaced(&self, config: ClusterConfig) {
        debug!("config document replaced");
        let (enabled_by_config, module_values, unknown) =
            self.calculate_enabled_by_config(&config.modules);
        for name in &unknown {
            warn!("ignoring config section for unknown module '{}'", name);
        }

        self.store.set_cluster_global(config.values);
        self.store.set_cluster_modules(module_values);
        self.state.write().expect("manager state lock").enabled_by_config = enabled_by_config;

        self.events.publish(Event::GlobalChanged);
    }

    /// Module-sections change: decide between a full discovery
    /// (`GlobalChanged`) and targeted module re-runs (`ModulesChanged`)
    async fn handle_module_sections(&self, sections: ModuleSections) {
        debug!("module sections changed: {:?}", sections.keys().collect::<Vec<_>>());

        // A fresh delivery supersedes any update saved before an error
        self.state.write().expect("manager state lock").retry_sections = None;

        let (enabled_by_config, module_values, unknown) =
            self.calculate_enabled_by_config(&sections);
        for name in &unknown {
            warn!("ignoring config section for unknown module '{}'", name);
        }

        // Statically enabled modules whose cluster section disappeared
        // change their effective values and must be signaled
        let update_after_removal: Vec<String> = self
            .catalog
            .iter()
            .filter(|module| {
                !sections.contains_key(&module.name)
                    && module.statically_enabled()
                    && self.store.has_cluster_module(&module.name)
            })
            .map(|module| module.name.clone())
            .collect();

        let effective = match enablement::resolve(
            &self.catalog,
            &self.store,
            self.executor.as_ref(),
            &enabled_by_config,
            self.cancel_token(),
        )
        .await
        {
            Ok(effective) => effective,
            Err(Error::Cancelled) => {
                // Shutdown mid-reconciliation; the loop exits on its next
                // iteration and the update is simply dropped
                debug!("module sections handling cancelled by shutdown");
                return;
            }
            Err(err) => {
                error!("cannot apply module sections update: {}", err);
                self.state.write().expect("manager state lock").retry_sections = Some(sections);
                self.events.publish(Event::AmbiguousState);
                return;
            }
        };

        let previous_effective = self.module_names_in_order();

        // Commit the new configuration state
        self.store.set_cluster_modules(module_values);
        self.state.write().expect("manager state lock").enabled_by_config = enabled_by_config;

        if effective != previous_effective {
            debug!(
                "effective enabled set changed {:?} -> {:?}",
                previous_effective, effective
            );
            self.events.publish(Event::GlobalChanged);
            return;
        }

        // Same enabled set: only values changed. Report every enabled
        // module whose section was updated or removed.
        let changes: Vec<ModuleChange> = effective
            .iter()
            .filter(|name| {
                sections.get(*name).map(|s| s.updated).unwrap_or(false)
                    || update_after_removal.contains(*name)
            })
            .map(|name| ModuleChange::changed(name.as_str()))
            .collect();

        if !changes.is_empty() {
            info!("module values updated for {} module(s)", changes.len());
            self.events.publish(Event::ModulesChanged(changes));
        }
    }

    /// Replay the saved module-sections update, if any
    fn handle_retry(&self) {
        let saved = self.state.write().expect("manager state lock").retry_sections.take();
        match saved {
            Some(sections) => {
                info!("retrying saved module sections update");
                if let Some(feed) = self.sections_feed.lock().expect("sections feed lock").as_ref()
                {
                    feed.send(sections);
                }
            }
            None => debug!("retry requested but nothing is saved"),
        }
    }
}
