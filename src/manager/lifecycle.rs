// src/manager/lifecycle.rs

//! Module lifecycle: install/upgrade and delete.
//!
//! For a module run, the ordering guarantee is: `beforeHelm` hooks, then
//! the package-manager upgrade, then `afterHelm` hooks. On delete, the
//! package-manager delete precedes the `afterDeleteHelm` hooks, and the
//! module's hook index entries are removed only after the whole delete
//! succeeded.

use std::collections::BTreeMap;
use std::io::Write;

use tracing::info;

use crate::error::Result;
use crate::hooks::{Binding, BindingContext};

use super::ModuleManager;

impl ModuleManager {
    /// Run one module: `onStartup` hooks (first run only), `beforeHelm`
    /// hooks, failed-revision cleanup, the chart upgrade, `afterHelm`
    /// hooks
    pub async fn run_module(
        &self,
        name: &str,
        on_startup: bool,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let module = self.get_module(name)?;
        info!(module = name, on_startup, "running module");

        if on_startup {
            self.run_module_binding(name, Binding::OnStartup, labels).await?;
        }

        self.run_module_binding(name, Binding::BeforeHelm, labels).await?;

        // A release whose very first deployment failed blocks upgrades;
        // purge it before installing again.
        self.package_manager
            .delete_single_failed_revision(name, self.cancel_token())
            .await?;

        let values_file = self.stage_module_values(name)?;
        self.package_manager
            .upgrade_release(
                name,
                &module.path,
                &[values_file.path().to_path_buf()],
                &[],
                &self.config.namespace,
                self.cancel_token(),
            )
            .await?;

        self.run_module_binding(name, Binding::AfterHelm, labels).await?;
        info!(module = name, "module run complete");
        Ok(())
    }

    /// Delete one module's release, run its `afterDeleteHelm` hooks, then
    /// drop its hook index entries
    pub async fn delete_module(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<()> {
        self.get_module(name)?;
        info!(module = name, "deleting module");

        self.package_manager.delete_release(name, self.cancel_token()).await?;
        self.run_module_binding(name, Binding::AfterDeleteHelm, labels).await?;

        self.registry.write().expect("hook registry lock").remove_module(name);
        info!(module = name, "module deleted");
        Ok(())
    }

    /// Run every hook of one module bound to `binding`, in order
    async fn run_module_binding(
        &self,
        module: &str,
        binding: Binding,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let hook_names = self.module_hooks_in_order(module, binding)?;
        for hook_name in hook_names {
            let context = vec![BindingContext::new(binding)];
            self.run_module_hook(&hook_name, binding, &context, labels).await?;
        }
        Ok(())
    }

    /// Write the module's merged values to a temp file for the package
    /// manager. The file lives as long as the returned handle.
    fn stage_module_values(&self, module: &str) -> Result<tempfile::NamedTempFile> {
        let values = self.store.module_values(module)?;
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&serde_json::to_vec(&values.as_value())?)?;
        file.flush()?;
        Ok(file)
    }
}
