// src/manager/enablement.rs

//! The enablement resolver.
//!
//! Configuration says which modules *may* run; each candidate can carry
//! an enable-probe script with the final say. Probes run in catalog
//! order, and every probe observes the list of modules already accepted
//! ahead of it, so a module can condition itself on its predecessors.
//!
//! Any probe error aborts resolution with no partial commit; the caller
//! decides whether to latch the failed input for retry.

use tokio::sync::watch;
use tracing::debug;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::hooks::{HookExecutor, ProbeRequest};
use crate::values::ValuesStore;

/// Resolve the effective enabled set from the enabled-by-config set.
///
/// The result is a subsequence of the catalog order and a subset of
/// `enabled_by_config`.
pub(crate) async fn resolve(
    catalog: &Catalog,
    store: &ValuesStore,
    executor: &dyn HookExecutor,
    enabled_by_config: &[String],
    cancel: watch::Receiver<bool>,
) -> Result<Vec<String>> {
    let mut enabled: Vec<String> = Vec::new();

    for name in catalog.sort_by_catalog(enabled_by_config) {
        let Some(module) = catalog.get(&name) else {
            continue;
        };

        let accepted = match &module.enabled_script {
            None => true,
            Some(script) => {
                let request = ProbeRequest {
                    module: name.clone(),
                    script: script.clone(),
                    working_dir: module.path.clone(),
                    enabled: enabled.clone(),
                    values: store.module_values(&name)?,
                };
                executor.run_enabled_probe(&request, cancel.clone()).await?
            }
        };

        if accepted {
            enabled.push(name);
        } else {
            debug!("module '{}' rejected by its enable probe", name);
        }
    }

    debug!("effective enabled set: {:?}", enabled);
    Ok(enabled)
}
