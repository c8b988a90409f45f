// src/commands.rs
//! Command handlers for the helmsman CLI

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use helmsman::{
    Binding, ClusterConfig, ConfigSource, Event, FileConfigSource, HelmCli, ManagerConfig,
    ModuleManager, PatchScope, ShellHookExecutor, StaticConfigSource,
};

/// Settings shared by all commands
pub struct Settings {
    pub modules_dir: PathBuf,
    pub global_hooks_dir: PathBuf,
    pub namespace: String,
    pub config_doc: Option<PathBuf>,
}

impl Settings {
    fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            modules_dir: self.modules_dir.clone(),
            global_hooks_dir: self.global_hooks_dir.clone(),
            namespace: self.namespace.clone(),
        }
    }

    fn config_source(&self) -> Box<dyn ConfigSource> {
        match &self.config_doc {
            Some(path) => Box::new(FileConfigSource::new(path.clone())),
            None => Box::new(StaticConfigSource::new(ClusterConfig::default())),
        }
    }
}

/// Build the manager with the shipped collaborators and apply the initial
/// configuration
async fn build_manager(
    settings: &Settings,
) -> Result<(ModuleManager, helmsman::EventReceiver, Box<dyn ConfigSource>)> {
    let package_manager = Arc::new(HelmCli::new(settings.namespace.clone()));
    let executor = Arc::new(ShellHookExecutor::new());

    let (manager, events) =
        ModuleManager::from_filesystem(settings.manager_config(), package_manager, executor)
            .await
            .context("failed to build module manager")?;

    let mut source = settings.config_source();
    let initial = source.initial().context("failed to read initial config")?;
    manager.init(initial);

    Ok((manager, events, source))
}

/// Start the controller event loop and react to published events
pub async fn run(settings: Settings) -> Result<()> {
    let (manager, mut events, source) = build_manager(&settings).await?;
    let manager = Arc::new(manager);

    let state = manager.discover_modules_state().await?;
    info!(
        "initial state: {} enabled, {} to disable, {} to purge",
        state.enabled_modules.len(),
        state.modules_to_disable.len(),
        state.released_unknown_modules.len()
    );

    let loop_manager = manager.clone();
    let loop_handle = tokio::spawn(async move { loop_manager.run(source).await });

    let consumer_manager = manager.clone();
    let consumer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Event::GlobalChanged => {
                    info!("global configuration changed; running discovery");
                    match consumer_manager.discover_modules_state().await {
                        Ok(state) => info!(
                            "discovery: enabled {:?}, to disable {:?}, to purge {:?}",
                            state.enabled_modules,
                            state.modules_to_disable,
                            state.released_unknown_modules
                        ),
                        Err(err) => warn!("discovery failed: {}", err),
                    }
                }
                Event::ModulesChanged(changes) => {
                    for change in changes {
                        info!("module '{}' changed", change.name);
                    }
                }
                Event::AmbiguousState => {
                    warn!("ambiguous state; waiting for a config update or retry");
                }
            }
        }
    });

    tokio::signal::ctrl_c().await.context("cannot listen for shutdown signal")?;
    info!("shutdown requested");
    manager.shutdown();

    loop_handle.await.context("event loop task panicked")??;
    consumer.abort();
    Ok(())
}

/// One-shot discovery printout
pub async fn discover(settings: Settings) -> Result<()> {
    let (manager, _events, _source) = build_manager(&settings).await?;
    let state = manager.discover_modules_state().await?;

    println!("Enabled modules ({}):", state.enabled_modules.len());
    for name in &state.enabled_modules {
        let newly = state.newly_enabled_modules.contains(name);
        println!("  {}{}", name, if newly { "  [new]" } else { "" });
    }
    if !state.modules_to_disable.is_empty() {
        println!("To disable (in order):");
        for name in &state.modules_to_disable {
            println!("  {}", name);
        }
    }
    if !state.released_unknown_modules.is_empty() {
        println!("Unknown releases to purge (in order):");
        for name in &state.released_unknown_modules {
            println!("  {}", name);
        }
    }
    Ok(())
}

/// Print merged values and checksum for "global" or one module
pub async fn values(scope: &str, settings: Settings) -> Result<()> {
    let (manager, _events, _source) = build_manager(&settings).await?;

    let (snapshot, patch_scope) = if scope == "global" {
        (manager.values_store().global_values()?, PatchScope::Global)
    } else {
        manager.get_module(scope)?;
        (
            manager.values_store().module_values(scope)?,
            PatchScope::Module(scope.to_string()),
        )
    };

    println!("{}", serde_json::to_string_pretty(&snapshot.as_value())?);
    println!("# checksum: {}", manager.values_store().checksum(&patch_scope)?);
    Ok(())
}

/// List registered hooks per binding
pub async fn hooks(module: Option<&str>, settings: Settings) -> Result<()> {
    let (manager, _events, _source) = build_manager(&settings).await?;

    let bindings = [
        Binding::OnStartup,
        Binding::BeforeAll,
        Binding::AfterAll,
        Binding::BeforeHelm,
        Binding::AfterHelm,
        Binding::AfterDeleteHelm,
        Binding::Schedule,
        Binding::KubeEvents,
    ];

    match module {
        None => {
            println!("Global hooks:");
            for binding in bindings {
                let names = manager.global_hooks_in_order(binding);
                if !names.is_empty() {
                    println!("  {}: {}", binding, names.join(", "));
                }
            }
        }
        Some(module) => {
            // Module hooks register at discovery; run it so the index is
            // populated
            manager.discover_modules_state().await?;
            println!("Hooks of module '{}':", module);
            for binding in bindings {
                let names = manager.module_hooks_in_order(module, binding)?;
                if !names.is_empty() {
                    println!("  {}: {}", binding, names.join(", "));
                }
            }
        }
    }
    Ok(())
}
