// src/lib.rs

//! Helmsman - Cluster Add-on Controller
//!
//! Converts a declarative configuration document into a set of running,
//! versioned deployments ("modules") driven through a helm-style package
//! manager.
//!
//! # Architecture
//!
//! - Catalog: modules discovered from the filesystem in a fixed order
//! - Values store: layered, checksum-comparable configuration trees
//! - Hooks: executables bound to lifecycle points and cluster events
//! - Module manager: the single-task event loop reconciling it all
//! - Collaborators behind traits: package manager, config source, hook
//!   execution framework

pub mod catalog;
pub mod config;
pub mod conflate;
mod error;
pub mod hooks;
pub mod manager;
pub mod release;
pub mod values;

pub use catalog::{Catalog, ModuleDef};
pub use config::{
    ClusterConfig, ConfigSource, FileConfigSource, ModuleSection, StaticConfigSource, Toggle,
};
pub use error::{Error, Result};
pub use hooks::{
    Binding, BindingContext, GlobalHook, HookExecutor, HookRegistry, ModuleHook, ShellHookExecutor,
};
pub use manager::{
    ChangeType, Event, EventReceiver, ManagerConfig, ModuleChange, ModuleManager, ModulesState,
};
pub use release::{HelmCli, PackageManager, ReleaseState, ReleaseStatus};
pub use values::{PatchScope, Values, ValuesPatch, ValuesStore};
