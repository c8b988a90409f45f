// src/config/mod.rs

//! The authoritative cluster configuration document and its source.
//!
//! The config source delivers an initial document plus two update streams:
//! full replacements of the whole document, and changes to individual
//! module sections. Watching a real cluster object is a collaborator
//! concern; the core consumes the abstract streams.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::de::Deserializer;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::debug;

use crate::conflate;
use crate::error::{Error, Result};
use crate::values::Values;

/// Tri-valued enabled flag. Merging is "later layer wins unless unset";
/// a stack that is unset everywhere resolves to disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Toggle {
    #[default]
    Unset,
    On,
    Off,
}

impl Toggle {
    /// Resolve a layer stack, lowest precedence first
    pub fn resolve(layers: &[Toggle]) -> bool {
        let mut result = false;
        for layer in layers {
            match layer {
                Toggle::Unset => {}
                Toggle::On => result = true,
                Toggle::Off => result = false,
            }
        }
        result
    }
}

impl From<Option<bool>> for Toggle {
    fn from(flag: Option<bool>) -> Self {
        match flag {
            None => Toggle::Unset,
            Some(true) => Toggle::On,
            Some(false) => Toggle::Off,
        }
    }
}

impl<'de> Deserialize<'de> for Toggle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let flag = Option::<bool>::deserialize(deserializer)?;
        Ok(Toggle::from(flag))
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Toggle::Unset => write!(f, "unset"),
            Toggle::On => write!(f, "true"),
            Toggle::Off => write!(f, "false"),
        }
    }
}

/// One module's section of the cluster config
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleSection {
    #[serde(default)]
    pub values: Values,
    #[serde(default)]
    pub enabled: Toggle,
    /// Set by the source when this delivery changed the section
    #[serde(default)]
    pub updated: bool,
}

/// The set of module sections carried by a sections-changed delivery.
/// A delivery is authoritative: a module absent from the map has no
/// section in the cluster config anymore.
pub type ModuleSections = BTreeMap<String, ModuleSection>;

/// The full cluster configuration document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterConfig {
    /// Global values section
    #[serde(default)]
    pub values: Values,
    /// Per-module sections keyed by module name
    #[serde(default)]
    pub modules: ModuleSections,
}

impl ClusterConfig {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Config(format!("cannot parse config document: {}", e)))
    }
}

/// Producer side of the config update streams
pub struct ConfigTx {
    pub replaced: conflate::Sender<ClusterConfig>,
    pub sections: conflate::Sender<ModuleSections>,
}

/// Consumer side of the config update streams
pub struct ConfigRx {
    pub replaced: conflate::Receiver<ClusterConfig>,
    pub sections: conflate::Receiver<ModuleSections>,
}

/// Create the pair of conflated config streams
pub fn config_channel() -> (ConfigTx, ConfigRx) {
    let (replaced_tx, replaced_rx) = conflate::channel();
    let (sections_tx, sections_rx) = conflate::channel();
    (
        ConfigTx { replaced: replaced_tx, sections: sections_tx },
        ConfigRx { replaced: replaced_rx, sections: sections_rx },
    )
}

/// Source of the authoritative configuration document
pub trait ConfigSource: Send {
    /// Read the initial document
    fn initial(&mut self) -> Result<ClusterConfig>;

    /// Start delivering updates into `tx` until `shutdown` flips.
    /// Sources without a change feed simply drop the sender.
    fn start(self: Box<Self>, tx: ConfigTx, shutdown: watch::Receiver<bool>);
}

/// A fixed configuration with no update feed. Used by one-shot CLI
/// commands and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    config: ClusterConfig,
}

impl StaticConfigSource {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }
}

impl ConfigSource for StaticConfigSource {
    fn initial(&mut self) -> Result<ClusterConfig> {
        Ok(self.config.clone())
    }

    fn start(self: Box<Self>, _tx: ConfigTx, _shutdown: watch::Receiver<bool>) {
        debug!("static config source has no update feed");
    }
}

/// Reads the configuration document from a JSON file once at startup
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn initial(&mut self) -> Result<ClusterConfig> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            Error::Config(format!("cannot read config document {}: {}", self.path.display(), e))
        })?;
        ClusterConfig::from_json_slice(&bytes)
    }

    fn start(self: Box<Self>, _tx: ConfigTx, _shutdown: watch::Receiver<bool>) {
        debug!("file config source is read once; no update feed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_toggle_resolution() {
        use Toggle::*;
        assert!(!Toggle::resolve(&[Unset, Unset]));
        assert!(Toggle::resolve(&[On, Unset]));
        assert!(!Toggle::resolve(&[On, Off]));
        assert!(Toggle::resolve(&[Off, On]));
        assert!(Toggle::resolve(&[Unset, On, Unset]));
        assert!(!Toggle::resolve(&[]));
    }

    #[test]
    fn test_parse_config_document() {
        let doc = json!({
            "values": {"project": "demo"},
            "modules": {
                "ingress": {"values": {"port": 443}, "enabled": true},
                "metrics": {"enabled": false},
                "logging": {},
            }
        });
        let cfg = ClusterConfig::from_json_slice(doc.to_string().as_bytes()).unwrap();
        assert_eq!(cfg.values.get("project"), Some(&json!("demo")));
        assert_eq!(cfg.modules["ingress"].enabled, Toggle::On);
        assert_eq!(cfg.modules["metrics"].enabled, Toggle::Off);
        assert_eq!(cfg.modules["logging"].enabled, Toggle::Unset);
        assert!(!cfg.modules["ingress"].updated);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ClusterConfig::from_json_slice(b"42").is_err());
        assert!(ClusterConfig::from_json_slice(b"{ not json").is_err());
    }

    #[test]
    fn test_static_source_initial() {
        let mut source = StaticConfigSource::new(ClusterConfig::default());
        assert!(source.initial().unwrap().modules.is_empty());
    }
}
