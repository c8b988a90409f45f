// src/catalog/mod.rs

//! The module catalog: every module known from the filesystem, in a fixed
//! order.
//!
//! A module is an installable unit: a chart directory, optional static
//! values, an optional `enabled` probe script, and a `hooks/` tree. The
//! catalog is built once at init and never mutated; the effective enabled
//! set is a view over it maintained by the manager.

pub mod scan;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::Toggle;
use crate::error::{Error, Result};
use crate::values::Values;

/// A catalog entry with its static configuration
#[derive(Debug, Clone)]
pub struct ModuleDef {
    /// Unique name, derived from the directory name
    pub name: String,
    /// Order index parsed from the directory prefix
    pub order: u32,
    /// Chart directory
    pub path: PathBuf,
    /// Enabled flag from the shared defaults file
    pub common_static_enabled: Toggle,
    /// Enabled flag from the module's own defaults file
    pub static_enabled: Toggle,
    /// Optional enable-probe script
    pub enabled_script: Option<PathBuf>,
    /// The module's own static values section
    pub static_values: Values,
}

impl ModuleDef {
    /// Whether static configuration alone enables this module
    pub fn statically_enabled(&self) -> bool {
        Toggle::resolve(&[self.common_static_enabled, self.static_enabled])
    }

    /// Directory holding this module's hooks
    pub fn hooks_dir(&self) -> PathBuf {
        self.path.join("hooks")
    }
}

/// Ordered, immutable set of modules
#[derive(Debug, Default)]
pub struct Catalog {
    modules: Vec<ModuleDef>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog; modules are ordered by their order index with name
    /// as the tie-break. Duplicate names are rejected.
    pub fn new(mut modules: Vec<ModuleDef>) -> Result<Self> {
        modules.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        let mut by_name = HashMap::with_capacity(modules.len());
        for (index, module) in modules.iter().enumerate() {
            if by_name.insert(module.name.clone(), index).is_some() {
                return Err(Error::Catalog(format!(
                    "duplicate module name '{}'",
                    module.name
                )));
            }
        }
        Ok(Self { modules, by_name })
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleDef> {
        self.by_name.get(name).map(|&i| &self.modules[i])
    }

    pub fn by_index(&self, index: usize) -> Option<&ModuleDef> {
        self.modules.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleDef> {
        self.modules.iter()
    }

    pub fn names_in_order(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name.clone()).collect()
    }

    /// Filter `names` to known modules and sort them into catalog order
    pub fn sort_by_catalog(&self, names: &[String]) -> Vec<String> {
        let mut known: Vec<&String> = names.iter().filter(|n| self.contains(n.as_str())).collect();
        known.sort_by_key(|n| self.by_name[n.as_str()]);
        known.into_iter().cloned().collect()
    }

    /// Same filter, reverse catalog order (tear-down ordering)
    pub fn reverse_sort_by_catalog(&self, names: &[String]) -> Vec<String> {
        let mut sorted = self.sort_by_catalog(names);
        sorted.reverse();
        sorted
    }
}

/// Read a tri-valued enabled flag out of a values tree
pub fn toggle_from_values(values: &Values, key: &str) -> Toggle {
    match values.get(key) {
        Some(serde_json::Value::Bool(flag)) => Toggle::from(Some(*flag)),
        Some(other) => {
            tracing::warn!("ignoring non-boolean enabled flag '{}': {}", key, other);
            Toggle::Unset
        }
        None => Toggle::Unset,
    }
}

/// Convenience constructor used by tests and the scanner
pub fn module_def(name: &str, order: u32, path: &Path) -> ModuleDef {
    ModuleDef {
        name: name.to_string(),
        order,
        path: path.to_path_buf(),
        common_static_enabled: Toggle::Unset,
        static_enabled: Toggle::Unset,
        enabled_script: None,
        static_values: Values::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog(names: &[&str]) -> Catalog {
        let modules = names
            .iter()
            .enumerate()
            .map(|(i, name)| module_def(name, (i as u32 + 1) * 10, Path::new("/modules")))
            .collect();
        Catalog::new(modules).unwrap()
    }

    #[test]
    fn test_catalog_ordering() {
        let mut modules = vec![
            module_def("b", 20, Path::new("/m")),
            module_def("a", 10, Path::new("/m")),
            module_def("c", 20, Path::new("/m")),
        ];
        modules.rotate_left(1);
        let catalog = Catalog::new(modules).unwrap();
        assert_eq!(catalog.names_in_order(), vec!["a", "b", "c"]);
        assert_eq!(catalog.index_of("b"), Some(1));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let modules = vec![
            module_def("a", 10, Path::new("/m")),
            module_def("a", 20, Path::new("/m")),
        ];
        assert!(Catalog::new(modules).is_err());
    }

    #[test]
    fn test_sort_by_catalog_filters_and_orders() {
        let catalog = catalog(&["a", "b", "c"]);
        let names = vec!["c".to_string(), "zombie".to_string(), "a".to_string()];
        assert_eq!(catalog.sort_by_catalog(&names), vec!["a", "c"]);
        assert_eq!(catalog.reverse_sort_by_catalog(&names), vec!["c", "a"]);
    }

    #[test]
    fn test_statically_enabled_merge() {
        let mut def = module_def("a", 10, Path::new("/m"));
        assert!(!def.statically_enabled());
        def.common_static_enabled = Toggle::On;
        assert!(def.statically_enabled());
        def.static_enabled = Toggle::Off;
        assert!(!def.statically_enabled());
    }

    #[test]
    fn test_toggle_from_values() {
        let values =
            Values::from_value(json!({"aEnabled": true, "bEnabled": "yes"})).unwrap();
        assert_eq!(toggle_from_values(&values, "aEnabled"), Toggle::On);
        assert_eq!(toggle_from_values(&values, "bEnabled"), Toggle::Unset);
        assert_eq!(toggle_from_values(&values, "cEnabled"), Toggle::Unset);
    }
}
