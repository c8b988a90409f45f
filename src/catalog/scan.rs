// src/catalog/scan.rs

//! Filesystem discovery of the module catalog.
//!
//! Layout:
//!
//! ```text
//! MODULES_DIR/
//!   values.json            # common static values (global + module sections)
//!   010-ingress/
//!     values.json          # module static values + enabled flag
//!     enabled              # optional enable-probe (executable)
//!     hooks/               # module hook executables
//!     ...chart files...
//!   020-metrics/
//! GLOBAL_HOOKS_DIR/        # global hook executables
//! ```
//!
//! Module directories are named `NNN-name`; `NNN` is the catalog order
//! index. Entries that do not match are skipped with a warning. Hidden
//! and non-executable files under a hooks tree are ignored.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::values::{module_enabled_key, module_values_key, Values};

use super::{toggle_from_values, Catalog, ModuleDef};

/// Name of the static values file, shared and per-module
const VALUES_FILE: &str = "values.json";

/// Name of the enable-probe script inside a module directory
const ENABLED_SCRIPT: &str = "enabled";

/// Result of a modules-directory scan
#[derive(Debug)]
pub struct ScanResult {
    pub catalog: Catalog,
    /// Contents of the shared defaults file
    pub common_static: Values,
}

/// Scan a modules directory into an ordered catalog
pub fn scan_modules_dir(dir: &Path) -> Result<ScanResult> {
    if !dir.is_dir() {
        return Err(Error::Catalog(format!(
            "modules directory {} does not exist",
            dir.display()
        )));
    }

    let common_static = read_values_file(&dir.join(VALUES_FILE))?;

    let mut modules = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|e| e.path().is_dir())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        let Some((order, name)) = parse_module_dir_name(&dir_name) else {
            warn!("skipping '{}': not an NNN-name module directory", dir_name);
            continue;
        };

        let module_path = entry.path();
        let static_values_file = read_values_file(&module_path.join(VALUES_FILE))?;

        let enabled_script = executable_at(&module_path.join(ENABLED_SCRIPT));

        let def = ModuleDef {
            common_static_enabled: toggle_from_values(&common_static, &module_enabled_key(&name)),
            static_enabled: toggle_from_values(&static_values_file, &module_enabled_key(&name)),
            static_values: static_values_file.section(&module_values_key(&name)),
            enabled_script,
            name,
            order,
            path: module_path,
        };
        debug!(
            "catalog module '{}' (order {}, probe: {})",
            def.name,
            def.order,
            def.enabled_script.is_some()
        );
        modules.push(def);
    }

    Ok(ScanResult { catalog: Catalog::new(modules)?, common_static })
}

/// Executable files under a hooks directory, sorted by path
pub fn hook_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| Error::Catalog(format!("hook scan failed: {}", e)))?;
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if !is_executable(entry.path()) {
            warn!("skipping non-executable hook file {}", entry.path().display());
            continue;
        }
        files.push(entry.path().to_path_buf());
    }
    files.sort();
    Ok(files)
}

/// Parse `NNN-name` into the order index and module name
fn parse_module_dir_name(dir_name: &str) -> Option<(u32, String)> {
    let (prefix, name) = dir_name.split_once('-')?;
    if name.is_empty() {
        return None;
    }
    let order = prefix.parse::<u32>().ok()?;
    Some((order, name.to_string()))
}

fn read_values_file(path: &Path) -> Result<Values> {
    if !path.is_file() {
        return Ok(Values::new());
    }
    let bytes = std::fs::read(path)?;
    Values::from_json_slice(&bytes)
        .map_err(|e| Error::Catalog(format!("cannot parse {}: {}", path.display(), e)))
}

fn executable_at(path: &Path) -> Option<PathBuf> {
    if path.is_file() && is_executable(path) {
        Some(path.to_path_buf())
    } else {
        None
    }
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
