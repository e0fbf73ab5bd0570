//! Data directory I/O and replay plumbing behind the `opsdesk` binary.

use anyhow::{bail, Context, Result};
use opsdesk_core::Store;
use opsdesk_tools::registry::ToolRegistry;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// `~/.opsdesk`, or `./.opsdesk` when no home directory is known.
pub fn get_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".opsdesk")
}

pub fn get_log_dir() -> PathBuf {
    get_config_dir().join("logs")
}

/// Build a store from every `<table>.json` file directly inside `dir`.
pub fn load_store(dir: &Path) -> Result<Store> {
    if !dir.is_dir() {
        bail!("Data directory {} does not exist", dir.display());
    }
    let mut data = Map::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to scan {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(table) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let value: Value =
            serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))?;
        if !value.is_object() {
            bail!("Table file {} must contain a JSON object", path.display());
        }
        debug!(table, "Loaded table");
        data.insert(table.to_string(), value);
    }
    Ok(Store::new(data))
}

/// Names of tables whose contents differ between two snapshots, including new tables.
pub fn changed_tables(before: &Store, after: &Store) -> Vec<String> {
    after
        .as_map()
        .iter()
        .filter(|(name, table)| before.as_map().get(*name) != Some(*table))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Write the named tables back to `<dir>/<table>.json`, pretty-printed.
pub fn save_tables(dir: &Path, store: &Store, tables: &[String]) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    for name in tables {
        let Some(table) = store.as_map().get(name) else {
            continue;
        };
        let path = dir.join(format!("{name}.json"));
        let body = serde_json::to_string_pretty(table)?;
        fs::write(&path, body + "\n").with_context(|| format!("Failed to write {}", path.display()))?;
        info!(table = %name, path = %path.display(), "Table written back");
    }
    Ok(())
}

/// Persist every table that differs between `before` and `after`, returning their names.
///
/// Failed calls are written too: some tools record flags on a record and then reject.
pub fn write_back(dir: &Path, before: &Store, after: &Store) -> Result<Vec<String>> {
    let changed = changed_tables(before, after);
    save_tables(dir, after, &changed)?;
    Ok(changed)
}

/// Tool arguments from inline JSON, a file, or nothing (`{}`).
pub fn read_arguments(inline: Option<&str>, file: Option<&Path>) -> Result<Value> {
    match (inline, file) {
        (Some(_), Some(_)) => bail!("Use either --args or --args-file, not both"),
        (Some(text), None) => serde_json::from_str(text).context("--args is not valid JSON"),
        (None, Some(path)) => {
            let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
        }
        (None, None) => Ok(Value::Object(Map::new())),
    }
}

/// One recorded tool call.
#[derive(Debug, Deserialize)]
pub struct ReplayAction {
    pub name: String,
    #[serde(default, alias = "kwargs")]
    pub arguments: Value,
}

pub fn load_actions(path: &Path) -> Result<Vec<ReplayAction>> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} must be a JSON list of {{name, arguments}}", path.display()))
}

/// Run `actions` in order against one store, returning `(name, envelope)` per call.
pub fn replay(
    registry: &ToolRegistry,
    store: &mut Store,
    actions: Vec<ReplayAction>,
    allowed_tools: &[String],
) -> Vec<(String, Value)> {
    actions
        .into_iter()
        .map(|action| {
            let output = registry.dispatch_allowed(store, &action.name, action.arguments, allowed_tools);
            (action.name, output)
        })
        .collect()
}
