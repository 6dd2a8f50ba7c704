//! Loading directory snapshots from disk.
//!
//! The format is picked from the file extension: `.json`, `.toml`, anything
//! else is read as YAML.

use std::path::Path;

use anyhow::{Context, Result};
use tasktree_core::rbac::{DirectorySnapshot, InMemoryDirectory};

pub fn load(path: &Path) -> Result<InMemoryDirectory> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let snapshot = parse(&content, path)?;
    Ok(InMemoryDirectory::from_snapshot(snapshot))
}

fn parse(content: &str, path: &Path) -> Result<DirectorySnapshot> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let snapshot = match extension.as_deref() {
        Some("json") => serde_json::from_str(content).context("Invalid JSON snapshot")?,
        Some("toml") => toml::from_str(content).context("Invalid TOML snapshot")?,
        _ => serde_yaml::from_str(content).context("Invalid YAML snapshot")?,
    };
    Ok(snapshot)
}
