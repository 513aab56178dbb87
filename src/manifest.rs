use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const MANIFEST_FILE: &str = "package.json";

/// The parts of `package.json` the launcher cares about. Everything else in
/// the file is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

pub fn manifest_path(cwd: &Path) -> PathBuf {
    cwd.join(MANIFEST_FILE)
}

pub fn load(cwd: &Path) -> Result<Manifest> {
    let path = manifest_path(cwd);
    let content =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    parse(&content).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse(raw: &str) -> Result<Manifest> {
    Ok(serde_json::from_str(raw)?)
}
