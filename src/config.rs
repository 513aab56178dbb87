use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub list: ListConfig,
    #[serde(default)]
    pub launch: LaunchConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

fn default_margin_vertical() -> u16 {
    1
}

fn default_margin_horizontal() -> u16 {
    2
}

fn default_shell() -> String {
    #[cfg(target_os = "windows")]
    {
        return "cmd".to_string();
    }

    #[cfg(not(target_os = "windows"))]
    "/bin/sh".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Substring,
    Fuzzy,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListConfig {
    #[serde(default)]
    pub wrap: bool,
    #[serde(default)]
    pub hide: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LaunchConfig {
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_margin_vertical")]
    pub margin_vertical: u16,
    #[serde(default = "default_margin_horizontal")]
    pub margin_horizontal: u16,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            margin_vertical: default_margin_vertical(),
            margin_horizontal: default_margin_horizontal(),
        }
    }
}

pub fn load(cwd: &Path) -> Result<LoadedConfig> {
    let local_candidates = [cwd.join("scriptpick.toml"), cwd.join(".scriptpick.toml")];
    for path in &local_candidates {
        if path.exists() {
            return Ok(LoadedConfig {
                config: load_from_path(path)?,
                path: Some(path.to_path_buf()),
            });
        }
    }

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            return Ok(LoadedConfig {
                config: load_from_path(&global_path)?,
                path: Some(global_path),
            });
        }
    }

    Ok(LoadedConfig {
        config: Config::default(),
        path: None,
    })
}

pub fn global_config_path() -> Option<PathBuf> {
    let config_root = dirs::config_dir()?;
    Some(config_root.join("scriptpick").join("config.toml"))
}

fn load_from_path(path: &Path) -> Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
}
