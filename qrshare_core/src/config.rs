use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "qrshare";
const APP_NAME: &str = "qrshare";
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "QRSHARE_CONFIG_DIR";

/// Settings remembered between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network interface used last time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

impl AppConfig {
    /// Get the config file path
    fn get_config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Some(PathBuf::from(dir).join(CONFIG_FILE));
        }

        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load config from disk or return default
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Missing or corrupt files yield the default config
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save config to disk
    pub fn save(&self) -> io::Result<()> {
        match Self::get_config_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    /// Pick the interface hint for this run, remembering an explicit choice
    pub fn resolve_interface(&mut self, requested: Option<String>) -> Option<String> {
        match Self::get_config_path() {
            Some(path) => self.resolve_interface_at(requested, &path),
            None => {
                if requested.is_some() {
                    self.interface = requested;
                }
                self.interface.clone()
            }
        }
    }

    /// Like [`AppConfig::resolve_interface`], persisting to `path`
    pub fn resolve_interface_at(&mut self, requested: Option<String>, path: &Path) -> Option<String> {
        if let Some(name) = requested {
            self.interface = Some(name);
            if let Err(e) = self.save_to(path) {
                tracing::warn!("Could not save config {}: {}", path.display(), e);
            }
        }
        self.interface.clone()
    }
}
