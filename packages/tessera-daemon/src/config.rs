/// Configuration for the tessera daemon.
/// Reads daemon.json from ~/.config/tessera/daemon.json (or platform equivalent).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    /// Vault directory to index and watch.
    #[serde(default)]
    pub vault: Option<PathBuf>,
    /// Global settings file. Defaults to `<vault>/.tessera/settings.json`.
    #[serde(default)]
    pub settings: Option<PathBuf>,
    #[serde(default = "default_cleanup_secs")]
    pub fingerprint_cleanup_secs: u64,
}

fn default_cleanup_secs() -> u64 {
    30
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            vault: None,
            settings: None,
            fingerprint_cleanup_secs: default_cleanup_secs(),
        }
    }
}

impl DaemonConfig {
    pub fn settings_path(&self, vault: &Path) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(|| vault.join(".tessera").join("settings.json"))
    }
}

/// Default config path: ~/.config/tessera/daemon.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tessera")
        .join("daemon.json")
}

/// Load config from path. Returns default if file doesn't exist.
pub fn load_config(path: &Path) -> DaemonConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(
                "[tessera.daemon.config] Failed to parse config {}: {}",
                path.display(),
                e
            );
            DaemonConfig::default()
        }),
        Err(_) => {
            log::info!(
                "[tessera.daemon.config] No config at {}, using defaults",
                path.display()
            );
            DaemonConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.json");
        fs::write(&path, r#"{"vault": "/srv/vault", "fingerprintCleanupSecs": 5}"#).unwrap();

        let config = load_config(&path);
        assert_eq!(config.vault, Some(PathBuf::from("/srv/vault")));
        assert_eq!(config.fingerprint_cleanup_secs, 5);
        assert_eq!(
            config.settings_path(Path::new("/srv/vault")),
            PathBuf::from("/srv/vault/.tessera/settings.json")
        );
    }

    #[test]
    fn test_missing_or_broken_config_is_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_config(&dir.path().join("absent.json")), DaemonConfig::default());

        let path = dir.path().join("broken.json");
        fs::write(&path, "{ vault: ").unwrap();
        assert_eq!(load_config(&path), DaemonConfig::default());
    }

    #[test]
    fn test_explicit_settings_path_wins() {
        let config = DaemonConfig {
            settings: Some(PathBuf::from("/etc/tessera/settings.json")),
            ..Default::default()
        };
        assert_eq!(
            config.settings_path(Path::new("/srv/vault")),
            PathBuf::from("/etc/tessera/settings.json")
        );
    }
}
