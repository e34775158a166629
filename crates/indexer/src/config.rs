use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use library::{ScanOptions, WatchOptions, DEFAULT_SCAN_CONCURRENCY, DEFAULT_SIDECAR_NAME};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;
const DEFAULT_DEBOUNCE_SECS: u64 = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub version: u32,
    pub library_roots: Vec<String>,
    pub sidecar_name: String,
    pub scan_concurrency: usize,
    pub watch_sidecars: bool,
    pub watch_debounce_secs: u64,
    /// 0 selects native change notifications.
    pub watch_poll_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            library_roots: Vec::new(),
            sidecar_name: DEFAULT_SIDECAR_NAME.to_string(),
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
            watch_sidecars: true,
            watch_debounce_secs: DEFAULT_DEBOUNCE_SECS,
            watch_poll_secs: 0,
        }
    }
}

impl IndexerConfig {
    pub fn scan_options(&self) -> ScanOptions {
        let sidecar_name = self.sidecar_name.trim();
        ScanOptions {
            sidecar_name: if sidecar_name.is_empty() {
                DEFAULT_SIDECAR_NAME.to_string()
            } else {
                sidecar_name.to_string()
            },
            concurrency: if self.scan_concurrency == 0 {
                DEFAULT_SCAN_CONCURRENCY
            } else {
                self.scan_concurrency
            },
        }
    }

    pub fn watch_options(&self) -> WatchOptions {
        let debounce_secs = if self.watch_debounce_secs == 0 {
            DEFAULT_DEBOUNCE_SECS
        } else {
            self.watch_debounce_secs
        };
        WatchOptions {
            debounce: Duration::from_secs(debounce_secs),
            poll_interval: (self.watch_poll_secs > 0)
                .then(|| Duration::from_secs(self.watch_poll_secs)),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("SHELF_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("shelf.yaml"))
            .unwrap_or_else(|| PathBuf::from("shelf.yaml")),
        Err(_) => PathBuf::from("shelf.yaml"),
    }
}

/// Returns the config and whether it was freshly created.
pub fn load_or_create_config(path: &Path) -> Result<(IndexerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: IndexerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.sidecar_name.trim().is_empty() {
            config.sidecar_name = DEFAULT_SIDECAR_NAME.to_string();
        }
        config.library_roots.retain(|root| !root.trim().is_empty());
        return Ok((config, false));
    }

    let config = IndexerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &IndexerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Relative paths are taken from the config file's directory.
pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

pub fn resolve_roots(config_path: &Path, config: &IndexerConfig) -> Vec<PathBuf> {
    config
        .library_roots
        .iter()
        .map(|root| root.trim())
        .filter(|root| !root.is_empty())
        .map(|root| resolve_path(config_path, root))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shelf.yaml");

        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert_eq!(config, IndexerConfig::default());
        assert!(path.exists());

        let (reloaded, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(reloaded, config);
    }

    #[test]
    fn partial_config_is_upgraded_and_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.yaml");
        fs::write(
            &path,
            "version: 0\nlibrary_roots: [music, '', /srv/albums]\nsidecar_name: ''\nscan_concurrency: 0\nwatch_debounce_secs: 0\nwatch_poll_secs: 30\n",
        )
        .unwrap();

        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.sidecar_name, "album.json");
        assert!(config.watch_sidecars);

        let scan = config.scan_options();
        assert_eq!(scan.concurrency, DEFAULT_SCAN_CONCURRENCY);

        let watch = config.watch_options();
        assert_eq!(watch.debounce, Duration::from_secs(2));
        assert_eq!(watch.poll_interval, Some(Duration::from_secs(30)));

        let roots = resolve_roots(&path, &config);
        assert_eq!(
            roots,
            vec![dir.path().join("music"), PathBuf::from("/srv/albums")]
        );
    }

    #[test]
    fn zero_poll_interval_uses_native_watcher() {
        let config = IndexerConfig::default();
        assert_eq!(config.watch_options().poll_interval, None);
    }
}
