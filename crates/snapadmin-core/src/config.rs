use crate::error::{Result, SnapError};
use crate::paths::DefaultPaths;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// SqliteSection
// ---------------------------------------------------------------------------

/// The single mapping under `sqlite:` in a main config file.
///
/// `compare` is kept as a raw value so the persistence policy can reject
/// non-string forms with a precise message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqliteSection {
    #[serde(default)]
    pub store_in_sqlite: bool,
    #[serde(default)]
    pub check_from_sqlite: bool,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub compare: Option<serde_yaml::Value>,
}

// ---------------------------------------------------------------------------
// MainConfig
// ---------------------------------------------------------------------------

/// A main config file: which hosts to target, which test definitions to run,
/// how to persist snapshots and whom to notify.
///
/// ```yaml
/// hosts:
///   - include: devices.yml
///     group: core, edge
/// tests:
///   - test_interfaces.yml
/// sqlite:
///   - store_in_sqlite: true
///     check_from_sqlite: true
///     database_name: snaps.db
///     compare: 0,1
/// mail: send_mail.yml
/// ```
///
/// Host entries stay as raw mappings because inline hosts carry arbitrary
/// connection keys; `hosts::HostResolver` interprets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MainConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub hosts: Vec<serde_yaml::Mapping>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tests: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sqlite: Vec<SqliteSection>,
    #[serde(default)]
    pub mail: Option<String>,
}

impl MainConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        if !value.is_mapping() {
            return Err(SnapError::InvalidConfig(
                "main config must be a mapping".to_string(),
            ));
        }
        Ok(serde_yaml::from_value(value)?)
    }

    /// The `sqlite` section, if one was given.
    pub fn sqlite_section(&self) -> Option<&SqliteSection> {
        self.sqlite.first()
    }
}

fn null_as_default<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// ConfigSource
// ---------------------------------------------------------------------------

/// Where a main config comes from: a file, inline YAML, or an already-parsed
/// value handed in by an embedding program.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    Path(PathBuf),
    Text(String),
    Parsed(MainConfig),
}

impl ConfigSource {
    /// Classify a string argument: an existing file, an inline YAML document,
    /// or a file name to be resolved under the config directory.
    pub fn detect(data: &str) -> Self {
        if Path::new(data).is_file() {
            return ConfigSource::Path(PathBuf::from(data));
        }
        if data.contains('\n') || data.contains(": ") || data.trim_end().ends_with(':') {
            return ConfigSource::Text(data.to_string());
        }
        ConfigSource::Path(PathBuf::from(data))
    }

    /// Produce the parsed config. File names are looked up literally, then
    /// under `paths.config_dir`.
    pub fn load(self, paths: &DefaultPaths) -> Result<MainConfig> {
        match self {
            ConfigSource::Parsed(cfg) => Ok(cfg),
            ConfigSource::Text(text) => MainConfig::from_yaml(&text),
            ConfigSource::Path(p) => {
                let name = p.to_string_lossy();
                let path = paths
                    .config_file(&name)
                    .ok_or_else(|| SnapError::ConfigNotFound(name.to_string()))?;
                let data = std::fs::read_to_string(&path)?;
                MainConfig::from_yaml(&data)
            }
        }
    }
}

impl From<MainConfig> for ConfigSource {
    fn from(cfg: MainConfig) -> Self {
        ConfigSource::Parsed(cfg)
    }
}

impl From<PathBuf> for ConfigSource {
    fn from(p: PathBuf) -> Self {
        ConfigSource::Path(p)
    }
}

impl From<&Path> for ConfigSource {
    fn from(p: &Path) -> Self {
        ConfigSource::Path(p.to_path_buf())
    }
}

impl From<&str> for ConfigSource {
    fn from(s: &str) -> Self {
        ConfigSource::detect(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
