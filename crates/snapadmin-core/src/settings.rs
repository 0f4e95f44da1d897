use crate::error::{Result, SnapError};
use crate::paths::{self, DefaultPaths};
use device_session::SshOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_SETTINGS: &str = "SNAPADMIN_SETTINGS";
pub const ENV_CONFIG_DIR: &str = "SNAPADMIN_CONFIG_DIR";
pub const ENV_TESTFILE_DIR: &str = "SNAPADMIN_TESTFILE_DIR";
pub const ENV_SNAPSHOT_DIR: &str = "SNAPADMIN_SNAPSHOT_DIR";

// ---------------------------------------------------------------------------
// PathSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
    #[serde(default)]
    pub testfile_dir: Option<PathBuf>,
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// DispatchSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Concurrent hosts per dispatch. `0` means one worker per host.
    #[serde(default)]
    pub max_parallel: usize,
}

// ---------------------------------------------------------------------------
// Settings (top-level)
// ---------------------------------------------------------------------------

/// Tool-wide settings, independent of any one main config file.
///
/// Every field has a default so an empty or absent file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub ssh: SshOptions,
}

impl Settings {
    /// Load settings from the first source that exists:
    /// 1. `explicit` (CLI `--settings`)
    /// 2. `$SNAPADMIN_SETTINGS`
    /// 3. `/etc/snapadmin/snapadmin.yml`
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file yields [`Settings::default`].
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            if !p.is_file() {
                return Err(SnapError::ConfigNotFound(p.display().to_string()));
            }
            return Self::from_file(p);
        }
        if let Ok(p) = std::env::var(ENV_SETTINGS) {
            let p = PathBuf::from(p);
            if !p.is_file() {
                return Err(SnapError::ConfigNotFound(p.display().to_string()));
            }
            return Self::from_file(&p);
        }
        let default = Path::new(paths::DEFAULT_CONFIG_DIR).join(paths::SETTINGS_FILE);
        if default.is_file() {
            return Self::from_file(&default);
        }
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    /// Resolve the default directories: environment > settings file > built-in.
    pub fn default_paths(&self) -> DefaultPaths {
        self.default_paths_with(|k| std::env::var(k).ok())
    }

    fn default_paths_with(&self, env: impl Fn(&str) -> Option<String>) -> DefaultPaths {
        let builtin = DefaultPaths::default();
        let pick = |key: &str, configured: &Option<PathBuf>, fallback: PathBuf| {
            env(key)
                .map(PathBuf::from)
                .or_else(|| configured.clone())
                .unwrap_or(fallback)
        };
        DefaultPaths {
            config_dir: pick(ENV_CONFIG_DIR, &self.paths.config_dir, builtin.config_dir),
            testfile_dir: pick(
                ENV_TESTFILE_DIR,
                &self.paths.testfile_dir,
                builtin.testfile_dir,
            ),
            snapshot_dir: pick(
                ENV_SNAPSHOT_DIR,
                &self.paths.snapshot_dir,
                builtin.snapshot_dir,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
