use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DEFAULT_CONFIG_DIR: &str = "/etc/snapadmin";
pub const DEFAULT_TESTFILE_DIR: &str = "/etc/snapadmin/testfiles";
pub const SNAPSHOT_SUBDIR: &str = ".snapadmin/snapshots";
pub const SETTINGS_FILE: &str = "snapadmin.yml";

/// Label used by snapcheck when the caller gives no snapshot name.
pub const TEMP_SNAPSHOT_LABEL: &str = "snap_temp";
pub const SNAPSHOT_EXT: &str = "txt";

// ---------------------------------------------------------------------------
// DefaultPaths
// ---------------------------------------------------------------------------

/// Directories consulted when a file reference is not a literal path.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultPaths {
    /// Where main config files live (`-f main.yml`).
    pub config_dir: PathBuf,
    /// Where test definitions, host-group files and mail settings live.
    pub testfile_dir: PathBuf,
    /// Where captured snapshots and SQLite databases are written.
    pub snapshot_dir: PathBuf,
}

impl Default for DefaultPaths {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            testfile_dir: PathBuf::from(DEFAULT_TESTFILE_DIR),
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

impl DefaultPaths {
    /// All three directories under one root: `<root>`, `<root>/testfiles`,
    /// `<root>/snapshots`.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            config_dir: root.to_path_buf(),
            testfile_dir: root.join("testfiles"),
            snapshot_dir: root.join("snapshots"),
        }
    }

    pub fn config_file(&self, name: &str) -> Option<PathBuf> {
        locate(name, &self.config_dir)
    }

    pub fn test_file(&self, name: &str) -> Option<PathBuf> {
        locate(name, &self.testfile_dir)
    }

    pub fn snapshot_file(&self, host: &str, label: &str, command: &str) -> PathBuf {
        self.snapshot_dir.join(format!(
            "{}_{}_{}.{SNAPSHOT_EXT}",
            sanitize(host),
            sanitize(label),
            sanitize(command)
        ))
    }

    pub fn database_path(&self, database_name: &str) -> PathBuf {
        self.snapshot_dir.join(database_name)
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Resolve `name` as a literal path first, then under `default_dir`.
pub fn locate(name: &str, default_dir: &Path) -> Option<PathBuf> {
    let literal = PathBuf::from(name);
    if literal.is_file() {
        return Some(literal);
    }
    let joined = default_dir.join(name);
    joined.is_file().then_some(joined)
}

pub fn default_snapshot_dir() -> PathBuf {
    home::home_dir()
        .map(|h| h.join(SNAPSHOT_SUBDIR))
        .unwrap_or_else(|| PathBuf::from("snapshots"))
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]+").expect("valid regex"))
}

/// Make `s` usable as a file-name component: runs of anything other than
/// alphanumerics, `_`, `.` and `-` become a single `_`.
pub fn sanitize(s: &str) -> String {
    unsafe_chars()
        .replace_all(s.trim(), "_")
        .trim_matches('_')
        .to_string()
}
