use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ─── ConnectParams ────────────────────────────────────────────────────────

/// Everything needed to open a session to one device.
///
/// `extra` carries the host-specific keys left over after the identity keys
/// were stripped from a host entry (`ssh_config`, `ssh_private_key_file`,
/// `timeout`, ...). Drivers pick the keys they understand and ignore the rest.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectParams {
    pub host: String,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ConnectParams {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: None,
            port: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// String view of an extra parameter; numbers and booleans are rendered.
    pub fn extra_str(&self, key: &str) -> Option<String> {
        match self.extra.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("port", &self.port)
            .field("extra", &self.extra)
            .finish()
    }
}

// ─── SshOptions ───────────────────────────────────────────────────────────

/// Driver-wide settings for [`crate::SshSessionFactory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshOptions {
    /// The `ssh` executable (name on `PATH` or absolute path).
    #[serde(default = "default_program")]
    pub program: String,
    /// Used as `sshpass -e <program> …` when the host has a password.
    #[serde(default = "default_sshpass_program")]
    pub sshpass_program: String,
    /// Command run once on open to prove the login works.
    #[serde(default = "default_probe_command")]
    pub probe_command: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u32,
    /// `true` → `StrictHostKeyChecking=yes`, `false` → `accept-new`.
    #[serde(default)]
    pub strict_host_key_checking: bool,
}

fn default_program() -> String {
    "ssh".to_string()
}

fn default_sshpass_program() -> String {
    "sshpass".to_string()
}

fn default_probe_command() -> String {
    "show version".to_string()
}

fn default_connect_timeout() -> u32 {
    30
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            program: default_program(),
            sshpass_program: default_sshpass_program(),
            probe_command: default_probe_command(),
            connect_timeout_secs: default_connect_timeout(),
            strict_host_key_checking: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let params = ConnectParams::new("r1", "admin").with_password("hunter2");
        let rendered = format!("{params:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn password_is_never_serialized() {
        let params = ConnectParams::new("r1", "admin").with_password("hunter2");
        let json = serde_json::to_string(&params).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn extra_str_renders_scalars() {
        let mut params = ConnectParams::new("r1", "admin");
        params
            .extra
            .insert("timeout".into(), serde_json::json!(15));
        params
            .extra
            .insert("ssh_config".into(), serde_json::json!("/tmp/cfg"));
        params
            .extra
            .insert("nested".into(), serde_json::json!({"a": 1}));
        assert_eq!(params.extra_str("timeout").as_deref(), Some("15"));
        assert_eq!(params.extra_str("ssh_config").as_deref(), Some("/tmp/cfg"));
        assert_eq!(params.extra_str("nested"), None);
        assert_eq!(params.extra_str("missing"), None);
    }

    #[test]
    fn ssh_options_defaults_from_empty_yaml() {
        let opts: SshOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, SshOptions::default());
        assert_eq!(opts.program, "ssh");
        assert_eq!(opts.connect_timeout_secs, 30);
    }
}
