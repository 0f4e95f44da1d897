//! Host resolution: main config `hosts` entries (plus an optional CLI
//! hostname) into an ordered list of [`HostSpec`].

use crate::config::MainConfig;
use crate::error::{Result, SnapError};
use crate::paths::DefaultPaths;
use crate::types::HostSpec;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// Keys consumed by the resolver; everything else is passed to the session.
const RESERVED_KEYS: &[&str] = &["device", "username", "passwd"];
const ALL_GROUPS: &str = "all";

/// Credentials given out-of-band (CLI `-l`, `-p`, `-P`).
#[derive(Debug, Clone, Default)]
pub struct CliCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
}

pub struct HostResolver<'a> {
    paths: &'a DefaultPaths,
}

impl<'a> HostResolver<'a> {
    pub fn new(paths: &'a DefaultPaths) -> Self {
        Self { paths }
    }

    /// Resolve every target host. An explicit `hostname_override` wins over
    /// the config and yields exactly one host.
    pub fn resolve(
        &self,
        config: &MainConfig,
        hostname_override: Option<&str>,
        cli: &CliCredentials,
    ) -> Result<Vec<HostSpec>> {
        if let Some(hostname) = hostname_override {
            let mut host = HostSpec::new(hostname);
            host.username = cli.username.clone();
            host.password = cli.password.clone();
            host.port = cli.port;
            return Ok(vec![host]);
        }

        if config.hosts.is_empty() {
            return Err(SnapError::HostsMissing(
                "no 'hosts' entries and no hostname given".to_string(),
            ));
        }

        let mut hosts = Vec::new();
        for entry in &config.hosts {
            if let Some(include) = entry.get("include") {
                let file = scalar_string(include).ok_or_else(|| {
                    SnapError::InvalidConfig("'include' must be a file name".to_string())
                })?;
                let groups = entry.get("group").and_then(scalar_string);
                hosts.extend(self.resolve_group_file(&file, groups.as_deref(), cli)?);
            } else {
                hosts.push(inline_host(entry, cli)?);
            }
        }
        tracing::debug!(count = hosts.len(), "resolved hosts");
        Ok(hosts)
    }

    fn resolve_group_file(
        &self,
        file: &str,
        groups: Option<&str>,
        cli: &CliCredentials,
    ) -> Result<Vec<HostSpec>> {
        let path = self
            .paths
            .test_file(file)
            .ok_or_else(|| SnapError::GroupFileNotFound(file.to_string()))?;
        let doc: Value = crate::io::read_yaml(&path)?;
        let Value::Mapping(doc) = doc else {
            return Err(SnapError::InvalidConfig(format!(
                "host group file '{file}' must map group names to host lists"
            )));
        };
        let wanted = parse_group_filter(groups.unwrap_or(ALL_GROUPS));
        filter_groups(&doc, &wanted, cli)
    }
}

// ---------------------------------------------------------------------------
// Group filtering
// ---------------------------------------------------------------------------

/// Lower-cased, trimmed group names. `None` means every group.
fn parse_group_filter(raw: &str) -> Option<Vec<String>> {
    let names: Vec<String> = raw
        .split(',')
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty())
        .collect();
    if names.is_empty() || names.iter().any(|g| g == ALL_GROUPS) {
        None
    } else {
        Some(names)
    }
}

fn filter_groups(
    doc: &Mapping,
    wanted: &Option<Vec<String>>,
    cli: &CliCredentials,
) -> Result<Vec<HostSpec>> {
    let mut hosts = Vec::new();
    for (name, members) in doc {
        let Some(name) = scalar_string(name) else {
            continue;
        };
        if let Some(wanted) = wanted {
            if !wanted.contains(&name.to_lowercase()) {
                continue;
            }
        }
        let Some(members) = members.as_sequence() else {
            tracing::warn!(group = %name, "group is not a list of hosts; skipping");
            continue;
        };
        for member in members {
            let mut host = group_member(member, cli)?;
            host.group = Some(name.clone());
            hosts.push(host);
        }
    }
    Ok(hosts)
}

/// One `{hostname: {username, passwd, ...}}` item of a group.
fn group_member(member: &Value, cli: &CliCredentials) -> Result<HostSpec> {
    let map = member.as_mapping().ok_or_else(|| {
        SnapError::InvalidConfig("group members must be '<hostname>: {...}' mappings".to_string())
    })?;
    let (hostname, params) = map.iter().next().ok_or_else(|| {
        SnapError::InvalidConfig("empty group member".to_string())
    })?;
    let hostname = scalar_string(hostname)
        .ok_or_else(|| SnapError::InvalidConfig("group member without a hostname".to_string()))?;
    let empty = Mapping::new();
    let params = params.as_mapping().unwrap_or(&empty);
    build_host(hostname, params, cli)
}

fn inline_host(entry: &Mapping, cli: &CliCredentials) -> Result<HostSpec> {
    let hostname = entry
        .get("device")
        .and_then(scalar_string)
        .ok_or(SnapError::MissingDevice)?;
    build_host(hostname, entry, cli)
}

/// Entry values win over CLI values; reserved keys are stripped and `port`
/// is lifted out of the extras.
fn build_host(hostname: String, params: &Mapping, cli: &CliCredentials) -> Result<HostSpec> {
    let mut host = HostSpec::new(hostname);
    host.username = params
        .get("username")
        .and_then(scalar_string)
        .or_else(|| cli.username.clone());
    host.password = params
        .get("passwd")
        .and_then(scalar_string)
        .or_else(|| cli.password.clone());

    let mut extra = BTreeMap::new();
    for (k, v) in params {
        let Some(key) = scalar_string(k) else {
            continue;
        };
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if key == "port" {
            host.port = Some(parse_port(&host.hostname, v)?);
            continue;
        }
        extra.insert(key, serde_json::to_value(v)?);
    }
    if host.port.is_none() {
        host.port = cli.port;
    }
    host.extra = extra;
    Ok(host)
}

fn parse_port(hostname: &str, v: &Value) -> Result<u16> {
    scalar_string(v)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| SnapError::InvalidConfig(format!("invalid port for {hostname}")))
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DEVICES: &str = "\
CORE:
  - r1:
      username: core-admin
      passwd: secret
  - r2:
      port: 830
EDGE:
  - e1:
      username: edge-admin
      timeout: 15
  - e2:
  - e3:
      username: edge-admin
";

    fn setup() -> (TempDir, DefaultPaths) {
        let dir = TempDir::new().unwrap();
        let paths = DefaultPaths::rooted_at(dir.path());
        std::fs::create_dir_all(&paths.testfile_dir).unwrap();
        std::fs::write(paths.testfile_dir.join("devices.yml"), DEVICES).unwrap();
        (dir, paths)
    }

    fn config(yaml: &str) -> MainConfig {
        MainConfig::from_yaml(yaml).unwrap()
    }

    fn names(hosts: &[HostSpec]) -> Vec<&str> {
        hosts.iter().map(|h| h.hostname.as_str()).collect()
    }

    #[test]
    fn group_all_yields_every_host() {
        let (_dir, paths) = setup();
        let cfg = config("hosts:\n  - include: devices.yml\n    group: all\n");
        let hosts = HostResolver::new(&paths)
            .resolve(&cfg, None, &CliCredentials::default())
            .unwrap();
        assert_eq!(names(&hosts), vec!["r1", "r2", "e1", "e2", "e3"]);
    }

    #[test]
    fn absent_group_means_all() {
        let (_dir, paths) = setup();
        let cfg = config("hosts:\n  - include: devices.yml\n");
        let hosts = HostResolver::new(&paths)
            .resolve(&cfg, None, &CliCredentials::default())
            .unwrap();
        assert_eq!(hosts.len(), 5);
    }

    #[test]
    fn group_filter_is_case_insensitive() {
        let (_dir, paths) = setup();
        let cfg = config("hosts:\n  - include: devices.yml\n    group: Core\n");
        let hosts = HostResolver::new(&paths)
            .resolve(&cfg, None, &CliCredentials::default())
            .unwrap();
        assert_eq!(names(&hosts), vec!["r1", "r2"]);
        assert!(hosts.iter().all(|h| h.group.as_deref() == Some("CORE")));
    }

    #[test]
    fn unknown_group_yields_empty_list() {
        let (_dir, paths) = setup();
        let cfg = config("hosts:\n  - include: devices.yml\n    group: spine\n");
        let hosts = HostResolver::new(&paths)
            .resolve(&cfg, None, &CliCredentials::default())
            .unwrap();
        assert!(hosts.is_empty());
    }

    #[test]
    fn group_entries_fall_back_to_cli_credentials() {
        let (_dir, paths) = setup();
        let cfg = config("hosts:\n  - include: devices.yml\n    group: edge, core\n");
        let cli = CliCredentials {
            username: Some("ops".into()),
            password: Some("pw".into()),
            port: Some(2222),
        };
        let hosts = HostResolver::new(&paths).resolve(&cfg, None, &cli).unwrap();
        let by_name = |n: &str| hosts.iter().find(|h| h.hostname == n).unwrap();

        assert_eq!(by_name("r1").username.as_deref(), Some("core-admin"));
        assert_eq!(by_name("r1").password.as_deref(), Some("secret"));
        assert_eq!(by_name("r2").port, Some(830));
        assert_eq!(by_name("e2").username.as_deref(), Some("ops"));
        assert_eq!(by_name("e2").port, Some(2222));
        assert_eq!(by_name("e1").extra["timeout"], serde_json::json!(15));
        assert!(!by_name("r1").extra.contains_key("passwd"));
    }

    #[test]
    fn inline_host_strips_reserved_keys() {
        let (_dir, paths) = setup();
        let cfg = config(
            "hosts:\n  - device: 10.0.0.1\n    username: admin\n    passwd: x\n    port: 22\n    ssh_config: /tmp/cfg\n",
        );
        let hosts = HostResolver::new(&paths)
            .resolve(&cfg, None, &CliCredentials::default())
            .unwrap();
        assert_eq!(hosts.len(), 1);
        let h = &hosts[0];
        assert_eq!(h.hostname, "10.0.0.1");
        assert_eq!(h.username.as_deref(), Some("admin"));
        assert_eq!(h.port, Some(22));
        assert_eq!(h.group, None);
        assert_eq!(h.extra.len(), 1);
        assert_eq!(h.extra["ssh_config"], serde_json::json!("/tmp/cfg"));
    }

    #[test]
    fn inline_host_without_device_is_fatal() {
        let (_dir, paths) = setup();
        let cfg = config("hosts:\n  - username: admin\n");
        let err = HostResolver::new(&paths)
            .resolve(&cfg, None, &CliCredentials::default())
            .unwrap_err();
        assert!(matches!(err, SnapError::MissingDevice));
        assert!(err.is_configuration());
    }

    #[test]
    fn missing_group_file_is_fatal() {
        let (_dir, paths) = setup();
        let cfg = config("hosts:\n  - include: nowhere.yml\n");
        let err = HostResolver::new(&paths)
            .resolve(&cfg, None, &CliCredentials::default())
            .unwrap_err();
        assert!(matches!(err, SnapError::GroupFileNotFound(ref f) if f == "nowhere.yml"));
    }

    #[test]
    fn cli_hostname_overrides_config() {
        let (_dir, paths) = setup();
        let cfg = config("hosts:\n  - include: devices.yml\n");
        let cli = CliCredentials {
            username: Some("ops".into()),
            password: None,
            port: Some(830),
        };
        let hosts = HostResolver::new(&paths)
            .resolve(&cfg, Some("lab-r9"), &cli)
            .unwrap();
        assert_eq!(names(&hosts), vec!["lab-r9"]);
        assert_eq!(hosts[0].port, Some(830));
        assert_eq!(hosts[0].username.as_deref(), Some("ops"));
    }

    #[test]
    fn empty_hosts_without_override_is_fatal() {
        let (_dir, paths) = setup();
        let err = HostResolver::new(&paths)
            .resolve(&MainConfig::default(), None, &CliCredentials::default())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn entries_are_processed_in_order() {
        let (_dir, paths) = setup();
        let cfg = config(
            "hosts:\n  - device: first\n  - include: devices.yml\n    group: core\n  - device: last\n",
        );
        let hosts = HostResolver::new(&paths)
            .resolve(&cfg, None, &CliCredentials::default())
            .unwrap();
        assert_eq!(names(&hosts), vec!["first", "r1", "r2", "last"]);
    }
}
