use std::process::Stdio;

use tokio::process::Command;

use crate::types::{ConnectParams, SshOptions};
use crate::{Result, SessionError};

/// `sshpass` exit status for a rejected password.
const SSHPASS_BAD_PASSWORD: i32 = 5;
/// `ssh` exit status for any transport-level failure.
const SSH_ERROR: i32 = 255;

const AUTH_MARKERS: &[&str] = &[
    "Permission denied",
    "Authentication failed",
    "Too many authentication failures",
];

// ─── SshInvocation ────────────────────────────────────────────────────────

/// A fully-resolved `ssh` command line for one remote command.
///
/// Kept as plain data so the argument list can be inspected in tests without
/// spawning anything.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SshInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// `SSHPASS` value when the login goes through `sshpass -e`.
    pub sshpass_env: Option<String>,
}

impl SshInvocation {
    pub(crate) fn build(opts: &SshOptions, params: &ConnectParams, remote: &str) -> Self {
        let mut args = Vec::new();
        let (program, sshpass_env) = match &params.password {
            Some(pw) => {
                args.push("-e".to_string());
                args.push(opts.program.clone());
                (opts.sshpass_program.clone(), Some(pw.clone()))
            }
            None => (opts.program.clone(), None),
        };

        let mut option = |value: String| {
            args.push("-o".to_string());
            args.push(value);
        };

        if sshpass_env.is_some() {
            option("PubkeyAuthentication=no".into());
            option("PreferredAuthentications=password,keyboard-interactive".into());
            option("NumberOfPasswordPrompts=1".into());
        } else {
            option("BatchMode=yes".into());
        }

        let timeout = params
            .extra_str("timeout")
            .and_then(|t| t.parse::<u32>().ok())
            .unwrap_or(opts.connect_timeout_secs);
        option(format!("ConnectTimeout={timeout}"));
        option(format!(
            "StrictHostKeyChecking={}",
            if opts.strict_host_key_checking {
                "yes"
            } else {
                "accept-new"
            }
        ));

        if let Some(cfg) = params.extra_str("ssh_config") {
            args.push("-F".to_string());
            args.push(cfg);
        }
        if let Some(key) = params.extra_str("ssh_private_key_file") {
            args.push("-i".to_string());
            args.push(key);
        }
        if let Some(port) = params.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push("-l".to_string());
        args.push(params.username.clone());
        args.push(params.host.clone());
        args.push(remote.to_string());

        Self {
            program,
            args,
            sshpass_env,
        }
    }

    fn uses_sshpass(&self) -> bool {
        self.sshpass_env.is_some()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(pw) = &self.sshpass_env {
            cmd.env("SSHPASS", pw);
        }
        cmd
    }
}

// ─── Execution ────────────────────────────────────────────────────────────

/// Run `invocation` to completion and return its stdout.
pub(crate) async fn run_remote(invocation: &SshInvocation, host: &str) -> Result<String> {
    let output = invocation.to_command().output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SessionError::Connection {
                host: host.to_string(),
                message: format!("'{}' not found", invocation.program),
            }
        } else {
            SessionError::Io(e)
        }
    })?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let remote = invocation.args.last().cloned().unwrap_or_default();
    Err(classify_failure(
        host,
        &remote,
        output.status.code(),
        &stderr,
        invocation.uses_sshpass(),
    ))
}

/// Map a failed subprocess to the session error taxonomy.
///
/// `ssh` reports its own failures with 255; anything else is the remote
/// command's exit status. `sshpass` reports a wrong password with 5.
pub(crate) fn classify_failure(
    host: &str,
    remote: &str,
    code: Option<i32>,
    stderr: &str,
    via_sshpass: bool,
) -> SessionError {
    let message = if stderr.is_empty() {
        match code {
            Some(c) => format!("exited with code {c}"),
            None => "terminated by signal".to_string(),
        }
    } else {
        stderr.to_string()
    };

    let auth_marker = AUTH_MARKERS.iter().any(|m| stderr.contains(m));
    match code {
        Some(SSHPASS_BAD_PASSWORD) if via_sshpass => SessionError::Auth {
            host: host.to_string(),
            message,
        },
        Some(SSH_ERROR) if auth_marker => SessionError::Auth {
            host: host.to_string(),
            message,
        },
        Some(SSH_ERROR) | None => SessionError::Connection {
            host: host.to_string(),
            message,
        },
        // sshpass usage/runtime errors and unknown host keys
        Some(1..=3 | 6) if via_sshpass => SessionError::Connection {
            host: host.to_string(),
            message,
        },
        Some(_) => SessionError::Command {
            host: host.to_string(),
            command: remote.to_string(),
            message,
        },
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectParams {
        ConnectParams::new("r1.lab", "netops")
    }

    #[test]
    fn key_based_login_uses_batch_mode() {
        let inv = SshInvocation::build(&SshOptions::default(), &params(), "show version");
        assert_eq!(inv.program, "ssh");
        assert!(inv.sshpass_env.is_none());
        assert!(inv.args.contains(&"BatchMode=yes".to_string()));
        assert!(inv.args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        let tail: Vec<&str> = inv.args.iter().rev().take(4).map(|s| s.as_str()).collect();
        assert_eq!(tail, vec!["show version", "r1.lab", "netops", "-l"]);
    }

    #[test]
    fn password_login_goes_through_sshpass() {
        let p = params().with_password("s3cret");
        let inv = SshInvocation::build(&SshOptions::default(), &p, "show version");
        assert_eq!(inv.program, "sshpass");
        assert_eq!(inv.args[0], "-e");
        assert_eq!(inv.args[1], "ssh");
        assert_eq!(inv.sshpass_env.as_deref(), Some("s3cret"));
        assert!(!inv.args.iter().any(|a| a.contains("s3cret")));
        assert!(!inv.args.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn port_and_extras_are_forwarded() {
        let mut p = params().with_port(830);
        p.extra
            .insert("ssh_config".into(), serde_json::json!("/etc/ssh/lab.cfg"));
        p.extra
            .insert("ssh_private_key_file".into(), serde_json::json!("/keys/id"));
        p.extra.insert("timeout".into(), serde_json::json!(5));
        p.extra.insert("unknown".into(), serde_json::json!("ignored"));

        let inv = SshInvocation::build(&SshOptions::default(), &p, "show chassis");
        let joined = inv.args.join(" ");
        assert!(joined.contains("-p 830"));
        assert!(joined.contains("-F /etc/ssh/lab.cfg"));
        assert!(joined.contains("-i /keys/id"));
        assert!(joined.contains("ConnectTimeout=5"));
        assert!(!joined.contains("ignored"));
    }

    #[test]
    fn strict_host_key_checking_flag() {
        let opts = SshOptions {
            strict_host_key_checking: true,
            ..Default::default()
        };
        let inv = SshInvocation::build(&opts, &params(), "x");
        assert!(inv.args.contains(&"StrictHostKeyChecking=yes".to_string()));
    }

    #[test]
    fn classify_permission_denied_as_auth() {
        let err = classify_failure(
            "r1",
            "show version",
            Some(255),
            "netops@r1: Permission denied (publickey,password).",
            false,
        );
        assert!(err.is_auth());
    }

    #[test]
    fn classify_sshpass_wrong_password_as_auth() {
        let err = classify_failure("r1", "show version", Some(5), "", true);
        assert!(err.is_auth());
    }

    #[test]
    fn classify_unreachable_as_connection() {
        let err = classify_failure(
            "r1",
            "show version",
            Some(255),
            "ssh: connect to host r1 port 22: Connection refused",
            false,
        );
        assert!(matches!(err, SessionError::Connection { .. }));
    }

    #[test]
    fn classify_remote_exit_as_command_error() {
        let err = classify_failure("r1", "show bogus", Some(1), "syntax error", false);
        match err {
            SessionError::Command {
                command, message, ..
            } => {
                assert_eq!(command, "show bogus");
                assert_eq!(message, "syntax error");
            }
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn exit_code_five_without_sshpass_is_remote() {
        let err = classify_failure("r1", "cmd", Some(5), "", false);
        assert!(matches!(err, SessionError::Command { .. }));
    }
}
