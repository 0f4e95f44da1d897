use async_trait::async_trait;
use tracing::debug;

use crate::process::{run_remote, SshInvocation};
use crate::session::{DeviceSession, SessionFactory};
use crate::types::{ConnectParams, SshOptions};
use crate::{Result, SessionError};

// ─── SshSessionFactory ────────────────────────────────────────────────────

/// Opens sessions by shelling out to the system `ssh` client.
///
/// Opening runs `probe_command` once; a rejected login surfaces as
/// [`SessionError::Auth`] and an unreachable host as
/// [`SessionError::Connection`]. A probe that reaches the device but exits
/// non-zero still counts as an open session.
pub struct SshSessionFactory {
    options: SshOptions,
}

impl SshSessionFactory {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    fn locate(&self, params: &ConnectParams) -> Result<()> {
        let program = if params.password.is_some() {
            &self.options.sshpass_program
        } else {
            &self.options.program
        };
        which::which(program).map_err(|_| SessionError::Connection {
            host: params.host.clone(),
            message: format!("'{program}' not found on PATH"),
        })?;
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for SshSessionFactory {
    async fn open(&self, params: &ConnectParams) -> Result<Box<dyn DeviceSession>> {
        self.locate(params)?;
        debug!(host = %params.host, user = %params.username, "probing device");

        let probe = SshInvocation::build(&self.options, params, &self.options.probe_command);
        match run_remote(&probe, &params.host).await {
            Ok(_) => {}
            Err(SessionError::Command { message, .. }) => {
                debug!(host = %params.host, %message, "probe command failed remotely; login accepted");
            }
            Err(e) => return Err(e),
        }

        Ok(Box::new(SshSession {
            params: params.clone(),
            options: self.options.clone(),
            closed: false,
        }))
    }
}

// ─── SshSession ───────────────────────────────────────────────────────────

/// A logical session: every command is its own `ssh` invocation using the
/// credentials that passed the probe.
pub struct SshSession {
    params: ConnectParams,
    options: SshOptions,
    closed: bool,
}

#[async_trait]
impl DeviceSession for SshSession {
    fn hostname(&self) -> &str {
        &self.params.host
    }

    async fn execute(&mut self, command: &str) -> Result<String> {
        if self.closed {
            return Err(SessionError::Closed(self.params.host.clone()));
        }
        debug!(host = %self.params.host, %command, "executing");
        let invocation = SshInvocation::build(&self.options, &self.params, command);
        run_remote(&invocation, &self.params.host).await
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
