use super::aggregate::ResultAggregator;
use super::{ActionDispatcher, Collaborators, DispatchContext, OrchestratorOptions};
use crate::credentials::CredentialProvider;
use crate::error::SnapError;
use crate::types::{HostSpec, OrchestrationResult, SessionResult, SessionStatus};
use device_session::{ConnectParams, DeviceSession};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Fans one dispatch out over its hosts and collects one result per host.
pub struct SessionOrchestrator {
    collaborators: Collaborators,
    options: OrchestratorOptions,
    locks: Arc<HostLocks>,
}

impl SessionOrchestrator {
    pub fn new(collaborators: Collaborators, options: OrchestratorOptions) -> Self {
        Self {
            collaborators,
            options,
            locks: Arc::new(HostLocks::default()),
        }
    }

    pub async fn dispatch(&self, ctx: Arc<DispatchContext>) -> OrchestrationResult {
        let kind = ctx.request.kind;
        let expected = ctx.hosts.len();
        let permits = self.options.permits(expected);
        tracing::info!(action = %kind, hosts = expected, max_parallel = permits, "dispatching");

        let semaphore = Arc::new(Semaphore::new(permits));
        let (sink, aggregator) = ResultAggregator::channel();
        let worker = HostWorker {
            dispatcher: ActionDispatcher::new(
                self.collaborators.clone(),
                self.options.paths.clone(),
            ),
            collaborators: self.collaborators.clone(),
        };

        let mut handles = Vec::with_capacity(expected);
        for index in 0..expected {
            let hostname = ctx.hosts[index].hostname.clone();
            let host_lock = self.locks.lock_for(&hostname);
            let sem = semaphore.clone();
            let worker = worker.clone();
            let ctx = ctx.clone();
            let sink = sink.clone();
            let handle = tokio::spawn(async move {
                let host = &ctx.hosts[index];
                // Duplicate entries for one host never hold two sessions.
                let _host_guard = host_lock.lock().await;
                let result = match sem.acquire().await {
                    Ok(_permit) => worker.run(&ctx, host).await,
                    Err(_) => SessionResult::failed(
                        &host.hostname,
                        SessionStatus::ActionFailed,
                        "dispatch semaphore closed",
                    ),
                };
                sink.send(ctx.request.kind, result);
            });
            handles.push((hostname, handle));
        }

        let (hostnames, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        for (hostname, joined) in hostnames.into_iter().zip(join_all(handles).await) {
            if let Err(e) = joined {
                tracing::error!(host = %hostname, error = %e, "host worker aborted");
                sink.send(
                    kind,
                    SessionResult::failed(
                        hostname,
                        SessionStatus::ActionFailed,
                        format!("worker aborted: {e}"),
                    ),
                );
            }
        }
        drop(sink);

        let result = aggregator.finish(kind, expected).await;
        tracing::info!(
            action = %kind,
            succeeded = result.succeeded(),
            failed = result.len() - result.succeeded(),
            "dispatch finished"
        );
        result
    }
}

// ---------------------------------------------------------------------------
// Per-host worker
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct HostWorker {
    dispatcher: ActionDispatcher,
    collaborators: Collaborators,
}

impl HostWorker {
    async fn run(&self, ctx: &DispatchContext, host: &HostSpec) -> SessionResult {
        let hostname = host.hostname.as_str();

        if !ctx.request.kind.needs_session() {
            tracing::debug!(host = %hostname, state = "acting", "no session needed");
            return self.finish(hostname, self.dispatcher.act(None, ctx, hostname).await);
        }

        let mut session = match self.connect(host).await {
            Ok(s) => s,
            Err(failed) => return failed,
        };

        tracing::debug!(host = %hostname, state = "acting");
        let outcome = self
            .dispatcher
            .act(Some(session.as_mut()), ctx, hostname)
            .await;

        if let Err(e) = session.close().await {
            tracing::warn!(host = %hostname, error = %e, "closing session failed");
        }
        self.finish(hostname, outcome)
    }

    fn finish(
        &self,
        hostname: &str,
        outcome: crate::Result<crate::types::SessionPayload>,
    ) -> SessionResult {
        match outcome {
            Ok(payload) => {
                tracing::debug!(host = %hostname, state = "succeeded");
                SessionResult::succeeded(hostname, payload)
            }
            Err(e) => {
                tracing::error!(host = %hostname, error = %e, "action failed");
                SessionResult::failed(hostname, SessionStatus::ActionFailed, e.to_string())
            }
        }
    }

    /// Open a session, refreshing the password and retrying once when the
    /// device rejects a login that had no password.
    async fn connect(
        &self,
        host: &HostSpec,
    ) -> std::result::Result<Box<dyn DeviceSession>, SessionResult> {
        let hostname = host.hostname.as_str();
        let auth_failed = |message: String| {
            tracing::error!(host = %hostname, error = %message, "authentication failed");
            SessionResult::failed(hostname, SessionStatus::AuthFailed, message)
        };

        let username = match &host.username {
            Some(u) => u.clone(),
            None => {
                let creds = self.collaborators.credentials.clone();
                let h = hostname.to_string();
                prompt(creds, move |c| c.username(&h))
                    .await
                    .map_err(|e| auth_failed(e.to_string()))?
            }
        };

        let mut params = ConnectParams::new(hostname, username);
        params.password = host.password.clone();
        params.port = host.port;
        params.extra = host.extra.clone();

        let mut retried = false;
        loop {
            tracing::debug!(host = %hostname, state = "connecting", retry = retried);
            match self.collaborators.sessions.open(&params).await {
                Ok(session) => {
                    tracing::debug!(host = %hostname, state = "connected");
                    return Ok(session);
                }
                Err(e) if e.is_auth() && params.password.is_none() && !retried => {
                    tracing::debug!(host = %hostname, state = "auth_failed", "asking for password");
                    retried = true;
                    let creds = self.collaborators.credentials.clone();
                    let (h, u) = (params.host.clone(), params.username.clone());
                    let password = prompt(creds, move |c| c.password(&h, &u))
                        .await
                        .map_err(|e| auth_failed(e.to_string()))?;
                    params.password = Some(password);
                }
                Err(e) if e.is_auth() => return Err(auth_failed(e.to_string())),
                Err(e) => {
                    tracing::error!(host = %hostname, error = %e, "connection failed");
                    return Err(SessionResult::failed(
                        hostname,
                        SessionStatus::ConnectionFailed,
                        e.to_string(),
                    ));
                }
            }
        }
    }
}

/// Run a blocking credential request off the async workers.
async fn prompt<F>(creds: Arc<dyn CredentialProvider>, f: F) -> crate::Result<String>
where
    F: FnOnce(&dyn CredentialProvider) -> crate::Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(creds.as_ref()))
        .await
        .map_err(|e| SnapError::Prompt(e.to_string()))?
}

// ---------------------------------------------------------------------------
// HostLocks
// ---------------------------------------------------------------------------

/// One async mutex per hostname.
#[derive(Default)]
struct HostLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl HostLocks {
    fn lock_for(&self, hostname: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = match self.inner.lock() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(hostname.to_string()).or_default().clone()
    }
}
