//! Multi-host dispatch.
//!
//! ```text
//! DispatchContext (hosts, request, persistence)   immutable, shared by Arc
//!     │
//!     ▼
//! SessionOrchestrator::dispatch                   one tokio task per host,
//!     │                                           capped by a semaphore
//!     ├─ credentials → SessionFactory::open → (auth retry once)
//!     ├─ ActionDispatcher::act                    capture / compare / notify
//!     └─ session.close()
//!     │
//!     ▼
//! ResultAggregator::finish                        exactly one result per host
//! ```

pub mod action;
pub mod aggregate;
pub mod session;

use crate::capture::{CommandCapture, SnapshotCapture};
use crate::compare::{ReplyComparator, SnapshotComparator};
use crate::credentials::{CredentialProvider, InteractivePrompt};
use crate::notify::{LogNotifier, Notifier};
use crate::paths::DefaultPaths;
use crate::persistence::PersistenceConfig;
use crate::types::{ActionRequest, HostSpec};
use device_session::{SessionFactory, SshOptions, SshSessionFactory};
use std::sync::Arc;

pub use action::ActionDispatcher;
pub use aggregate::{ResultAggregator, ResultSink};
pub use session::SessionOrchestrator;

/// Everything one dispatch needs, validated before any worker starts.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub hosts: Vec<HostSpec>,
    pub request: ActionRequest,
    pub persistence: PersistenceConfig,
}

/// The pluggable capabilities the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionFactory>,
    pub capture: Arc<dyn SnapshotCapture>,
    pub comparator: Arc<dyn SnapshotComparator>,
    pub notifier: Arc<dyn Notifier>,
    pub credentials: Arc<dyn CredentialProvider>,
}

impl Collaborators {
    /// ssh transport, file/SQLite capture, reply comparison, log
    /// notification and console prompts.
    pub fn defaults(paths: &DefaultPaths, ssh: SshOptions) -> Self {
        Self {
            sessions: Arc::new(SshSessionFactory::new(ssh)),
            capture: Arc::new(CommandCapture::new(paths.clone())),
            comparator: Arc::new(ReplyComparator::new(paths.clone())),
            notifier: Arc::new(LogNotifier),
            credentials: Arc::new(InteractivePrompt::new()),
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionFactory>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Concurrent hosts. `0` means the width of the host list.
    pub max_parallel: usize,
    pub paths: DefaultPaths,
}

impl OrchestratorOptions {
    pub fn new(paths: DefaultPaths) -> Self {
        Self {
            max_parallel: 0,
            paths,
        }
    }

    pub(crate) fn permits(&self, hosts: usize) -> usize {
        match self.max_parallel {
            0 => hosts.max(1),
            n => n,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing;
