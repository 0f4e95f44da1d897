use crate::config::{ConfigSource, MainConfig};
use crate::error::Result;
use crate::hosts::{CliCredentials, HostResolver};
use crate::orchestrator::{
    ActionDispatcher, Collaborators, DispatchContext, OrchestratorOptions, SessionOrchestrator,
};
use crate::paths::DefaultPaths;
use crate::persistence::PersistencePolicy;
use crate::settings::Settings;
use crate::types::{
    ActionKind, ActionRequest, HostSpec, OrchestrationResult, SessionResult, SessionStatus,
};
use device_session::DeviceSession;
use std::sync::Arc;

/// Embeddable entry point.
///
/// ```rust,ignore
/// let admin = SnapAdmin::from_settings(&Settings::load(None)?);
/// admin.snapshot("main.yml", "pre", None).await?;
/// // ... change window ...
/// admin.snapshot("main.yml", "post", None).await?;
/// let report = admin.check("main.yml", Some("pre"), Some("post"), None).await?;
/// ```
///
/// Passing an already-open session skips host resolution: the work runs on
/// that session only and the session is left open for the caller.
pub struct SnapAdmin {
    paths: DefaultPaths,
    collaborators: Collaborators,
    max_parallel: usize,
    credentials: CliCredentials,
}

impl SnapAdmin {
    pub fn new(paths: DefaultPaths, collaborators: Collaborators) -> Self {
        Self {
            paths,
            collaborators,
            max_parallel: 0,
            credentials: CliCredentials::default(),
        }
    }

    /// Default collaborators over the directories and ssh options in
    /// `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let paths = settings.default_paths();
        let collaborators = Collaborators::defaults(&paths, settings.ssh.clone());
        let mut admin = Self::new(paths, collaborators);
        admin.max_parallel = settings.dispatch.max_parallel;
        admin
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Fallback credentials for hosts whose entries carry none.
    pub fn with_credentials(mut self, credentials: CliCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn paths(&self) -> &DefaultPaths {
        &self.paths
    }

    pub async fn snapshot(
        &self,
        data: impl Into<ConfigSource>,
        label: &str,
        session: Option<&mut dyn DeviceSession>,
    ) -> Result<OrchestrationResult> {
        let config = data.into().load(&self.paths)?;
        self.run(ActionKind::Snapshot, config, Some(label), None, None, session)
            .await
    }

    /// Capture and evaluate in one step. Without a label the capture goes to
    /// a temporary snapshot that is removed afterwards.
    pub async fn snapcheck(
        &self,
        data: impl Into<ConfigSource>,
        label: Option<&str>,
        session: Option<&mut dyn DeviceSession>,
    ) -> Result<OrchestrationResult> {
        let config = data.into().load(&self.paths)?;
        self.run(ActionKind::SnapCheck, config, label, None, None, session)
            .await
    }

    pub async fn check(
        &self,
        data: impl Into<ConfigSource>,
        pre: Option<&str>,
        post: Option<&str>,
        session: Option<&mut dyn DeviceSession>,
    ) -> Result<OrchestrationResult> {
        let config = data.into().load(&self.paths)?;
        self.run(ActionKind::Check, config, pre, post, None, session)
            .await
    }

    pub async fn diff(
        &self,
        data: impl Into<ConfigSource>,
        pre: Option<&str>,
        post: Option<&str>,
    ) -> Result<OrchestrationResult> {
        let config = data.into().load(&self.paths)?;
        self.run(ActionKind::Diff, config, pre, post, None, None)
            .await
    }

    /// Validate, resolve and dispatch. Configuration errors are returned
    /// before any session is opened; per-host failures are reported in the
    /// result.
    pub async fn run(
        &self,
        kind: ActionKind,
        config: MainConfig,
        pre: Option<&str>,
        post: Option<&str>,
        hostname_override: Option<&str>,
        session: Option<&mut dyn DeviceSession>,
    ) -> Result<OrchestrationResult> {
        let persistence = PersistencePolicy::validate(&config, pre, post, kind)?;
        let request = ActionRequest::new(
            kind,
            pre.map(str::to_string),
            post.map(str::to_string),
            config,
        );

        if let Some(session) = session {
            let hostname = session.hostname().to_string();
            let ctx = DispatchContext {
                hosts: vec![HostSpec::new(&hostname)],
                request,
                persistence,
            };
            return Ok(self.act_on(session, &ctx, &hostname).await);
        }

        let hosts = HostResolver::new(&self.paths).resolve(
            &request.config,
            hostname_override,
            &self.credentials,
        )?;
        let ctx = Arc::new(DispatchContext {
            hosts,
            request,
            persistence,
        });
        let options = OrchestratorOptions {
            max_parallel: self.max_parallel,
            paths: self.paths.clone(),
        };
        Ok(SessionOrchestrator::new(self.collaborators.clone(), options)
            .dispatch(ctx)
            .await)
    }

    async fn act_on(
        &self,
        session: &mut dyn DeviceSession,
        ctx: &DispatchContext,
        hostname: &str,
    ) -> OrchestrationResult {
        let dispatcher = ActionDispatcher::new(self.collaborators.clone(), self.paths.clone());
        let session = ctx.request.kind.needs_session().then_some(session);
        let result = match dispatcher.act(session, ctx, hostname).await {
            Ok(payload) => SessionResult::succeeded(hostname, payload),
            Err(e) => {
                tracing::error!(host = %hostname, error = %e, "action failed");
                SessionResult::failed(hostname, SessionStatus::ActionFailed, e.to_string())
            }
        };
        OrchestrationResult {
            results: vec![result],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use crate::error::SnapError;
    use crate::orchestrator::testing::{paths, write_fixture, FakeFactory};
    use crate::types::SessionPayload;
    use device_session::SessionFactory;
    use device_session::ConnectParams;
    use tempfile::TempDir;

    fn admin(dir: &TempDir, factory: Arc<FakeFactory>) -> SnapAdmin {
        let paths = paths(dir);
        let collaborators = Collaborators::defaults(&paths, Default::default())
            .with_sessions(factory)
            .with_credentials(Arc::new(StaticCredentials {
                username: Some("ops".into()),
                password: None,
                mail_password: None,
            }));
        SnapAdmin::new(paths, collaborators)
    }

    fn main_config(dir: &TempDir) -> MainConfig {
        let mut config = write_fixture(dir);
        config.hosts = vec![serde_yaml::from_str("device: r1\nusername: ops\n").unwrap()];
        config
    }

    #[tokio::test]
    async fn snapshot_then_snapcheck_has_no_differences() {
        let dir = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::default());
        let admin = admin(&dir, factory.clone());
        let config = main_config(&dir);

        let snap = admin.snapshot(config.clone(), "pre", None).await.unwrap();
        assert!(snap.all_succeeded());
        let capture = snap.results[0].capture().unwrap();
        assert_eq!(capture.replies.len(), 2);

        let checked = admin.snapcheck(config, Some("pre"), None).await.unwrap();
        let results = checked.results[0].test_results().unwrap();
        assert_eq!(results.differences(), 0);
        assert!(results.all_passed());
    }

    #[tokio::test]
    async fn snapshot_pre_and_post_then_check_passes() {
        let dir = TempDir::new().unwrap();
        let admin = admin(&dir, Arc::new(FakeFactory::default()));
        let config = main_config(&dir);

        admin.snapshot(config.clone(), "pre", None).await.unwrap();
        admin.snapshot(config.clone(), "post", None).await.unwrap();
        let checked = admin
            .check(config, Some("pre"), Some("post"), None)
            .await
            .unwrap();
        let results = checked.results[0].test_results().unwrap();
        assert_eq!(results.outcomes.len(), 2);
        assert!(results.all_passed());
    }

    #[tokio::test]
    async fn snapcheck_without_label_removes_temporary_files() {
        let dir = TempDir::new().unwrap();
        let admin = admin(&dir, Arc::new(FakeFactory::default()));

        let checked = admin.snapcheck(main_config(&dir), None, None).await.unwrap();
        assert!(checked.results[0].test_results().unwrap().all_passed());

        let leftovers = std::fs::read_dir(&admin.paths().snapshot_dir)
            .map(|d| d.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn check_with_supplied_session_opens_nothing() {
        let dir = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::default());
        let admin = admin(&dir, factory.clone());
        let mut session = FakeFactory::default()
            .open(&ConnectParams::new("r9", "ops"))
            .await
            .unwrap();

        let result = admin
            .check(main_config(&dir), Some("pre"), Some("post"), Some(session.as_mut()))
            .await
            .unwrap();

        assert_eq!(factory.opened(), 0);
        assert_eq!(result.len(), 1);
        assert_eq!(result.results[0].hostname, "r9");
        assert!(matches!(result.results[0].payload, SessionPayload::Tested { .. }));
    }

    #[tokio::test]
    async fn snapshot_with_supplied_session_leaves_it_open() {
        let dir = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::default());
        let admin = admin(&dir, factory.clone());
        let source = FakeFactory::default();
        let mut session = source.open(&ConnectParams::new("r9", "ops")).await.unwrap();

        let result = admin
            .snapshot(main_config(&dir), "pre", Some(session.as_mut()))
            .await
            .unwrap();

        assert!(result.all_succeeded());
        assert_eq!(factory.opened(), 0);
        assert_eq!(source.closed(), 0);
        assert!(session.execute("show version").await.is_ok());
    }

    #[tokio::test]
    async fn bad_compare_ids_fail_before_any_session() {
        let dir = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::default());
        let admin = admin(&dir, factory.clone());
        let text = "hosts:\n  - device: r1\nsqlite:\n  - check_from_sqlite: true\n    database_name: s.db\n    compare: \"3,x\"\n";

        let err = admin.check(text, None, None, None).await.unwrap_err();
        assert!(matches!(err, SnapError::InvalidCompareIds(_)));
        assert_eq!(factory.attempts("r1"), 0);
    }

    #[tokio::test]
    async fn snapshot_without_label_fails_before_any_session() {
        let dir = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::default());
        let admin = admin(&dir, factory.clone());

        let err = admin
            .run(ActionKind::Snapshot, main_config(&dir), None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapError::MissingSnapshotName { .. }));
        let err = admin.snapshot(main_config(&dir), "", None).await.unwrap_err();
        assert!(err.is_configuration());

        assert_eq!(factory.attempts("r1"), 0);
        assert!(!paths(&dir).snapshot_dir.exists());
    }

    #[tokio::test]
    async fn missing_config_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let admin = admin(&dir, Arc::new(FakeFactory::default()));
        let err = admin.snapshot("absent.yml", "pre", None).await.unwrap_err();
        assert!(matches!(err, SnapError::ConfigNotFound(_)));
    }

    #[tokio::test]
    async fn inline_text_config_is_accepted() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir);
        let admin = admin(&dir, Arc::new(FakeFactory::default()));
        let text = "hosts:\n  - device: r1\n    username: ops\ntests:\n  - test_version.yml\n";
        let result = admin.snapshot(text, "pre", None).await.unwrap();
        assert!(result.all_succeeded());
    }
}
