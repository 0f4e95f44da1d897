use super::{Collaborators, DispatchContext};
use crate::compare::CompareRequest;
use crate::error::{Result, SnapError};
use crate::notify::NotificationSettings;
use crate::paths::{DefaultPaths, TEMP_SNAPSHOT_LABEL};
use crate::store::{FileStore, SqliteStore};
use crate::testdef::{self, TestDefinition};
use crate::types::{ActionKind, CaptureHandle, SessionPayload, TestResultSet};
use device_session::DeviceSession;

/// Routes one host through capture, comparison and notification.
#[derive(Clone)]
pub struct ActionDispatcher {
    collaborators: Collaborators,
    paths: DefaultPaths,
}

impl ActionDispatcher {
    pub fn new(collaborators: Collaborators, paths: DefaultPaths) -> Self {
        Self {
            collaborators,
            paths,
        }
    }

    /// `session` is required for Snapshot and SnapCheck and ignored
    /// otherwise.
    pub async fn act(
        &self,
        session: Option<&mut dyn DeviceSession>,
        ctx: &DispatchContext,
        hostname: &str,
    ) -> Result<SessionPayload> {
        let kind = ctx.request.kind;
        let definitions = testdef::resolve_all(&ctx.request.config.tests, &self.paths)?;

        let (capture_label, temporary) = match ctx.request.pre_label.as_deref() {
            Some(label) if !label.trim().is_empty() => (label.to_string(), false),
            _ if kind == ActionKind::Snapshot => {
                return Err(SnapError::MissingSnapshotName {
                    action: kind.as_str().to_string(),
                })
            }
            _ => (TEMP_SNAPSHOT_LABEL.to_string(), kind == ActionKind::SnapCheck),
        };

        let mut last_capture = None;
        if kind.captures() {
            let session = session.ok_or_else(|| {
                SnapError::Capture(format!("{kind} on {hostname} needs an open session"))
            })?;
            let captured = self
                .capture_all(session, ctx, &definitions, &capture_label)
                .await;
            if temporary && captured.is_err() {
                self.remove_temporary(ctx, hostname, &definitions, &capture_label);
            }
            last_capture = captured?;
        }

        if kind == ActionKind::Snapshot {
            return Ok(SessionPayload::Captured {
                capture: last_capture,
            });
        }

        let request = CompareRequest {
            hostname: hostname.to_string(),
            action: kind,
            definitions: definitions.clone(),
            pre_label: match kind {
                ActionKind::SnapCheck => Some(capture_label.clone()),
                _ => ctx.request.pre_label.clone(),
            },
            post_label: ctx.request.post_label.clone(),
            persistence: ctx.persistence.clone(),
        };
        let compared = self.collaborators.comparator.compare(request).await;

        if temporary {
            self.remove_temporary(ctx, hostname, &definitions, &capture_label);
        }
        let results = compared?;

        if kind.notifies() {
            if let Some(mail) = ctx.request.config.mail.as_deref() {
                if let Err(e) = self.notify(mail, &results).await {
                    tracing::error!(host = %hostname, error = %e, "notification failed");
                }
            }
        }

        Ok(SessionPayload::Tested { results })
    }

    /// Captures every definition in order; the last handle wins.
    async fn capture_all(
        &self,
        session: &mut dyn DeviceSession,
        ctx: &DispatchContext,
        definitions: &[TestDefinition],
        label: &str,
    ) -> Result<Option<CaptureHandle>> {
        let mut last = None;
        for definition in definitions {
            let handle = self
                .collaborators
                .capture
                .capture(&mut *session, definition, label, &ctx.persistence)
                .await?;
            last = Some(handle);
        }
        Ok(last)
    }

    async fn notify(&self, mail: &str, results: &TestResultSet) -> Result<()> {
        let settings = NotificationSettings::load(mail, &self.paths)?;
        let password = match settings.passwd.clone() {
            Some(p) => p,
            None => {
                let credentials = self.collaborators.credentials.clone();
                tokio::task::spawn_blocking(move || credentials.mail_password())
                    .await
                    .map_err(|e| SnapError::Prompt(e.to_string()))??
            }
        };
        self.collaborators
            .notifier
            .notify(&settings, &password, results)
            .await
            .map_err(|e| match e {
                SnapError::Notify(_) => e,
                other => SnapError::Notify(other.to_string()),
            })
    }

    fn remove_temporary(
        &self,
        ctx: &DispatchContext,
        hostname: &str,
        definitions: &[TestDefinition],
        label: &str,
    ) {
        let files = FileStore::new(self.paths.clone());
        for block in definitions.iter().flat_map(|d| &d.blocks) {
            if let Err(e) = files.remove(hostname, label, block.command_line()) {
                tracing::warn!(host = %hostname, error = %e, "could not remove temporary snapshot");
            }
        }
        if let (true, Some(name)) = (
            ctx.persistence.store_in_sqlite,
            ctx.persistence.database_name.as_deref(),
        ) {
            let removed = SqliteStore::open_in(&self.paths, name)
                .and_then(|db| db.delete_label(hostname, label));
            if let Err(e) = removed {
                tracing::warn!(host = %hostname, error = %e, "could not remove temporary rows");
            }
        }
        tracing::debug!(host = %hostname, label, "temporary snapshots removed");
    }
}
