use crate::error::Result;
use crate::persistence::PersistenceConfig;
use crate::paths::DefaultPaths;
use crate::store::{FileStore, SqliteStore};
use crate::testdef::TestDefinition;
use crate::types::{CaptureHandle, CommandReply};
use async_trait::async_trait;
use device_session::DeviceSession;

/// Runs one test definition's commands on an open session and stores the
/// replies under `label`.
#[async_trait]
pub trait SnapshotCapture: Send + Sync {
    async fn capture(
        &self,
        session: &mut dyn DeviceSession,
        definition: &TestDefinition,
        label: &str,
        persistence: &PersistenceConfig,
    ) -> Result<CaptureHandle>;
}

/// Writes each reply to a snapshot file and, when enabled, to SQLite.
pub struct CommandCapture {
    paths: DefaultPaths,
    files: FileStore,
}

impl CommandCapture {
    pub fn new(paths: DefaultPaths) -> Self {
        Self {
            files: FileStore::new(paths.clone()),
            paths,
        }
    }
}

#[async_trait]
impl SnapshotCapture for CommandCapture {
    async fn capture(
        &self,
        session: &mut dyn DeviceSession,
        definition: &TestDefinition,
        label: &str,
        persistence: &PersistenceConfig,
    ) -> Result<CaptureHandle> {
        let hostname = session.hostname().to_string();
        let db = match (&persistence.database_name, persistence.store_in_sqlite) {
            (Some(name), true) => Some(SqliteStore::open_in(&self.paths, name)?),
            _ => None,
        };

        let mut replies = Vec::with_capacity(definition.blocks.len());
        for block in &definition.blocks {
            let command = block.command_line();
            tracing::debug!(host = %hostname, command, "capturing");
            let output = session.execute(command).await?;

            let path = self.files.write(&hostname, label, command, &output)?;
            let snapshot_id = match &db {
                Some(db) => Some(db.insert(&hostname, label, command, &output)?),
                None => None,
            };
            replies.push(CommandReply {
                command: command.to_string(),
                output,
                path: Some(path),
                snapshot_id,
            });
        }

        tracing::info!(
            host = %hostname,
            test_file = %definition.name,
            label,
            commands = replies.len(),
            "snapshot taken"
        );
        Ok(CaptureHandle {
            hostname,
            test_definition: definition.name.clone(),
            label: label.to_string(),
            replies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_session::SessionError;
    use tempfile::TempDir;

    struct EchoSession;

    #[async_trait]
    impl DeviceSession for EchoSession {
        fn hostname(&self) -> &str {
            "r1"
        }

        async fn execute(&mut self, command: &str) -> device_session::Result<String> {
            if command == "show broken" {
                return Err(SessionError::Command {
                    host: "r1".into(),
                    command: command.into(),
                    message: "syntax error".into(),
                });
            }
            Ok(format!("reply to {command}\n"))
        }

        async fn close(&mut self) -> device_session::Result<()> {
            Ok(())
        }
    }

    fn definition(text: &str) -> TestDefinition {
        TestDefinition::parse("test_version.yml", text).unwrap()
    }

    #[tokio::test]
    async fn writes_files_and_database_rows() {
        let dir = TempDir::new().unwrap();
        let paths = DefaultPaths::rooted_at(dir.path());
        let capture = CommandCapture::new(paths.clone());
        let def = definition("a:\n  - command: show version\nb:\n  - command: show chassis\n");
        let persistence = PersistenceConfig {
            store_in_sqlite: true,
            database_name: Some("snaps.db".into()),
            ..Default::default()
        };

        let handle = capture
            .capture(&mut EchoSession, &def, "pre", &persistence)
            .await
            .unwrap();

        assert_eq!(handle.replies.len(), 2);
        assert_eq!(handle.label, "pre");
        let first = &handle.replies[0];
        assert_eq!(
            std::fs::read_to_string(first.path.as_ref().unwrap()).unwrap(),
            "reply to show version\n"
        );
        assert!(first.snapshot_id.is_some());

        let db = SqliteStore::open_in(&paths, "snaps.db").unwrap();
        assert_eq!(db.count("r1").unwrap(), 2);
    }

    #[tokio::test]
    async fn command_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let capture = CommandCapture::new(DefaultPaths::rooted_at(dir.path()));
        let def = definition("a:\n  - command: show broken\n");
        let err = capture
            .capture(&mut EchoSession, &def, "pre", &PersistenceConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "ActionExecutionError");
    }
}
