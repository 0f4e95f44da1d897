use crate::error::{Result, SnapError};
use crate::paths::DefaultPaths;
use crate::types::TestResultSet;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

/// The document named by `mail:` in a main config.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(deserialize_with = "one_or_many")]
    pub recipients: Vec<String>,
    pub sender: String,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, skip_serializing)]
    pub passwd: Option<String>,
}

impl std::fmt::Debug for NotificationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSettings")
            .field("recipients", &self.recipients)
            .field("sender", &self.sender)
            .field("server", &self.server)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl NotificationSettings {
    /// Locate and parse the settings document: literal path first, then the
    /// test-file directory.
    pub fn load(reference: &str, paths: &DefaultPaths) -> Result<Self> {
        let path = paths.test_file(reference).ok_or_else(|| {
            SnapError::Notify(format!("mail settings file '{reference}' is not present"))
        })?;
        crate::io::read_yaml(&path).map_err(|e| SnapError::Notify(format!("{reference}: {e}")))
    }
}

fn one_or_many<'de, D>(d: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(d)? {
        OneOrMany::One(s) => s.split(',').map(|r| r.trim().to_string()).collect(),
        OneOrMany::Many(v) => v,
    })
}

/// Delivers a host's comparison results.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        settings: &NotificationSettings,
        password: &str,
        results: &TestResultSet,
    ) -> Result<()>;
}

/// Emits the summary as a structured log event.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        settings: &NotificationSettings,
        _password: &str,
        results: &TestResultSet,
    ) -> Result<()> {
        let status = if results.all_passed() { "passed" } else { "failed" };
        tracing::info!(
            host = %results.hostname,
            action = %results.action,
            sender = %settings.sender,
            recipients = %settings.recipients.join(", "),
            passed = results.passed(),
            failed = results.failed(),
            "notification: tests {status}"
        );
        for outcome in results.outcomes.iter().filter(|o| !o.passed) {
            tracing::info!(
                host = %results.hostname,
                command = %outcome.command,
                details = %outcome.details.join("; "),
                "notification: failed test"
            );
        }
        Ok(())
    }
}
