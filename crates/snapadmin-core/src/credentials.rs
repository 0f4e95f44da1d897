use crate::error::{Result, SnapError};
use dialoguer::console::Term;
use dialoguer::{Input, Password};
use std::sync::Mutex;

/// Supplies credentials the configuration left out.
///
/// Calls block (a console prompt may be waiting on the operator); the
/// orchestrator runs them on the blocking pool.
pub trait CredentialProvider: Send + Sync {
    fn username(&self, hostname: &str) -> Result<String>;

    fn password(&self, hostname: &str, username: &str) -> Result<String>;

    /// Password for the notification mail account.
    fn mail_password(&self) -> Result<String>;
}

// ---------------------------------------------------------------------------
// InteractivePrompt
// ---------------------------------------------------------------------------

/// Console prompts on stderr. One prompt at a time across all workers.
#[derive(Default)]
pub struct InteractivePrompt {
    lock: Mutex<()>,
}

impl InteractivePrompt {
    pub fn new() -> Self {
        Self::default()
    }

    fn serialised<T>(&self, f: impl FnOnce() -> dialoguer::Result<T>) -> Result<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| SnapError::Prompt("prompt lock poisoned".to_string()))?;
        f().map_err(|e| SnapError::Prompt(e.to_string()))
    }
}

impl CredentialProvider for InteractivePrompt {
    fn username(&self, hostname: &str) -> Result<String> {
        self.serialised(|| {
            Input::<String>::new()
                .with_prompt(format!("Enter user name for {hostname}"))
                .interact_text_on(&Term::stderr())
        })
    }

    fn password(&self, hostname: &str, username: &str) -> Result<String> {
        self.serialised(|| {
            Password::new()
                .with_prompt(format!("Enter password for {username}@{hostname}"))
                .interact_on(&Term::stderr())
        })
    }

    fn mail_password(&self) -> Result<String> {
        self.serialised(|| {
            Password::new()
                .with_prompt("Enter email password")
                .interact_on(&Term::stderr())
        })
    }
}

// ---------------------------------------------------------------------------
// StaticCredentials
// ---------------------------------------------------------------------------

/// Fixed answers for programmatic use. A missing answer is an error rather
/// than a prompt.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub mail_password: Option<String>,
}

impl StaticCredentials {
    /// Never answers; every request fails.
    pub fn none() -> Self {
        Self::default()
    }
}

impl CredentialProvider for StaticCredentials {
    fn username(&self, hostname: &str) -> Result<String> {
        self.username
            .clone()
            .ok_or_else(|| SnapError::MissingUsername(hostname.to_string()))
    }

    fn password(&self, hostname: &str, username: &str) -> Result<String> {
        self.password
            .clone()
            .ok_or_else(|| SnapError::Prompt(format!("no password for {username}@{hostname}")))
    }

    fn mail_password(&self) -> Result<String> {
        self.mail_password
            .clone()
            .ok_or_else(|| SnapError::Prompt("no mail password".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_credentials_answer_or_fail() {
        let creds = StaticCredentials {
            username: Some("ops".into()),
            password: None,
            mail_password: Some("m".into()),
        };
        assert_eq!(creds.username("r1").unwrap(), "ops");
        assert_eq!(creds.mail_password().unwrap(), "m");
        let err = creds.password("r1", "ops").unwrap_err();
        assert_eq!(err.category(), "AuthenticationError");
    }

    #[test]
    fn none_fails_for_username() {
        let err = StaticCredentials::none().username("r1").unwrap_err();
        assert!(matches!(err, SnapError::MissingUsername(ref h) if h == "r1"));
    }
}
