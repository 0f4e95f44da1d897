use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapError {
    #[error("config file '{0}' is not present")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("hosts not given properly in config: {0}")]
    HostsMissing(String),

    #[error("'device' key not found in host entry")]
    MissingDevice,

    #[error("host group file '{0}' is not present")]
    GroupFileNotFound(String),

    #[error("specify name of the database")]
    MissingDatabaseName,

    #[error(
        "properly specify ids of first and second snapshot in format: \
         first_snapshot_id, second_snapshot_id (got '{0}')"
    )]
    InvalidCompareIds(String),

    #[error("no. of snapshots specified is more than two ({0}); please specify only two snapshots")]
    TooManyCompareIds(usize),

    #[error("arguments not given correctly: '{action}' needs both a pre and a post snapshot name")]
    MissingSnapshotLabels { action: String },

    #[error("arguments not given correctly: '{action}' needs a snapshot name")]
    MissingSnapshotName { action: String },

    #[error("no username available for {0}")]
    MissingUsername(String),

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("comparison failed: {0}")]
    Compare(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("credential prompt failed: {0}")]
    Prompt(String),

    #[error(transparent)]
    Session(#[from] device_session::SessionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl SnapError {
    /// The error family used when reporting a failure to the operator.
    pub fn category(&self) -> &'static str {
        match self {
            SnapError::ConfigNotFound(_)
            | SnapError::InvalidConfig(_)
            | SnapError::HostsMissing(_)
            | SnapError::MissingDevice
            | SnapError::GroupFileNotFound(_)
            | SnapError::MissingDatabaseName
            | SnapError::InvalidCompareIds(_)
            | SnapError::TooManyCompareIds(_)
            | SnapError::MissingSnapshotLabels { .. }
            | SnapError::MissingSnapshotName { .. }
            | SnapError::Yaml(_) => "ConfigurationError",
            SnapError::Session(e) if e.is_auth() => "AuthenticationError",
            SnapError::Session(device_session::SessionError::Connection { .. }) => {
                "ConnectionError"
            }
            SnapError::MissingUsername(_) | SnapError::Prompt(_) => "AuthenticationError",
            SnapError::Notify(_) => "NotificationError",
            _ => "ActionExecutionError",
        }
    }

    /// Configuration errors are fatal and raised before any session work.
    pub fn is_configuration(&self) -> bool {
        self.category() == "ConfigurationError"
    }
}

pub type Result<T> = std::result::Result<T, SnapError>;

#[cfg(test)]
mod tests {
    use super::*;
    use device_session::SessionError;

    #[test]
    fn configuration_errors_are_categorised() {
        assert!(SnapError::MissingDatabaseName.is_configuration());
        assert!(SnapError::InvalidCompareIds("3,x".into()).is_configuration());
        assert!(SnapError::MissingSnapshotLabels {
            action: "check".into()
        }
        .is_configuration());
        assert!(SnapError::MissingSnapshotName {
            action: "snap".into()
        }
        .is_configuration());
    }

    #[test]
    fn session_errors_keep_their_family() {
        let auth = SnapError::from(SessionError::Auth {
            host: "r1".into(),
            message: "denied".into(),
        });
        assert_eq!(auth.category(), "AuthenticationError");

        let conn = SnapError::from(SessionError::Connection {
            host: "r1".into(),
            message: "refused".into(),
        });
        assert_eq!(conn.category(), "ConnectionError");

        let cmd = SnapError::from(SessionError::Command {
            host: "r1".into(),
            command: "show x".into(),
            message: "bad".into(),
        });
        assert_eq!(cmd.category(), "ActionExecutionError");
    }
}
