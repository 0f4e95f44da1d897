use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("authentication failed for {host}: {message}")]
    Auth { host: String, message: String },

    #[error("could not connect to {host}: {message}")]
    Connection { host: String, message: String },

    #[error("command '{command}' failed on {host}: {message}")]
    Command {
        host: String,
        command: String,
        message: String,
    },

    #[error("session to {0} is already closed")]
    Closed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// `true` for credential rejections, the only failure the orchestrator retries.
    pub fn is_auth(&self) -> bool {
        matches!(self, SessionError::Auth { .. })
    }
}
