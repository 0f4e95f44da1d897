use async_trait::async_trait;

use crate::types::ConnectParams;
use crate::Result;

/// An open, authenticated session to one device.
///
/// A session is owned by exactly one worker for its whole lifetime and is
/// never shared. The owner calls [`DeviceSession::close`] once when done,
/// whether or not the work on the session succeeded.
#[async_trait]
pub trait DeviceSession: Send {
    /// The host this session is connected to.
    fn hostname(&self) -> &str;

    /// Run one command on the device and return its raw reply.
    async fn execute(&mut self, command: &str) -> Result<String>;

    /// Release the session. Further `execute` calls fail with `Closed`.
    async fn close(&mut self) -> Result<()>;
}

/// Opens sessions. Implementations must report rejected credentials as
/// [`crate::SessionError::Auth`] so callers can refresh them and retry.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, params: &ConnectParams) -> Result<Box<dyn DeviceSession>>;
}
