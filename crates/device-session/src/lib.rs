//! `device-session`: how snapadmin talks to a network device.
//!
//! The orchestrator only ever sees the two traits in [`session`]:
//! a [`SessionFactory`] that opens a [`DeviceSession`] for a set of
//! [`ConnectParams`], and the session itself which executes commands and is
//! closed exactly once by its owner.
//!
//! # Architecture
//!
//! ```text
//! ConnectParams
//!     │
//!     ▼
//! SshSessionFactory   ← probes the device with `ssh … <probe_command>`
//!     │                 (wrapped in `sshpass -e` when a password is set)
//!     ▼
//! SshSession          ← one `ssh` subprocess per executed command
//!     │
//!     ▼
//! SessionError        ← Auth / Connection / Command, classified from the
//!                       subprocess exit status and stderr
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use device_session::{ConnectParams, SessionFactory, SshOptions, SshSessionFactory};
//!
//! let factory = SshSessionFactory::new(SshOptions::default());
//! let params = ConnectParams::new("r1.lab", "netops").with_port(22);
//! let mut session = factory.open(&params).await?;
//! let reply = session.execute("show interfaces terse").await?;
//! session.close().await?;
//! ```

pub mod error;
pub mod session;
pub mod ssh;
pub mod types;

pub(crate) mod process;

pub use error::SessionError;
pub use session::{DeviceSession, SessionFactory};
pub use ssh::{SshSession, SshSessionFactory};
pub use types::{ConnectParams, SshOptions};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, SessionError>;
