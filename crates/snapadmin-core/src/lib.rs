//! `snapadmin-core`: capture device state from many hosts at once and
//! compare snapshots.
//!
//! The flow for one invocation:
//!
//! 1. [`config::ConfigSource`] yields a [`config::MainConfig`].
//! 2. [`persistence::PersistencePolicy`] validates database settings and
//!    snapshot labels; nothing touches a device if this fails.
//! 3. [`hosts::HostResolver`] expands inline hosts and group files into
//!    [`types::HostSpec`]s.
//! 4. [`orchestrator::SessionOrchestrator`] runs one worker per host, each
//!    routed through [`orchestrator::ActionDispatcher`], and returns one
//!    [`types::SessionResult`] per host.
//!
//! [`SnapAdmin`] wraps all of it for embedding programs.

pub mod api;
pub mod capture;
pub mod compare;
pub mod config;
pub mod credentials;
pub mod error;
pub mod hosts;
pub mod io;
pub mod notify;
pub mod orchestrator;
pub mod paths;
pub mod persistence;
pub mod settings;
pub mod store;
pub mod testdef;
pub mod types;

pub use api::SnapAdmin;
pub use config::{ConfigSource, MainConfig};
pub use error::{Result, SnapError};
pub use settings::Settings;
pub use types::{ActionKind, OrchestrationResult, SessionResult, SessionStatus};
