//! In-memory session factory for orchestrator tests.

use crate::config::MainConfig;
use crate::paths::DefaultPaths;
use async_trait::async_trait;
use device_session::{ConnectParams, DeviceSession, SessionError, SessionFactory};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const TEST_FILE: &str = "test_version.yml";

pub fn paths(dir: &TempDir) -> DefaultPaths {
    DefaultPaths::rooted_at(dir.path())
}

/// Writes a two-command test definition and returns a main config that
/// references it.
pub fn write_fixture(dir: &TempDir) -> MainConfig {
    let paths = paths(dir);
    std::fs::create_dir_all(&paths.testfile_dir).unwrap();
    std::fs::write(
        paths.testfile_dir.join(TEST_FILE),
        "tests_include: [check_version, check_chassis]\n\
         check_version:\n  - command: show version\n\
         check_chassis:\n  - command: show chassis alarms\n",
    )
    .unwrap();
    MainConfig {
        tests: vec![TEST_FILE.to_string()],
        ..Default::default()
    }
}

#[derive(Default)]
struct Counters {
    opened: usize,
    closed: usize,
    attempts: HashMap<String, usize>,
    passwords: HashMap<String, Option<String>>,
    usernames: HashMap<String, String>,
    live: HashMap<String, usize>,
    max_live: HashMap<String, usize>,
    live_total: usize,
    max_live_total: usize,
}

#[derive(Default)]
pub struct FakeFactory {
    reject_without_password: HashSet<String>,
    always_reject: HashSet<String>,
    refuse: HashSet<String>,
    fail_commands: HashSet<String>,
    panic_on_open: HashSet<String>,
    counters: Arc<Mutex<Counters>>,
}

impl FakeFactory {
    pub fn reject_without_password(mut self, host: &str) -> Self {
        self.reject_without_password.insert(host.to_string());
        self
    }

    pub fn always_reject(mut self, host: &str) -> Self {
        self.always_reject.insert(host.to_string());
        self
    }

    pub fn refuse(mut self, host: &str) -> Self {
        self.refuse.insert(host.to_string());
        self
    }

    pub fn fail_commands(mut self, host: &str) -> Self {
        self.fail_commands.insert(host.to_string());
        self
    }

    pub fn panic_on_open(mut self, host: &str) -> Self {
        self.panic_on_open.insert(host.to_string());
        self
    }

    pub fn opened(&self) -> usize {
        self.counters.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.counters.lock().unwrap().closed
    }

    pub fn attempts(&self, host: &str) -> usize {
        self.counters
            .lock()
            .unwrap()
            .attempts
            .get(host)
            .copied()
            .unwrap_or(0)
    }

    pub fn last_password(&self, host: &str) -> Option<String> {
        self.counters
            .lock()
            .unwrap()
            .passwords
            .get(host)
            .cloned()
            .flatten()
    }

    pub fn last_username(&self, host: &str) -> Option<String> {
        self.counters.lock().unwrap().usernames.get(host).cloned()
    }

    pub fn max_live(&self, host: &str) -> usize {
        self.counters
            .lock()
            .unwrap()
            .max_live
            .get(host)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_live_total(&self) -> usize {
        self.counters.lock().unwrap().max_live_total
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self, params: &ConnectParams) -> device_session::Result<Box<dyn DeviceSession>> {
        let host = params.host.clone();
        {
            let mut c = self.counters.lock().unwrap();
            *c.attempts.entry(host.clone()).or_default() += 1;
            c.passwords.insert(host.clone(), params.password.clone());
            c.usernames.insert(host.clone(), params.username.clone());
        }
        tokio::time::sleep(Duration::from_millis(2)).await;

        if self.panic_on_open.contains(&host) {
            panic!("fake transport blew up for {host}");
        }
        if self.refuse.contains(&host) {
            return Err(SessionError::Connection {
                host,
                message: "connection refused".into(),
            });
        }
        if self.always_reject.contains(&host)
            || (self.reject_without_password.contains(&host) && params.password.is_none())
        {
            return Err(SessionError::Auth {
                host,
                message: "Permission denied".into(),
            });
        }

        {
            let mut c = self.counters.lock().unwrap();
            c.opened += 1;
            let live = c.live.entry(host.clone()).or_default();
            *live += 1;
            let live = *live;
            let max = c.max_live.entry(host.clone()).or_default();
            *max = (*max).max(live);
            c.live_total += 1;
            c.max_live_total = c.max_live_total.max(c.live_total);
        }

        Ok(Box::new(FakeSession {
            fail_commands: self.fail_commands.contains(&host),
            host,
            counters: self.counters.clone(),
        }))
    }
}

pub struct FakeSession {
    host: String,
    fail_commands: bool,
    counters: Arc<Mutex<Counters>>,
}

#[async_trait]
impl DeviceSession for FakeSession {
    fn hostname(&self) -> &str {
        &self.host
    }

    async fn execute(&mut self, command: &str) -> device_session::Result<String> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        if self.fail_commands {
            return Err(SessionError::Command {
                host: self.host.clone(),
                command: command.to_string(),
                message: "unknown command".into(),
            });
        }
        Ok(format!("{}: {command}\n", self.host))
    }

    async fn close(&mut self) -> device_session::Result<()> {
        let mut c = self.counters.lock().unwrap();
        c.closed += 1;
        if let Some(live) = c.live.get_mut(&self.host) {
            *live -= 1;
        }
        c.live_total -= 1;
        Ok(())
    }
}
