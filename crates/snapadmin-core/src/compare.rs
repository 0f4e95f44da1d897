use crate::error::{Result, SnapError};
use crate::paths::DefaultPaths;
use crate::persistence::PersistenceConfig;
use crate::store::{FileStore, SqliteStore};
use crate::testdef::TestDefinition;
use crate::types::{ActionKind, TestOutcome, TestResultSet};
use async_trait::async_trait;
use similar::{ChangeTag, TextDiff};
use std::path::Path;
use std::time::Duration;

/// Everything a comparator needs for one host.
#[derive(Debug, Clone)]
pub struct CompareRequest {
    pub hostname: String,
    pub action: ActionKind,
    pub definitions: Vec<TestDefinition>,
    pub pre_label: Option<String>,
    pub post_label: Option<String>,
    pub persistence: PersistenceConfig,
}

#[async_trait]
pub trait SnapshotComparator: Send + Sync {
    async fn compare(&self, request: CompareRequest) -> Result<TestResultSet>;
}

// ---------------------------------------------------------------------------
// ReplyComparator
// ---------------------------------------------------------------------------

/// Compares stored replies command by command.
///
/// Check and Diff pass when the pre and post replies are identical; the
/// details of a failure are a line diff. SnapCheck has a single snapshot and
/// passes when every command produced a non-empty reply.
pub struct ReplyComparator {
    paths: DefaultPaths,
    files: FileStore,
}

impl ReplyComparator {
    pub fn new(paths: DefaultPaths) -> Self {
        Self {
            files: FileStore::new(paths.clone()),
            paths,
        }
    }

    fn load(
        &self,
        db: Option<&SqliteStore>,
        host: &str,
        label: &str,
        command: &str,
    ) -> Result<Option<String>> {
        match self.files.read(host, label, command) {
            Ok(data) => Ok(Some(data)),
            Err(SnapError::SnapshotNotFound(_)) => match db {
                Some(db) => db.latest_by_label(host, label, command),
                None => Ok(None),
            },
            Err(e) => Err(e),
        }
    }

    fn compare_pair(&self, req: &CompareRequest, db: Option<&SqliteStore>) -> Result<Vec<TestOutcome>> {
        let host = req.hostname.as_str();
        let mut outcomes = Vec::new();
        for def in &req.definitions {
            for block in &def.blocks {
                let command = block.command_line();
                let (pre_name, post_name, pre, post) = match (db, req.persistence.compare_ids) {
                    (Some(db), Some((first, second))) if req.persistence.compares_by_id() => (
                        format!("id {first}"),
                        format!("id {second}"),
                        db.nth_latest(host, command, first)?,
                        db.nth_latest(host, command, second)?,
                    ),
                    _ => {
                        let pre_label = req.pre_label.as_deref().unwrap_or_default();
                        let post_label = req.post_label.as_deref().unwrap_or_default();
                        (
                            pre_label.to_string(),
                            post_label.to_string(),
                            self.load(db, host, pre_label, command)?,
                            self.load(db, host, post_label, command)?,
                        )
                    }
                };

                let outcome = match (pre, post) {
                    (Some(pre), Some(post)) => {
                        let details = line_diff(&pre, &post);
                        TestOutcome {
                            test_definition: def.name.clone(),
                            command: command.to_string(),
                            passed: details.is_empty(),
                            details,
                        }
                    }
                    (pre, post) => {
                        let mut details = Vec::new();
                        if pre.is_none() {
                            details.push(format!("no '{pre_name}' snapshot"));
                        }
                        if post.is_none() {
                            details.push(format!("no '{post_name}' snapshot"));
                        }
                        TestOutcome {
                            test_definition: def.name.clone(),
                            command: command.to_string(),
                            passed: false,
                            details,
                        }
                    }
                };
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    fn evaluate_single(&self, req: &CompareRequest, db: Option<&SqliteStore>) -> Result<Vec<TestOutcome>> {
        let host = req.hostname.as_str();
        let label = req.pre_label.as_deref().unwrap_or_default();
        let mut outcomes = Vec::new();
        for def in &req.definitions {
            for block in &def.blocks {
                let command = block.command_line();
                let reply = self.load(db, host, label, command)?;
                let details = match reply.as_deref().map(str::trim) {
                    None => vec![format!("no '{label}' snapshot")],
                    Some("") => vec!["empty reply".to_string()],
                    Some(_) => Vec::new(),
                };
                outcomes.push(TestOutcome {
                    test_definition: def.name.clone(),
                    command: command.to_string(),
                    passed: details.is_empty(),
                    details,
                });
            }
        }
        Ok(outcomes)
    }
}

#[async_trait]
impl SnapshotComparator for ReplyComparator {
    async fn compare(&self, request: CompareRequest) -> Result<TestResultSet> {
        let worker = ReplyComparator::new(self.paths.clone());
        tokio::task::spawn_blocking(move || worker.compare_blocking(request))
            .await
            .map_err(|e| SnapError::Compare(format!("comparison task failed: {e}")))?
    }
}

impl ReplyComparator {
    /// File reads, SQLite lookups and diffs all block; run off the runtime.
    fn compare_blocking(&self, request: CompareRequest) -> Result<TestResultSet> {
        let db = match &request.persistence.database_name {
            Some(name) if request.persistence.check_from_sqlite => {
                Some(SqliteStore::open_in(&self.paths, name)?)
            }
            _ => None,
        };

        let outcomes = match request.action {
            ActionKind::SnapCheck => self.evaluate_single(&request, db.as_ref())?,
            ActionKind::Check | ActionKind::Diff => self.compare_pair(&request, db.as_ref())?,
            ActionKind::Snapshot => {
                return Err(SnapError::Compare(
                    "snapshot action has nothing to compare".to_string(),
                ))
            }
        };

        let mut results = TestResultSet::new(&request.hostname, request.action);
        results.outcomes = outcomes;
        tracing::info!(
            host = %request.hostname,
            action = %request.action,
            passed = results.passed(),
            failed = results.failed(),
            "comparison finished"
        );
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Line diff
// ---------------------------------------------------------------------------

/// Lines only in `old` as `- line`, lines only in `new` as `+ line`, in
/// order. Empty when the texts are line-for-line equal.
///
/// Line endings are normalised first so a missing final newline is not a
/// difference.
pub fn line_diff(old: &str, new: &str) -> Vec<String> {
    let old = normalise(old);
    let new = normalise(new);
    if old == new {
        return Vec::new();
    }

    TextDiff::configure()
        .timeout(DIFF_DEADLINE)
        .diff_lines(old.as_str(), new.as_str())
        .iter_all_changes()
        .filter_map(|change| {
            let sign = match change.tag() {
                ChangeTag::Delete => "-",
                ChangeTag::Insert => "+",
                ChangeTag::Equal => return None,
            };
            Some(format!("{sign} {}", change.value().trim_end_matches('\n')))
        })
        .collect()
}

/// Past this a diff stops looking for the minimal edit script and falls back
/// to a coarser, still correct one.
const DIFF_DEADLINE: Duration = Duration::from_secs(2);

fn normalise(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 1);
    for line in text.lines() {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Compare two files directly (`--diff a b` with existing files).
pub fn diff_files(first: &Path, second: &Path) -> Result<Vec<String>> {
    let a = std::fs::read_to_string(first)?;
    let b = std::fs::read_to_string(second)?;
    Ok(line_diff(&a, &b))
}
