use crate::config::MainConfig;
use crate::error::{Result, SnapError};
use crate::types::ActionKind;
use serde::{Deserialize, Serialize};

/// Validated database settings for one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub store_in_sqlite: bool,
    pub check_from_sqlite: bool,
    pub database_name: Option<String>,
    /// `(first_id, second_id)` for by-id Check/Diff.
    pub compare_ids: Option<(i64, i64)>,
}

impl PersistenceConfig {
    /// Comparison reads two stored snapshots by id instead of by label.
    pub fn compares_by_id(&self) -> bool {
        self.check_from_sqlite && self.compare_ids.is_some()
    }

    pub fn uses_database(&self) -> bool {
        self.store_in_sqlite || self.check_from_sqlite
    }
}

pub struct PersistencePolicy;

impl PersistencePolicy {
    /// Gate every dispatch. Returns the validated config or a configuration
    /// error; nothing here is retried.
    pub fn validate(
        config: &MainConfig,
        pre_label: Option<&str>,
        post_label: Option<&str>,
        action: ActionKind,
    ) -> Result<PersistenceConfig> {
        let mut persistence = PersistenceConfig::default();

        if let Some(section) = config.sqlite_section() {
            persistence.store_in_sqlite = section.store_in_sqlite;
            persistence.check_from_sqlite = section.check_from_sqlite;

            if persistence.uses_database() {
                let name = section
                    .database_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or(SnapError::MissingDatabaseName)?;
                persistence.database_name = Some(name.to_string());

                if matches!(action, ActionKind::Check | ActionKind::Diff) {
                    if let Some(compare) = section.compare.as_ref().filter(|v| !v.is_null()) {
                        let raw = compare.as_str().ok_or_else(|| {
                            SnapError::InvalidCompareIds(format!("{compare:?}"))
                        })?;
                        persistence.compare_ids = Some(parse_compare_ids(raw)?);
                    }
                }
            }
        }

        if action == ActionKind::Snapshot && is_blank(pre_label) {
            return Err(SnapError::MissingSnapshotName {
                action: action.as_str().to_string(),
            });
        }

        if !persistence.compares_by_id()
            && action.requires_both_labels()
            && (is_blank(pre_label) || is_blank(post_label))
        {
            return Err(SnapError::MissingSnapshotLabels {
                action: action.as_str().to_string(),
            });
        }

        Ok(persistence)
    }
}

/// `"3, 5"` → `(3, 5)`.
pub fn parse_compare_ids(raw: &str) -> Result<(i64, i64)> {
    let ids = raw
        .split(',')
        .map(|t| t.trim().parse::<i64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| SnapError::InvalidCompareIds(raw.to_string()))?;
    match ids.as_slice() {
        [first, second] => Ok((*first, *second)),
        ids if ids.len() > 2 => Err(SnapError::TooManyCompareIds(ids.len())),
        _ => Err(SnapError::InvalidCompareIds(raw.to_string())),
    }
}

fn is_blank(label: Option<&str>) -> bool {
    label.map_or(true, |l| l.trim().is_empty())
}
