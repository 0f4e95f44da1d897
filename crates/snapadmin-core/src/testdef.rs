//! Test-definition documents.
//!
//! ```yaml
//! tests_include:
//!   - check_version
//!   - check_interfaces
//! check_version:
//!   - command: show version
//!   - item:
//!       xpath: //software-information
//! check_interfaces:
//!   - rpc: get-interface-information
//!   - iterate: { ... }
//! ```
//!
//! Only the first element of each block is interpreted. The rule blocks
//! after it are carried verbatim for comparators that understand them.

use crate::error::{Result, SnapError};
use crate::paths::DefaultPaths;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

const INCLUDE_KEY: &str = "tests_include";

#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Command(String),
    Rpc(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestBlock {
    pub name: String,
    pub invocation: Invocation,
    pub rules: Vec<Value>,
}

impl TestBlock {
    /// The text sent to the device session.
    pub fn command_line(&self) -> &str {
        match &self.invocation {
            Invocation::Command(c) | Invocation::Rpc(c) => c,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestDefinition {
    /// The reference as written in the main config `tests` list.
    pub name: String,
    pub path: PathBuf,
    pub blocks: Vec<TestBlock>,
}

impl TestDefinition {
    pub fn load(name: &str, path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut def = Self::parse(name, &text)?;
        def.path = path.to_path_buf();
        Ok(def)
    }

    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(text)?;
        let Value::Mapping(doc) = doc else {
            return Err(SnapError::InvalidConfig(format!(
                "test file '{name}' must be a mapping"
            )));
        };

        let included: Vec<String> = match doc.get(INCLUDE_KEY) {
            Some(Value::Sequence(seq)) => seq
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(_) => {
                return Err(SnapError::InvalidConfig(format!(
                    "'{INCLUDE_KEY}' in '{name}' must be a list"
                )))
            }
            None => doc
                .keys()
                .filter_map(Value::as_str)
                .filter(|k| *k != INCLUDE_KEY)
                .map(str::to_string)
                .collect(),
        };

        let mut blocks = Vec::with_capacity(included.len());
        for test in included {
            match parse_block(&doc, &test) {
                Some(block) => blocks.push(block),
                None => tracing::warn!(file = name, test = %test, "test has no command or rpc; skipping"),
            }
        }

        Ok(Self {
            name: name.to_string(),
            path: PathBuf::from(name),
            blocks,
        })
    }
}

fn parse_block(doc: &Mapping, test: &str) -> Option<TestBlock> {
    let seq = doc.get(test)?.as_sequence()?;
    let (head, rules) = seq.split_first()?;
    let head = head.as_mapping()?;
    let invocation = if let Some(c) = head.get("command").and_then(Value::as_str) {
        Invocation::Command(c.trim().to_string())
    } else {
        Invocation::Rpc(head.get("rpc").and_then(Value::as_str)?.trim().to_string())
    };
    Some(TestBlock {
        name: test.to_string(),
        invocation,
        rules: rules.to_vec(),
    })
}

/// Load every referenced test file. References are literal paths or names
/// under the test-file directory; missing files are logged and skipped.
pub fn resolve_all(refs: &[String], paths: &DefaultPaths) -> Result<Vec<TestDefinition>> {
    let mut defs = Vec::with_capacity(refs.len());
    for name in refs {
        let Some(path) = paths.test_file(name) else {
            tracing::error!(file = %name, "test file not found; skipping");
            continue;
        };
        defs.push(TestDefinition::load(name, &path)?);
    }
    Ok(defs)
}
