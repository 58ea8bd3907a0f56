//! JSON-lines persistence.
//!
//! One statement per line:
//!
//! ```text
//! {"subject":"x1","predicate":"name","object":"Acme","type":"string","source":"catalog"}
//! ```

use crate::{MemoryStore, SourceInfo};
use anyhow::Context;
use loom_model::{Statement, StatementType};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A statement together with the source it is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredStatement {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(rename = "type")]
    pub kind: StatementType,
    pub source: String,
}

impl StoredStatement {
    pub fn into_parts(self) -> (Statement, String) {
        let statement = Statement::new(self.subject, self.predicate, self.object, self.kind);
        (statement, self.source)
    }
}

impl MemoryStore {
    /// Store loaded from `path`, or an empty one when the file does not exist
    /// yet.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let store = Self::new();
        if path.exists() {
            store.read_jsonl(path)?;
        } else {
            tracing::warn!(path = %path.display(), "statement file not found, starting empty");
        }
        Ok(store)
    }

    /// Append every statement in the JSON-lines file at `path`. Blank lines
    /// are skipped. Returns the number of new rows.
    pub fn read_jsonl(&self, path: &Path) -> anyhow::Result<usize> {
        let file = File::open(path)
            .with_context(|| format!("failed to open statement file {}", path.display()))?;
        let mut added = 0;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let stored: StoredStatement = serde_json::from_str(&line).with_context(|| {
                format!("invalid statement on line {} of {}", index + 1, path.display())
            })?;
            let (statement, source) = stored.into_parts();
            if self.append(statement, &source) {
                added += 1;
            }
        }
        tracing::debug!(path = %path.display(), added, "read statements");
        Ok(added)
    }

    /// Write every statement to `path`, replacing its contents. Returns the
    /// number of lines written.
    pub fn write_jsonl(&self, path: &Path) -> anyhow::Result<usize> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create statement file {}", path.display()))?;
        let mut out = BufWriter::new(file);
        let statements = self.statements();
        for statement in &statements {
            serde_json::to_writer(&mut out, statement)?;
            out.write_all(b"\n")?;
        }
        out.flush()
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(statements.len())
    }

    /// Register the sources listed in the JSON array at `path`, keeping their
    /// recorded timestamps. A missing file registers nothing.
    pub fn read_sources(&self, path: &Path) -> anyhow::Result<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read source file {}", path.display()))?;
        let sources: Vec<SourceInfo> = serde_json::from_str(&text)
            .with_context(|| format!("invalid source file {}", path.display()))?;
        let count = sources.len();
        self.restore_sources(sources);
        Ok(count)
    }

    pub fn write_sources(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(&self.sources())?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write source file {}", path.display()))
    }
}
