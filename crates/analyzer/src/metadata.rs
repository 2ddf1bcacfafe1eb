//! `world.mt` parsing: plain `key = value` lines selecting the storage backend.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};

/// File name of the metadata file inside a world directory.
pub const METADATA_FILE: &str = "world.mt";

/// Storage backend a world's map blocks live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Postgres,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "sqlite3" => Ok(Self::Sqlite),
            "postgresql" => Ok(Self::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite3",
            Self::Postgres => "postgresql",
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorldMetadata {
    pub backend: BackendKind,
    /// Every `key = value` pair in the file, trimmed.
    pub variables: HashMap<String, String>,
}

impl WorldMetadata {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading world metadata {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing world metadata {}", path.display()))
    }

    /// Blank lines and `#` comments are skipped, as are lines without `=`.
    /// Later duplicates of a key win.
    pub fn parse(text: &str) -> Result<Self> {
        let mut variables = HashMap::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::debug!("Ignoring malformed world.mt line: {:?}", line);
                continue;
            };
            variables.insert(key.trim().to_string(), value.trim().to_string());
        }

        let Some(backend) = variables.get("backend") else {
            bail!("world metadata doesn't specify backend");
        };
        let backend = BackendKind::parse(backend)?;

        Ok(Self { backend, variables })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// PostgreSQL connection string, or `""` when unset.
    pub fn pgsql_connection(&self) -> &str {
        self.get("pgsql_connection").unwrap_or("")
    }
}
