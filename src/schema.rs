//! Table descriptors and declared-type mapping.
//!
//! Every source table may ship with a JSON descriptor named `<TABLE>.json`
//! that lists its columns (in authoritative order), their declared type
//! labels, free-text descriptions, and an optional composite primary key.
//!
//! ## Responsibilities
//!
//! - Mapping declared type labels onto SQLite storage types ([`ColumnType`])
//! - Locating and parsing descriptors ([`TableSchema::load_for_table`])
//! - Sanitizing descriptive text so it can live inside a `--` SQL comment

use std::{
    borrow::Cow,
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::TableError;

pub const SCHEMA_EXTENSION: &str = "json";

/// Storage category for a destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColumnType {
    Integer,
    Real,
    Numeric,
    #[default]
    Text,
}

impl ColumnType {
    /// Maps a declared type label onto a storage category. Unknown or absent
    /// labels fall back to [`ColumnType::Text`].
    pub fn from_declared(label: Option<&str>) -> Self {
        match label.map(str::trim).unwrap_or_default() {
            "INTEGER" => ColumnType::Integer,
            "NUMERIC" => ColumnType::Numeric,
            "FLOAT" => ColumnType::Real,
            "VARCHAR" | "DATETIME" | "DATETIME (Local)" | "DATETIME (UTC)"
            | "DATETIME (Attached)" => ColumnType::Text,
            _ => ColumnType::Text,
        }
    }

    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Text => "TEXT",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnDescriptor {
    pub fn column_type(&self) -> ColumnType {
        ColumnType::from_declared(self.declared_type.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrimaryKeyColumn {
    #[serde(rename = "columnName")]
    pub column_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TableSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "primaryKey",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub primary_key: Vec<PrimaryKeyColumn>,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn descriptor_path(schema_dir: &Path, table: &str) -> PathBuf {
        schema_dir.join(format!("{table}.{SCHEMA_EXTENSION}"))
    }

    /// Looks up the descriptor for `table`. A missing or zero-byte file means
    /// the table has no schema and yields `Ok(None)`.
    ///
    /// An unreadable file or invalid JSON is a [`TableError::Schema`]. JSON
    /// that is well formed but lacks required descriptor data (a column
    /// without `name`, a key entry without `columnName`) cannot define a
    /// table and is a [`TableError::Create`].
    pub fn load_for_table(schema_dir: &Path, table: &str) -> Result<Option<Self>, TableError> {
        let path = Self::descriptor_path(schema_dir, table);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Ok(None),
        };
        if metadata.len() == 0 {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Opening schema file {path:?}"))
            .map_err(|source| TableError::Schema {
                table: table.to_string(),
                source,
            })?;
        match serde_json::from_str::<TableSchema>(&contents) {
            Ok(schema) => Ok(Some(schema)),
            Err(err) if err.is_data() => Err(TableError::create(
                table,
                format!("invalid descriptor {path:?}: {err}"),
            )),
            Err(err) => Err(TableError::Schema {
                table: table.to_string(),
                source: anyhow::Error::new(err)
                    .context(format!("Parsing schema file {path:?}")),
            }),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Opening schema file {path:?}"))?;
        Self::from_json(&contents).with_context(|| format!("Parsing schema file {path:?}"))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let schema: TableSchema =
            serde_json::from_str(contents).context("Parsing schema JSON")?;
        Ok(schema)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.columns.iter().map(ColumnDescriptor::column_type).collect()
    }

    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.primary_key
            .iter()
            .map(|key| key.column_name.as_str())
            .collect()
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|key| key.column_name == column)
    }
}

/// Makes free text safe for a trailing `--` comment: double hyphens become an
/// em dash, carriage returns are dropped, and newlines become spaces.
pub fn sanitize_comment(text: &str) -> Cow<'_, str> {
    if !text.contains("--") && !text.contains(['\n', '\r']) {
        return Cow::Borrowed(text);
    }
    let collapsed = text.replace("--", "\u{2014}");
    let mut sanitized = String::with_capacity(collapsed.len());
    for ch in collapsed.chars() {
        match ch {
            '\r' => {}
            '\n' => sanitized.push(' '),
            other => sanitized.push(other),
        }
    }
    Cow::Owned(sanitized)
}
