#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tempfile::{TempDir, tempdir};
use tsv_sqlite_loader::loader::LoadConfig;

/// Scratch export (`tsv/`, `schemas/`, database path) that cleans up on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates empty `tsv/` and `schemas/` directories.
    pub fn new() -> Self {
        let temp_dir = tempdir().expect("temp dir");
        fs::create_dir(temp_dir.path().join("tsv")).expect("create tsv dir");
        fs::create_dir(temp_dir.path().join("schemas")).expect("create schema dir");
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn source_dir(&self) -> PathBuf {
        self.path().join("tsv")
    }

    pub fn schema_dir(&self) -> PathBuf {
        self.path().join("schemas")
    }

    pub fn database(&self) -> PathBuf {
        self.path().join("ehi_clean.db")
    }

    pub fn config(&self) -> LoadConfig {
        LoadConfig::rooted_at(self.path())
    }

    /// Writes `tsv/<table>.tsv`.
    pub fn write_source(&self, table: &str, contents: &str) -> PathBuf {
        self.write_source_bytes(table, contents.as_bytes())
    }

    pub fn write_source_bytes(&self, table: &str, contents: &[u8]) -> PathBuf {
        let path = self.source_dir().join(format!("{table}.tsv"));
        fs::write(&path, contents).expect("write source file");
        path
    }

    /// Writes `schemas/<table>.json`.
    pub fn write_schema(&self, table: &str, json: &str) -> PathBuf {
        let path = self.schema_dir().join(format!("{table}.json"));
        fs::write(&path, json).expect("write schema file");
        path
    }

    pub fn open_database(&self) -> Connection {
        Connection::open(self.database()).expect("open database")
    }
}

pub const PATIENT_SCHEMA: &str = r#"{
    "description": "Patient demographics",
    "primaryKey": [{"columnName": "PAT_ID"}],
    "columns": [
        {"name": "PAT_ID", "type": "INTEGER", "description": "Unique patient id"},
        {"name": "PAT_NAME", "type": "VARCHAR", "description": "Name -- last, first"}
    ]
}"#;

/// Returns `(typeof(column), column as text)` for every row, in rowid order.
pub fn typed_column(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Vec<(String, Option<String>)> {
    let sql = format!(
        "SELECT typeof(\"{column}\"), CAST(\"{column}\" AS TEXT) FROM \"{table}\" ORDER BY rowid"
    );
    let mut stmt = conn.prepare(&sql).expect("prepare select");
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query rows")
        .collect::<Result<Vec<_>, _>>()
        .expect("collect rows")
}

pub fn row_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
        .expect("count rows")
}
