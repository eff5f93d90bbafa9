//! Post-run reporting: counts, spot checks, the error list, and file size.
//!
//! Nothing here feeds back into loading; it only reads the [`RunSummary`] and
//! queries the finished database.

use std::{fmt::Write as _, fs, path::Path, str::FromStr};

use anyhow::{Result, anyhow};
use rusqlite::{Connection, types::ValueRef};

use crate::{ddl::quote_identifier, loader::RunSummary, table};

pub const DEFAULT_ERROR_LIMIT: usize = 15;
const SAMPLE_WIDTH: usize = 50;

pub const DEFAULT_SPOT_CHECKS: &[(&str, &str)] = &[
    ("HNO_INFO", "PAT_ENC_CSN_ID"),
    ("ARPB_VISITS", "PRIM_ENC_CSN_ID"),
    ("ARPB_TRANSACTIONS", "AMOUNT"),
    ("PATIENT", "PAT_NAME"),
    ("ALLERGY", "ALLERGEN_ID"),
    ("ORDER_RESULTS", "ORD_VALUE"),
    ("PATIENT_2", "PAT_ID"),
];

/// A `TABLE.COLUMN` pair whose population is checked after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotCheck {
    pub table: String,
    pub column: String,
}

impl SpotCheck {
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        DEFAULT_SPOT_CHECKS
            .iter()
            .map(|(table, column)| Self::new(table, column))
            .collect()
    }
}

impl FromStr for SpotCheck {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let (table, column) = value
            .trim()
            .split_once('.')
            .ok_or_else(|| anyhow!("Spot check '{value}' must look like TABLE.COLUMN"))?;
        if table.is_empty() || column.is_empty() {
            return Err(anyhow!("Spot check '{value}' must look like TABLE.COLUMN"));
        }
        Ok(Self::new(table, column))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotCheckResult {
    Counted {
        non_null: i64,
        total: i64,
        sample: Option<String>,
    },
    Failed(String),
}

pub fn run_spot_check(conn: &Connection, check: &SpotCheck) -> SpotCheckResult {
    match query_spot_check(conn, check) {
        Ok(result) => result,
        Err(err) => SpotCheckResult::Failed(err.to_string()),
    }
}

fn query_spot_check(conn: &Connection, check: &SpotCheck) -> rusqlite::Result<SpotCheckResult> {
    let table = quote_identifier(&check.table);
    let column = quote_identifier(&check.column);
    let populated = format!("{column} IS NOT NULL AND {column} != ''");

    let total: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    let non_null: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE {populated}"),
        [],
        |row| row.get(0),
    )?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {column} FROM {table} WHERE {populated} LIMIT 1"
    ))?;
    let mut rows = stmt.query([])?;
    let sample = match rows.next()? {
        Some(row) => Some(render_sample(row.get_ref(0)?)),
        None => None,
    };
    Ok(SpotCheckResult::Counted {
        non_null,
        total,
        sample,
    })
}

fn render_sample(value: ValueRef<'_>) -> String {
    let text = match value {
        ValueRef::Null => "None".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
    };
    text.chars().take(SAMPLE_WIDTH).collect()
}

pub fn count_tables(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
        [],
        |row| row.get(0),
    )
}

pub fn render_spot_checks(conn: &Connection, checks: &[SpotCheck]) -> String {
    let headers = vec![
        "check".to_string(),
        "populated".to_string(),
        "sample".to_string(),
    ];
    let rows = checks
        .iter()
        .map(|check| {
            let label = format!("{}.{}", check.table, check.column);
            match run_spot_check(conn, check) {
                SpotCheckResult::Counted {
                    non_null,
                    total,
                    sample,
                } => vec![
                    label,
                    format!("{non_null}/{total}"),
                    sample.unwrap_or_else(|| "N/A".to_string()),
                ],
                SpotCheckResult::Failed(message) => vec![label, "ERROR".to_string(), message],
            }
        })
        .collect::<Vec<_>>();
    table::render_table(&headers, &rows)
}

pub fn render_errors(errors: &[&str], limit: usize) -> String {
    let mut output = String::new();
    if errors.is_empty() {
        return output;
    }
    let _ = writeln!(output, "Errors ({}):", errors.len());
    for error in errors.iter().take(limit) {
        let _ = writeln!(output, "  {error}");
    }
    if errors.len() > limit {
        let _ = writeln!(output, "  ... and {} more", errors.len() - limit);
    }
    output
}

pub fn render_summary(
    summary: &RunSummary,
    conn: &Connection,
    checks: &[SpotCheck],
    error_limit: usize,
) -> Result<String> {
    let mut output = String::new();
    let _ = writeln!(output, "Files discovered: {}", summary.files_discovered);
    let _ = writeln!(output, "Tables created: {}", count_tables(conn)?);
    let _ = writeln!(output, "Tables OK: {}", summary.tables_ok());
    let _ = writeln!(output, "Total rows: {}", summary.rows_inserted());
    if summary.rows_rejected() > 0 {
        let _ = writeln!(output, "Rows rejected: {}", summary.rows_rejected());
    }

    if !checks.is_empty() {
        let _ = writeln!(output, "\n=== Spot checks ===");
        output.push_str(&render_spot_checks(conn, checks));
    }

    let errors = summary.errors();
    if !errors.is_empty() {
        output.push('\n');
        output.push_str(&render_errors(&errors, error_limit));
    }

    Ok(output)
}

/// Size line for the finished database. Call after the connection is closed
/// so the write-ahead log has been folded into the main file.
pub fn render_database_size(database: &Path) -> String {
    let size = fs::metadata(database).map(|m| m.len()).unwrap_or(0);
    format!(
        "\nDatabase: {} ({:.0} KB)\n",
        database.display(),
        size as f64 / 1024.0
    )
}
