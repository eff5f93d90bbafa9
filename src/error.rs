//! Per-table failures. None of these abort a run; the loader records the
//! rendered message and moves on to the next table.
//!
//! A descriptor that is not valid JSON is a `Schema` error. A descriptor
//! that parses but cannot define a table (missing `name`/`columnName`,
//! unknown key columns, duplicate columns) is a `Create` error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("{table}: schema failed: {source:#}")]
    Schema {
        table: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{table}: CREATE failed: {reason}")]
    Create { table: String, reason: String },
    #[error("{table}: read failed: {source:#}")]
    Read {
        table: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{table}: empty TSV")]
    EmptySource { table: String },
    #[error("{table}: INSERT row {row}: {source}")]
    Insert {
        table: String,
        row: usize,
        #[source]
        source: rusqlite::Error,
    },
}

impl TableError {
    pub fn create(table: &str, reason: impl ToString) -> Self {
        TableError::Create {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_prefixed_with_the_table_name() {
        let err = TableError::create("PATIENT", "no such column: X");
        assert_eq!(err.to_string(), "PATIENT: CREATE failed: no such column: X");

        let empty = TableError::EmptySource {
            table: "NOTES".to_string(),
        };
        assert_eq!(empty.to_string(), "NOTES: empty TSV");
    }
}
