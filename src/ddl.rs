//! Destination table definitions.
//!
//! Tables are always dropped and recreated; nothing is altered in place. With
//! a descriptor the DDL carries storage types, a composite primary key, and
//! the descriptive text as inline `--` comments (SQLite keeps the original
//! statement text in `sqlite_master`). Without one, every header column is
//! created as `TEXT`.

use std::collections::HashSet;

use itertools::Itertools;
use log::debug;
use rusqlite::Connection;

use crate::{
    error::TableError,
    schema::{ColumnType, TableSchema, sanitize_comment},
};

/// The authoritative column list of a created table, in DDL order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
}

impl TableLayout {
    pub fn untyped(headers: &[String]) -> Self {
        Self {
            columns: headers.to_vec(),
            types: vec![ColumnType::Text; headers.len()],
        }
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn drop_table(conn: &Connection, table: &str) -> rusqlite::Result<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_identifier(table)))
}

/// Renders the `CREATE TABLE` statement for a descriptor.
pub fn schema_create_statement(table: &str, schema: &TableSchema) -> Result<String, TableError> {
    validate_schema(table, schema)?;
    let primary_key = schema.primary_key_columns();

    let mut sql = format!("CREATE TABLE {} (", quote_identifier(table));
    push_comment(&mut sql, schema.description.as_deref());
    sql.push('\n');

    let last = schema.columns.len() - 1;
    for (idx, column) in schema.columns.iter().enumerate() {
        let separator = if idx < last || !primary_key.is_empty() {
            ","
        } else {
            ""
        };
        sql.push_str(&format!(
            "  {} {}{separator}",
            quote_identifier(&column.name),
            column.column_type().sql_name()
        ));
        push_comment(&mut sql, column.description.as_deref());
        sql.push('\n');
    }
    if !primary_key.is_empty() {
        sql.push_str(&format!(
            "  PRIMARY KEY ({})\n",
            primary_key.iter().map(|c| quote_identifier(c)).join(", ")
        ));
    }
    sql.push(')');
    Ok(sql)
}

pub fn header_create_statement(table: &str, headers: &[String]) -> Result<String, TableError> {
    ensure_unique_columns(table, headers.iter().map(String::as_str))?;
    if headers.is_empty() {
        return Err(TableError::create(table, "no columns to create"));
    }
    Ok(format!(
        "CREATE TABLE {} ({})",
        quote_identifier(table),
        headers
            .iter()
            .map(|h| format!("{} TEXT", quote_identifier(h)))
            .join(", ")
    ))
}

/// Drops and recreates `table` from its descriptor, returning the
/// authoritative column layout.
pub fn create_from_schema(
    conn: &Connection,
    table: &str,
    schema: &TableSchema,
) -> Result<TableLayout, TableError> {
    drop_table(conn, table).map_err(|e| TableError::create(table, e))?;
    let sql = schema_create_statement(table, schema)?;
    debug!("Creating {table} with {} typed column(s)", schema.columns.len());
    conn.execute_batch(&sql)
        .map_err(|e| TableError::create(table, e))?;
    Ok(TableLayout {
        columns: schema.column_names(),
        types: schema.column_types(),
    })
}

/// Drops and recreates `table` with one `TEXT` column per header name.
pub fn create_from_header(
    conn: &Connection,
    table: &str,
    headers: &[String],
) -> Result<TableLayout, TableError> {
    drop_table(conn, table).map_err(|e| TableError::create(table, e))?;
    let sql = header_create_statement(table, headers)?;
    debug!("Creating {table} untyped from {} header column(s)", headers.len());
    conn.execute_batch(&sql)
        .map_err(|e| TableError::create(table, e))?;
    Ok(TableLayout::untyped(headers))
}

fn push_comment(sql: &mut String, text: Option<&str>) {
    let Some(text) = text else {
        return;
    };
    let sanitized = sanitize_comment(text);
    let sanitized = sanitized.trim();
    if !sanitized.is_empty() {
        sql.push_str(" -- ");
        sql.push_str(sanitized);
    }
}

fn validate_schema(table: &str, schema: &TableSchema) -> Result<(), TableError> {
    if schema.columns.is_empty() {
        return Err(TableError::create(table, "descriptor declares no columns"));
    }
    ensure_unique_columns(table, schema.columns.iter().map(|c| c.name.as_str()))?;
    let missing = schema
        .primary_key_columns()
        .into_iter()
        .filter(|key| !schema.columns.iter().any(|c| c.name == *key))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(TableError::create(
            table,
            format!(
                "primary key references unknown column(s): {}",
                missing.join(", ")
            ),
        ));
    }
    Ok(())
}

fn ensure_unique_columns<'a, I>(table: &str, names: I) -> Result<(), TableError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(TableError::create(
                table,
                format!("duplicate column name: {name}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, PrimaryKeyColumn};

    fn column(name: &str, ty: &str, description: Option<&str>) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            declared_type: Some(ty.to_string()),
            description: description.map(str::to_string),
        }
    }

    fn patient_schema() -> TableSchema {
        TableSchema {
            description: Some("Patient demographics -- one row\nper patient".to_string()),
            primary_key: vec![PrimaryKeyColumn {
                column_name: "PAT_ID".to_string(),
            }],
            columns: vec![
                column("PAT_ID", "INTEGER", Some("Internal id")),
                column("PAT_NAME", "VARCHAR", None),
            ],
        }
    }

    fn table_sql(conn: &Connection, table: &str) -> String {
        conn.query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn schema_statement_embeds_types_comments_and_key() {
        let sql = schema_create_statement("PATIENT", &patient_schema()).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"PATIENT\" ( -- Patient demographics \u{2014} one row per patient\n  \"PAT_ID\" INTEGER, -- Internal id\n  \"PAT_NAME\" TEXT,\n  PRIMARY KEY (\"PAT_ID\")\n)"
        );
    }

    #[test]
    fn schema_without_key_has_no_trailing_comma() {
        let mut schema = patient_schema();
        schema.primary_key.clear();
        let sql = schema_create_statement("PATIENT", &schema).unwrap();
        assert!(sql.contains("\"PAT_NAME\" TEXT\n)"));
    }

    #[test]
    fn create_from_schema_preserves_descriptor_order() {
        let conn = Connection::open_in_memory().unwrap();
        let mut schema = patient_schema();
        schema.columns.reverse();
        let layout = create_from_schema(&conn, "PATIENT", &schema).unwrap();
        assert_eq!(layout.columns, vec!["PAT_NAME", "PAT_ID"]);
        assert_eq!(layout.types, vec![ColumnType::Text, ColumnType::Integer]);

        let mut stmt = conn.prepare("SELECT * FROM \"PATIENT\"").unwrap();
        let names: Vec<&str> = stmt.column_names();
        assert_eq!(names, vec!["PAT_NAME", "PAT_ID"]);
    }

    #[test]
    fn stored_ddl_keeps_descriptions() {
        let conn = Connection::open_in_memory().unwrap();
        create_from_schema(&conn, "PATIENT", &patient_schema()).unwrap();
        let sql = table_sql(&conn, "PATIENT");
        assert!(sql.contains("-- Internal id"));
        assert!(sql.contains("Patient demographics"));
    }

    #[test]
    fn recreating_a_table_discards_previous_rows() {
        let conn = Connection::open_in_memory().unwrap();
        create_from_schema(&conn, "PATIENT", &patient_schema()).unwrap();
        conn.execute("INSERT INTO \"PATIENT\" VALUES (1, 'a')", [])
            .unwrap();
        let first = table_sql(&conn, "PATIENT");

        create_from_schema(&conn, "PATIENT", &patient_schema()).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM \"PATIENT\"", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(table_sql(&conn, "PATIENT"), first);
    }

    #[test]
    fn unknown_primary_key_column_fails_create() {
        let conn = Connection::open_in_memory().unwrap();
        let mut schema = patient_schema();
        schema.primary_key.push(PrimaryKeyColumn {
            column_name: "MISSING".to_string(),
        });
        let err = create_from_schema(&conn, "PATIENT", &schema).unwrap_err();
        assert!(matches!(err, TableError::Create { .. }));
        assert!(err.to_string().contains("MISSING"));
    }

    #[test]
    fn descriptor_without_columns_fails_create() {
        let conn = Connection::open_in_memory().unwrap();
        let err = create_from_schema(&conn, "EMPTY", &TableSchema::default()).unwrap_err();
        assert!(matches!(err, TableError::Create { .. }));
    }

    #[test]
    fn header_mode_creates_text_columns_in_header_order() {
        let conn = Connection::open_in_memory().unwrap();
        let headers = vec!["B".to_string(), "A".to_string()];
        let layout = create_from_header(&conn, "NOTES", &headers).unwrap();
        assert_eq!(layout.types, vec![ColumnType::Text, ColumnType::Text]);
        assert_eq!(table_sql(&conn, "NOTES"), "CREATE TABLE \"NOTES\" (\"B\" TEXT, \"A\" TEXT)");
    }

    #[test]
    fn duplicate_header_names_fail_create() {
        let conn = Connection::open_in_memory().unwrap();
        let headers = vec!["A".to_string(), "a".to_string()];
        assert!(create_from_header(&conn, "DUP", &headers).is_err());
    }

    #[test]
    fn identifiers_with_quotes_are_escaped() {
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
