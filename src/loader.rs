//! Per-table bulk loading into SQLite.
//!
//! [`Loader::run`] walks every source file of an export and, one table at a
//! time, looks up its descriptor, reads its rows, (re)creates the destination
//! table, coerces the cells, and inserts them. A failure is confined to its
//! table: it is recorded in the [`RunSummary`] and the run moves on.
//!
//! ## Insertion strategy
//!
//! All rows of a table are first inserted as one unit inside a savepoint using
//! `INSERT OR REPLACE`, so rows sharing a primary key collapse to the last one.
//! If any row fails the savepoint is rolled back and the rows are retried one
//! at a time. Only a failure of the very first row is itemized; later failures
//! are counted as rejected.
//!
//! ## Durability
//!
//! The destination is a disposable artifact rebuilt from scratch on every
//! run: the file is deleted up front, `synchronous` is off, and everything is
//! committed once at the end.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use encoding_rs::{Encoding, UTF_8};
use itertools::Itertools;
use log::{debug, info, warn};
use rusqlite::{Connection, params_from_iter};

use crate::{
    data::{self, Value},
    ddl::{self, TableLayout, quote_identifier},
    error::TableError,
    io_utils::{self, SourceFile},
    rows::{self, SourceRows},
    schema::TableSchema,
};

pub const DEFAULT_SOURCE_DIR: &str = "tsv";
pub const DEFAULT_SCHEMA_DIR: &str = "schemas";
pub const DEFAULT_DATABASE: &str = "ehi_clean.db";
pub const DEFAULT_EXTENSION: &str = "tsv";

const BULK_SAVEPOINT: &str = "bulk_insert";

/// What to do with a table whose descriptor exists but cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SchemaErrorPolicy {
    /// Record the error and skip the table
    #[default]
    Skip,
    /// Record the error and load the table untyped from its header
    Fallback,
}

#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub source_dir: PathBuf,
    pub schema_dir: PathBuf,
    pub database: PathBuf,
    pub extension: String,
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    pub schema_errors: SchemaErrorPolicy,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            schema_dir: PathBuf::from(DEFAULT_SCHEMA_DIR),
            database: PathBuf::from(DEFAULT_DATABASE),
            extension: DEFAULT_EXTENSION.to_string(),
            delimiter: None,
            encoding: UTF_8,
            schema_errors: SchemaErrorPolicy::Skip,
        }
    }
}

impl LoadConfig {
    /// Configuration rooted at `root`, using the default directory layout.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            source_dir: root.join(DEFAULT_SOURCE_DIR),
            schema_dir: root.join(DEFAULT_SCHEMA_DIR),
            database: root.join(DEFAULT_DATABASE),
            ..Self::default()
        }
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
            .unwrap_or_else(|| io_utils::delimiter_for_extension(&self.extension))
    }

    fn ensure_inputs(&self) -> Result<()> {
        if !self.source_dir.is_dir() {
            bail!("Source directory {:?} does not exist", self.source_dir);
        }
        if !self.schema_dir.is_dir() {
            bail!("Schema directory {:?} does not exist", self.schema_dir);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Schema,
    Fallback,
}

/// Where a table's load ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    SchemaLookup,
    RowRead,
    TableDefine,
    Coerce,
    BulkInsert,
    RowFallback,
    Done,
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableOutcome {
    pub table: String,
    pub mode: Option<LoadMode>,
    pub stage: LoadStage,
    pub created: bool,
    pub inserted: usize,
    pub rejected: usize,
    pub errors: Vec<String>,
}

impl TableOutcome {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            mode: None,
            stage: LoadStage::SchemaLookup,
            created: false,
            inserted: 0,
            rejected: 0,
            errors: Vec::new(),
        }
    }

    fn skip(mut self, error: TableError) -> Self {
        warn!("{error}");
        self.stage = LoadStage::Skipped;
        self.errors.push(error.to_string());
        self
    }

    /// A table is OK when it was created and either has rows in it or had no
    /// rows to load.
    pub fn is_ok(&self) -> bool {
        self.created && (self.inserted > 0 || self.rejected == 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub files_discovered: usize,
    pub outcomes: Vec<TableOutcome>,
}

impl RunSummary {
    pub fn tables_attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn tables_ok(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn rows_inserted(&self) -> usize {
        self.outcomes.iter().map(|o| o.inserted).sum()
    }

    pub fn rows_rejected(&self) -> usize {
        self.outcomes.iter().map(|o| o.rejected).sum()
    }

    pub fn errors(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .flat_map(|o| o.errors.iter().map(String::as_str))
            .collect()
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.outcomes.iter().find(|o| o.table == table)
    }
}

pub struct Loader {
    conn: Connection,
    config: LoadConfig,
}

impl Loader {
    /// Deletes any previous destination database and opens a fresh one.
    pub fn open(config: LoadConfig) -> Result<Self> {
        remove_database_files(&config.database)?;
        let conn = Connection::open(&config.database)
            .with_context(|| format!("Opening database {:?}", config.database))?;
        configure_connection(&conn)
            .with_context(|| format!("Configuring database {:?}", config.database))?;
        Ok(Self { conn, config })
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        self.config.ensure_inputs()?;
        let sources =
            io_utils::discover_sources(&self.config.source_dir, &self.config.extension)?;
        info!(
            "Loading {} source file(s) from {:?} into {:?}",
            sources.len(),
            self.config.source_dir,
            self.config.database
        );

        let tx = self
            .conn
            .transaction()
            .context("Starting load transaction")?;
        let mut summary = RunSummary {
            files_discovered: sources.len(),
            outcomes: Vec::with_capacity(sources.len()),
        };
        for source in &sources {
            summary.outcomes.push(load_table(&tx, &self.config, source));
        }
        tx.commit().context("Committing loaded tables")?;

        info!(
            "Loaded {} of {} table(s), {} row(s) inserted, {} row(s) rejected",
            summary.tables_ok(),
            summary.tables_attempted(),
            summary.rows_inserted(),
            summary.rows_rejected()
        );
        Ok(summary)
    }
}

fn configure_connection(conn: &Connection) -> Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("journal_mode={mode}");
    conn.pragma_update(None, "synchronous", "OFF")?;
    Ok(())
}

fn remove_database_files(database: &Path) -> Result<()> {
    let mut paths = vec![database.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut side = database.as_os_str().to_os_string();
        side.push(suffix);
        paths.push(PathBuf::from(side));
    }
    for path in paths {
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed previous {path:?}"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("Removing previous database {path:?}"));
            }
        }
    }
    Ok(())
}

/// Loads one source file into `conn`. Never fails: problems are captured in
/// the returned outcome.
pub fn load_table(conn: &Connection, config: &LoadConfig, source: &SourceFile) -> TableOutcome {
    let table = source.table.as_str();
    let mut outcome = TableOutcome::new(table);

    let schema = match TableSchema::load_for_table(&config.schema_dir, table) {
        Ok(schema) => schema,
        Err(err) => match config.schema_errors {
            SchemaErrorPolicy::Skip => return outcome.skip(err),
            SchemaErrorPolicy::Fallback => {
                warn!("{err}; loading {table} untyped");
                outcome.errors.push(err.to_string());
                None
            }
        },
    };

    outcome.stage = LoadStage::RowRead;
    let source_rows = match read_rows(source, config) {
        Ok(rows) => rows,
        Err(err) => return outcome.skip(err),
    };

    outcome.stage = LoadStage::TableDefine;
    let defined = match &schema {
        Some(schema) => ddl::create_from_schema(conn, table, schema).map(|l| (l, LoadMode::Schema)),
        None => ddl::create_from_header(conn, table, &source_rows.headers)
            .map(|l| (l, LoadMode::Fallback)),
    };
    let (layout, mode) = match defined {
        Ok(defined) => defined,
        Err(err) => return outcome.skip(err),
    };
    outcome.created = true;
    outcome.mode = Some(mode);

    if source_rows.rows.is_empty() {
        debug!("{table}: created empty ({mode:?})");
        outcome.stage = LoadStage::Done;
        return outcome;
    }

    outcome.stage = LoadStage::Coerce;
    let batch = coerce_rows(&source_rows, &layout);

    outcome.stage = LoadStage::BulkInsert;
    let stats = insert_batch(conn, table, &layout, &batch);
    if stats.fell_back {
        outcome.stage = LoadStage::RowFallback;
    }
    outcome.inserted = stats.inserted;
    outcome.rejected = stats.rejected;
    if let Some(err) = stats.first_error {
        warn!("{err}");
        outcome.errors.push(err.to_string());
    }
    debug!(
        "{table}: {} row(s) inserted, {} rejected ({mode:?})",
        outcome.inserted, outcome.rejected
    );
    outcome.stage = LoadStage::Done;
    outcome
}

fn read_rows(source: &SourceFile, config: &LoadConfig) -> Result<SourceRows, TableError> {
    let source_rows = rows::read_source_rows(&source.path, config.delimiter(), config.encoding)
        .map_err(|err| TableError::Read {
            table: source.table.clone(),
            source: err,
        })?;
    if !source_rows.has_header() {
        return Err(TableError::EmptySource {
            table: source.table.clone(),
        });
    }
    Ok(source_rows)
}

/// Coerces every row positionally against the table layout. Columns a row
/// does not carry become null.
pub fn coerce_rows(source: &SourceRows, layout: &TableLayout) -> Vec<Vec<Option<Value>>> {
    source
        .rows
        .iter()
        .map(|row| {
            data::coerce_row(
                layout.columns.iter().map(|column| row.get(column)),
                &layout.types,
            )
        })
        .collect()
}

pub fn insert_statement(table: &str, columns: &[String]) -> String {
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        columns.iter().map(|c| quote_identifier(c)).join(", "),
        std::iter::repeat_n("?", columns.len()).join(", ")
    )
}

#[derive(Debug, Default)]
struct InsertStats {
    inserted: usize,
    rejected: usize,
    fell_back: bool,
    first_error: Option<TableError>,
}

fn insert_batch(
    conn: &Connection,
    table: &str,
    layout: &TableLayout,
    batch: &[Vec<Option<Value>>],
) -> InsertStats {
    let sql = insert_statement(table, &layout.columns);
    let mut stats = InsertStats::default();

    match bulk_insert(conn, &sql, batch) {
        Ok(()) => {
            stats.inserted = batch.len();
            return stats;
        }
        Err(err) => {
            debug!("{table}: bulk insert failed ({err}); retrying row by row");
            stats.fell_back = true;
        }
    }

    let mut stmt = match conn.prepare_cached(&sql) {
        Ok(stmt) => stmt,
        Err(source) => {
            stats.rejected = batch.len();
            stats.first_error = Some(TableError::Insert {
                table: table.to_string(),
                row: 0,
                source,
            });
            return stats;
        }
    };
    for (idx, values) in batch.iter().enumerate() {
        match stmt.execute(params_from_iter(values.iter())) {
            Ok(_) => stats.inserted += 1,
            Err(source) => {
                stats.rejected += 1;
                if idx == 0 {
                    stats.first_error = Some(TableError::Insert {
                        table: table.to_string(),
                        row: idx,
                        source,
                    });
                }
            }
        }
    }
    stats
}

fn bulk_insert(conn: &Connection, sql: &str, batch: &[Vec<Option<Value>>]) -> rusqlite::Result<()> {
    conn.execute_batch(&format!("SAVEPOINT {BULK_SAVEPOINT}"))?;
    let result = conn.prepare_cached(sql).and_then(|mut stmt| {
        batch
            .iter()
            .try_for_each(|values| stmt.execute(params_from_iter(values.iter())).map(|_| ()))
    });
    match result {
        Ok(()) => conn.execute_batch(&format!("RELEASE {BULK_SAVEPOINT}")),
        Err(err) => {
            conn.execute_batch(&format!(
                "ROLLBACK TO {BULK_SAVEPOINT}; RELEASE {BULK_SAVEPOINT}"
            ))?;
            Err(err)
        }
    }
}
