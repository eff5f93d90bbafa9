pub mod cli;
pub mod columns;
pub mod data;
pub mod ddl;
pub mod error;
pub mod io_utils;
pub mod loader;
pub mod report;
pub mod rows;
pub mod schema;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    loader::{LoadConfig, Loader},
    report::SpotCheck,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("tsv_sqlite_loader", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Load(args) => handle_load(&args),
        Commands::Columns(args) => columns::execute(&args),
    }
}

impl TryFrom<&cli::LoadArgs> for LoadConfig {
    type Error = anyhow::Error;

    fn try_from(args: &cli::LoadArgs) -> Result<Self> {
        Ok(LoadConfig {
            source_dir: args.source_dir.clone(),
            schema_dir: args.schema_dir.clone(),
            database: args.database.clone(),
            extension: args.extension.trim_start_matches('.').to_string(),
            delimiter: args.delimiter,
            encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
            schema_errors: args.schema_errors,
        })
    }
}

fn handle_load(args: &cli::LoadArgs) -> Result<()> {
    let config = LoadConfig::try_from(args)?;
    info!(
        "Loading '{}' (schemas '{}', delimiter '{}') -> {:?}",
        config.source_dir.display(),
        config.schema_dir.display(),
        printable_delimiter(config.delimiter()),
        config.database
    );
    let database = config.database.clone();
    let mut loader = Loader::open(config)?;
    let summary = loader.run()?;

    let checks = if args.no_spot_checks {
        Vec::new()
    } else if args.spot_checks.is_empty() {
        SpotCheck::defaults()
    } else {
        args.spot_checks.clone()
    };
    debug!("Running {} spot check(s)", checks.len());

    let conn = loader.into_connection();
    let report = report::render_summary(&summary, &conn, &checks, args.error_limit)
        .context("Rendering run report")?;
    conn.close()
        .map_err(|(_, err)| err)
        .with_context(|| format!("Closing database {database:?}"))?;
    print!("{report}");
    print!("{}", report::render_database_size(&database));
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
