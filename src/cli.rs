use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    loader::{
        DEFAULT_DATABASE, DEFAULT_EXTENSION, DEFAULT_SCHEMA_DIR, DEFAULT_SOURCE_DIR,
        SchemaErrorPolicy,
    },
    report::{DEFAULT_ERROR_LIMIT, SpotCheck},
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load a directory of delimited table exports into SQLite",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rebuild the database from every source file and print a run report
    Load(LoadArgs),
    /// List the columns, types, and key of a table descriptor
    Columns(ColumnsArgs),
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Directory holding one delimited file per table
    #[arg(short = 'i', long = "source-dir", default_value = DEFAULT_SOURCE_DIR)]
    pub source_dir: PathBuf,
    /// Directory holding one <TABLE>.json descriptor per table
    #[arg(short = 's', long = "schema-dir", default_value = DEFAULT_SCHEMA_DIR)]
    pub schema_dir: PathBuf,
    /// Destination SQLite database (deleted and rebuilt on every run)
    #[arg(short = 'o', long = "database", default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,
    /// File extension that marks a source table
    #[arg(long, default_value = DEFAULT_EXTENSION)]
    pub extension: String,
    /// Field delimiter (supports 'tab', ',', ';', '|'); defaults from the extension
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the source files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// How to treat a descriptor that exists but cannot be parsed
    #[arg(long = "schema-errors", value_enum, default_value = "skip")]
    pub schema_errors: SchemaErrorPolicy,
    /// Column population checks of the form TABLE.COLUMN (repeatable)
    #[arg(long = "spot-check", action = clap::ArgAction::Append)]
    pub spot_checks: Vec<SpotCheck>,
    /// Skip the spot checks entirely
    #[arg(long = "no-spot-checks", conflicts_with = "spot_checks")]
    pub no_spot_checks: bool,
    /// Maximum number of errors listed in the report
    #[arg(long = "error-limit", default_value_t = DEFAULT_ERROR_LIMIT)]
    pub error_limit: usize,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// Descriptor file to inspect
    #[arg(short = 'm', long = "schema")]
    pub schema: PathBuf,
    /// Print descriptions without truncation
    #[arg(long)]
    pub full: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_delimiter_accepts_names_and_characters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("\\t"), Ok(b'\t'));
        assert_eq!(parse_delimiter("pipe"), Ok(b'|'));
        assert_eq!(parse_delimiter("#"), Ok(b'#'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
    }

    #[test]
    fn load_defaults_match_export_layout() {
        let cli = Cli::try_parse_from(["tsv-sqlite-loader", "load"]).unwrap();
        let Commands::Load(args) = cli.command else {
            panic!("expected load command");
        };
        assert_eq!(args.source_dir, PathBuf::from("tsv"));
        assert_eq!(args.schema_dir, PathBuf::from("schemas"));
        assert_eq!(args.database, PathBuf::from("ehi_clean.db"));
        assert_eq!(args.schema_errors, SchemaErrorPolicy::Skip);
        assert_eq!(args.error_limit, 15);
        assert!(args.spot_checks.is_empty());
    }

    #[test]
    fn spot_checks_parse_as_table_column_pairs() {
        let cli = Cli::try_parse_from([
            "tsv-sqlite-loader",
            "load",
            "--spot-check",
            "PATIENT.PAT_NAME",
            "--spot-check",
            "ALLERGY.ALLERGEN_ID",
        ])
        .unwrap();
        let Commands::Load(args) = cli.command else {
            panic!("expected load command");
        };
        assert_eq!(
            args.spot_checks,
            vec![
                SpotCheck::new("PATIENT", "PAT_NAME"),
                SpotCheck::new("ALLERGY", "ALLERGEN_ID")
            ]
        );
        assert!(Cli::try_parse_from(["tsv-sqlite-loader", "load", "--spot-check", "BAD"]).is_err());
    }
}
