//! I/O utilities for reading delimited exports.
//!
//! All source file access flows through this module. It provides:
//!
//! - **Delimiter resolution**: extension-based auto-detection (`.tsv` → tab,
//!   anything else → comma) with manual override support.
//! - **Encoding**: permissive decoding via `encoding_rs`, defaulting to UTF-8.
//!   Undecodable byte sequences become U+FFFD instead of failing the file.
//! - **Reader construction**: `open_csv_reader` and `open_csv_reader_from_path`.
//! - **Discovery**: `discover_sources` lists the table files of an export.

use std::{
    fs::{self, File},
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn delimiter_for_extension(extension: &str) -> u8 {
    if extension.eq_ignore_ascii_case("tsv") {
        DEFAULT_TSV_DELIMITER
    } else {
        DEFAULT_CSV_DELIMITER
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    Ok(open_csv_reader(BufReader::new(file), delimiter))
}

/// Decodes `bytes`, substituting replacement characters for malformed input.
/// Byte-order marks are not sniffed: the bytes are always read as `encoding`.
/// Returns the text and whether any substitution happened.
pub fn decode_lossy(bytes: &[u8], encoding: &'static Encoding) -> (String, bool) {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    (text.into_owned(), had_errors)
}

/// Decodes every field of `record` and strips trailing carriage returns left
/// behind by mixed line endings. The flag reports lossy decoding.
pub fn decode_record_lossy(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> (Vec<String>, bool) {
    decode_fields(record, encoding, false)
}

/// Like [`decode_record_lossy`], but drops a byte-order mark for `encoding`
/// at the very start of the first field.
pub fn decode_header_lossy(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> (Vec<String>, bool) {
    decode_fields(record, encoding, true)
}

fn decode_fields(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
    strip_bom: bool,
) -> (Vec<String>, bool) {
    let mut lossy = false;
    let fields = record
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let (mut text, had_errors) = if strip_bom && idx == 0 {
                let (text, had_errors) = encoding.decode_with_bom_removal(field);
                (text.into_owned(), had_errors)
            } else {
                decode_lossy(field, encoding)
            };
            lossy |= had_errors;
            strip_trailing_cr(&mut text);
            text
        })
        .collect();
    (fields, lossy)
}

pub fn strip_trailing_cr(value: &mut String) {
    while value.ends_with('\r') {
        value.pop();
    }
}

/// A source table file discovered in the export directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub table: String,
    pub path: PathBuf,
}

/// Lists files in `dir` whose extension matches `extension`
/// (case-insensitive), sorted by file name. The table name is the file stem.
pub fn discover_sources(dir: &Path, extension: &str) -> Result<Vec<SourceFile>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Listing source directory {dir:?}"))?;
    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Reading entry in {dir:?}"))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !matches_extension {
            continue;
        }
        let Some(table) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        sources.push(SourceFile {
            table: table.to_string(),
            path,
        });
    }
    sources.sort_by(|left, right| left.path.file_name().cmp(&right.path.file_name()));
    Ok(sources)
}
