//! Row reading for delimited table exports.
//!
//! [`read_source_rows()`] parses a header-first delimited file into its
//! header and a list of [`Row`] mappings keyed by column name. Stray carriage
//! returns are stripped and undecodable bytes are replaced, so a single bad
//! line ending or byte never costs the whole file.

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::debug;

use crate::io_utils;

/// One data line, keyed by header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: HashMap<String, String>,
}

impl Row {
    pub fn from_record(headers: &[String], fields: Vec<String>) -> Self {
        let values = headers.iter().cloned().zip(fields).collect();
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceRows {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub lossy_rows: usize,
}

impl SourceRows {
    /// A header consisting of a single empty name counts as no header.
    pub fn has_header(&self) -> bool {
        !(self.headers.is_empty() || self.headers.len() == 1 && self.headers[0].is_empty())
    }
}

pub fn read_source_rows(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<SourceRows> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let header_record = reader
        .byte_headers()
        .with_context(|| format!("Reading header of {path:?}"))?
        .clone();
    let (headers, mut lossy) = io_utils::decode_header_lossy(&header_record, encoding);
    let mut lossy_rows = usize::from(lossy);

    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("Reading row {} in {path:?}", rows.len() + 2))?
    {
        let (fields, had_errors) = io_utils::decode_record_lossy(&record, encoding);
        if had_errors {
            lossy = true;
            lossy_rows += 1;
        }
        rows.push(Row::from_record(&headers, fields));
    }
    if lossy {
        debug!(
            "Replaced undecodable bytes on {lossy_rows} line(s) of {path:?} ({})",
            encoding.name()
        );
    }
    Ok(SourceRows {
        headers,
        rows,
        lossy_rows,
    })
}
