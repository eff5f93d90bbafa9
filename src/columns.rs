//! Column listing from a table descriptor.
//!
//! Renders each column's position, name, declared type label, the storage
//! type it maps to, its primary-key membership, and its description.

use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::ColumnsArgs,
    schema::TableSchema,
    table::{Align, TextTable},
};

const DESCRIPTION_WIDTH: usize = 60;

pub fn execute(args: &ColumnsArgs) -> Result<()> {
    let schema = TableSchema::load(&args.schema)
        .with_context(|| format!("Loading schema from {schema:?}", schema = args.schema))?;

    if let Some(description) = schema.description.as_deref().filter(|d| !d.trim().is_empty()) {
        println!("{}\n", description.trim());
    }
    if schema.columns.is_empty() {
        info!("Schema {:?} does not define any columns", args.schema);
        return Ok(());
    }
    print!("{}", render_columns(&schema, args.full));
    info!(
        "Listed {} column(s) from {:?}",
        schema.columns.len(),
        args.schema
    );
    Ok(())
}

pub fn render_columns(schema: &TableSchema, full_descriptions: bool) -> String {
    let mut table = TextTable::new(["#", "name", "declared", "storage", "key", "description"])
        .align(0, Align::Right);
    if !full_descriptions {
        table = table.max_width(5, DESCRIPTION_WIDTH);
    }
    for (idx, column) in schema.columns.iter().enumerate() {
        table.push_row(vec![
            (idx + 1).to_string(),
            column.name.clone(),
            column.declared_type.clone().unwrap_or_default(),
            column.column_type().to_string(),
            if schema.is_primary_key(&column.name) {
                "PK".to_string()
            } else {
                String::new()
            },
            column.description.clone().unwrap_or_default(),
        ]);
    }
    table.render()
}
