//! Plain-text table rendering for reports and descriptor listings.

use std::borrow::Cow;
use std::fmt::Write as _;

/// Narrowest column; also the shortest rule segment.
const MIN_WIDTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Right,
}

/// Column-aligned text table. Cells wider than a column's cap are cut and
/// suffixed with `...`.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    aligns: Vec<Align>,
    max_widths: Vec<Option<usize>>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let count = headers.len();
        Self {
            headers,
            aligns: vec![Align::Left; count],
            max_widths: vec![None; count],
            rows: Vec::new(),
        }
    }

    pub fn align(mut self, column: usize, align: Align) -> Self {
        if let Some(slot) = self.aligns.get_mut(column) {
            *slot = align;
        }
        self
    }

    pub fn max_width(mut self, column: usize, width: usize) -> Self {
        if let Some(slot) = self.max_widths.get_mut(column) {
            *slot = Some(width.max(4));
        }
        self
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let cells = self
            .rows
            .iter()
            .map(|row| {
                (0..self.headers.len())
                    .map(|idx| self.fit(idx, row.get(idx).map(String::as_str).unwrap_or("")))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let mut widths = self
            .headers
            .iter()
            .map(|h| h.chars().count().max(MIN_WIDTH))
            .collect::<Vec<_>>();
        for row in &cells {
            for (idx, cell) in row.iter().enumerate() {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
        }

        let mut output = String::new();
        let header_cells = self
            .headers
            .iter()
            .map(|h| Cow::Borrowed(h.as_str()))
            .collect::<Vec<_>>();
        let _ = writeln!(output, "{}", self.format_row(&header_cells, &widths));
        let rule = widths
            .iter()
            .map(|w| Cow::Owned("-".repeat(*w)))
            .collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_cells(&rule, &widths, &[]));
        for row in &cells {
            let _ = writeln!(output, "{}", self.format_row(row, &widths));
        }
        output
    }

    fn fit<'a>(&self, column: usize, value: &'a str) -> Cow<'a, str> {
        let flattened = flatten_whitespace(value);
        match self.max_widths.get(column).copied().flatten() {
            Some(limit) if flattened.chars().count() > limit => {
                let cut: String = flattened.chars().take(limit - 3).collect();
                Cow::Owned(format!("{cut}..."))
            }
            _ => flattened,
        }
    }

    fn format_row(&self, cells: &[Cow<'_, str>], widths: &[usize]) -> String {
        format_cells(cells, widths, &self.aligns)
    }
}

fn format_cells(cells: &[Cow<'_, str>], widths: &[usize], aligns: &[Align]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(idx, (cell, &width))| match aligns.get(idx).copied().unwrap_or_default() {
            Align::Left => format!("{cell:<width$}"),
            Align::Right => format!("{cell:>width$}"),
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn flatten_whitespace(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(
            value
                .chars()
                .map(|ch| if matches!(ch, '\n' | '\r' | '\t') { ' ' } else { ch })
                .collect(),
        )
    } else {
        Cow::Borrowed(value)
    }
}

/// Renders left-aligned headers and rows.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut table = TextTable::new(headers.iter().cloned());
    for row in rows {
        table.push_row(row.clone());
    }
    table.render()
}
