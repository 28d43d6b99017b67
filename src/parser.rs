//! Shared decoding helpers for status pages
//!
//! Three page shapes show up across vendors: HTML tables (row-per-channel or
//! transposed with one column per channel), delimited strings assigned to a
//! JavaScript variable, and delimited strings inside HNAP responses. The
//! helpers here turn each into plain cell text; vendor modules map cells to
//! `Channel` fields.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").unwrap());

/// A table's own rows as whitespace-normalized cell text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub id: Option<String>,
    /// `summary` or `class` attribute, whichever is present
    pub label: Option<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Text of the first cell of the first row
    pub fn caption(&self) -> &str {
        self.rows
            .first()
            .and_then(|r| r.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Index of the row whose cells include every `labels` entry
    pub fn header_row(&self, labels: &[&str]) -> Option<usize> {
        self.rows.iter().position(|row| {
            labels
                .iter()
                .all(|l| row.iter().any(|cell| eq_ci(cell, l)))
        })
    }

    /// Cells after the label in the first row whose label starts with `label`.
    /// For transposed tables where each column is a channel.
    pub fn row_values(&self, label: &str) -> Option<&[String]> {
        let label = label.to_lowercase();
        self.rows
            .iter()
            .find(|row| {
                row.first()
                    .map(|c| c.to_lowercase().starts_with(&label))
                    .unwrap_or(false)
            })
            .map(|row| &row[1..])
    }

    /// Two-column `label | value` lookup
    pub fn value_of(&self, label: &str) -> Option<&str> {
        self.row_values(label)
            .and_then(|v| v.first())
            .map(String::as_str)
    }
}

/// Column positions resolved from a header row by name
#[derive(Debug, Clone)]
pub struct Columns {
    names: Vec<String>,
}

impl Columns {
    pub fn new(header: &[String]) -> Self {
        Self {
            names: header.iter().map(|h| h.to_lowercase()).collect(),
        }
    }

    /// First column whose header contains `name` (case-insensitive)
    pub fn index(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.names.iter().position(|h| h.contains(&name))
    }

    /// Cell under the named column
    pub fn get<'a>(&self, row: &'a [String], name: &str) -> Option<&'a str> {
        self.index(name)
            .and_then(|i| row.get(i))
            .map(String::as_str)
    }
}

fn eq_ci(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cell_text(cell: ElementRef<'_>) -> String {
    normalize(&cell.text().collect::<String>())
}

fn table_from(table: ElementRef<'_>) -> Table {
    let table_id = table.id();
    let rows = table
        .select(&ROW)
        .filter(|tr| {
            // Only rows owned by this table, not by tables nested in its cells
            tr.ancestors()
                .find(|n| {
                    n.value()
                        .as_element()
                        .map(|e| e.name() == "table")
                        .unwrap_or(false)
                })
                .map(|n| n.id() == table_id)
                .unwrap_or(false)
        })
        .map(|tr| {
            tr.children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .map(cell_text)
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    let attrs = table.value();
    Table {
        id: attrs.attr("id").map(str::to_string),
        label: attrs
            .attr("summary")
            .or_else(|| attrs.attr("class"))
            .map(str::to_string),
        rows,
    }
}

/// Every table in the document, in document order
pub fn extract_tables(html: &str) -> Vec<Table> {
    let doc = Html::parse_document(html);
    doc.select(&TABLE).map(table_from).collect()
}

/// Table with the given `id`
pub fn table_by_id<'a>(tables: &'a [Table], id: &str) -> Option<&'a Table> {
    tables.iter().find(|t| t.id.as_deref() == Some(id))
}

/// First table whose caption cell starts with `caption`
pub fn table_by_caption<'a>(tables: &'a [Table], caption: &str) -> Option<&'a Table> {
    let caption = caption.to_lowercase();
    tables
        .iter()
        .find(|t| t.caption().to_lowercase().starts_with(&caption))
}

/// First table whose summary/class attribute contains `text`
pub fn table_by_label<'a>(tables: &'a [Table], text: &str) -> Option<&'a Table> {
    let text = text.to_lowercase();
    tables.iter().find(|t| {
        t.label
            .as_deref()
            .map(|l| l.to_lowercase().contains(&text))
            .unwrap_or(false)
    })
}

/// Text content of the element with this `id`
pub fn element_text_by_id(html: &str, id: &str) -> Option<String> {
    let selector = Selector::parse(&format!("#{}", id)).ok()?;
    let doc = Html::parse_document(html);
    let text = doc.select(&selector).next().map(cell_text)?;
    (!text.is_empty()).then_some(text)
}

/// String literal assigned to `var <name>` inside `function <func>()`
pub fn js_function_var(body: &str, func: &str, var: &str) -> Option<String> {
    let pattern = format!(
        r#"function\s+{}\s*\(\s*\)\s*\{{[^}}]*?var\s+{}\s*=\s*(?:'([^']*)'|"([^"]*)")"#,
        regex::escape(func),
        regex::escape(var)
    );
    let caps = Regex::new(&pattern).ok()?.captures(body)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Split `a^b^c|+|d^e^f` style payloads into trimmed field rows
pub fn split_delimited<'a>(payload: &'a str, row_sep: &str, field_sep: &str) -> Vec<Vec<&'a str>> {
    payload
        .split(row_sep)
        .map(str::trim)
        .filter(|row| !row.is_empty())
        .map(|row| {
            let row = row.strip_suffix(field_sep).unwrap_or(row);
            row.split(field_sep).map(str::trim).collect()
        })
        .collect()
}

/// First number in a cell: `"-3.2 dBmV"` -> `-3.2`
pub fn parse_number(text: &str) -> Option<f64> {
    NUMBER.find(text)?.as_str().parse().ok()
}

/// Integer cell, tolerating units and thousands separators
pub fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text.trim().chars().filter(|c| *c != ',').collect();
    let n = parse_number(&digits)?;
    (n >= 0.0 && n.fract() == 0.0).then_some(n as u64)
}

/// Channel id cell; must be a plain non-negative integer
pub fn parse_channel_id(text: &str) -> Option<u32> {
    text.trim().parse().ok()
}

/// Frequency in whole Hz. Values that only make sense as MHz (`"567.0"`,
/// `"609 MHz"`) are scaled.
pub fn parse_frequency_hz(text: &str) -> Option<f64> {
    let value = parse_number(text)?;
    let lower = text.to_lowercase();
    let hz = if lower.contains("khz") {
        value * 1_000.0
    } else if lower.contains("mhz") || value < 10_000.0 {
        value * 1_000_000.0
    } else {
        value
    };
    Some(hz.round())
}

/// Non-empty trimmed text, else `None`
pub fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Modulation names that mark a DOCSIS 3.1 channel
pub fn is_ofdm_modulation(text: &str) -> bool {
    text.to_uppercase().contains("OFDM")
}
