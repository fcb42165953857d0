use csv::WriterBuilder;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::Write;

/// How array values are flattened into a single cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ListFormat {
    /// Compact JSON array text, e.g. `["cat","dog"]`.
    #[default]
    Json,
    /// Element renderings joined with the given separator.
    Joined(String),
}

/// Rows of heterogeneous records under one schema: the ordered union of every
/// key seen, in first-seen order.
#[derive(Debug, Default)]
pub struct Table {
    columns: Vec<String>,
    seen: HashSet<String>,
    records: Vec<Map<String, Value>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Map<String, Value>) {
        for key in record.keys() {
            if self.seen.insert(key.clone()) {
                self.columns.push(key.clone());
            }
        }
        self.records.push(record);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One rendered row per record, exactly `columns().len()` cells each.
    pub fn rows<'a>(&'a self, list_format: &'a ListFormat) -> impl Iterator<Item = Vec<String>> + 'a {
        self.records.iter().map(move |record| {
            self.columns.iter()
                .map(|column| record.get(column).map_or_else(String::new, |v| render_cell(v, list_format)))
                .collect()
        })
    }

    /// Writes header and rows as delimited text. Returns the number of data rows.
    /// A table without columns produces no output at all.
    pub fn write_csv<W: Write>(&self, writer: W, delimiter: u8, list_format: &ListFormat) -> csv::Result<usize> {
        let mut wtr = WriterBuilder::new().delimiter(delimiter).from_writer(writer);
        let mut rows_written = 0;
        if !self.columns.is_empty() {
            wtr.write_record(&self.columns)?;
            for row in self.rows(list_format) {
                wtr.write_record(&row)?;
                rows_written += 1;
            }
        }
        wtr.flush()?;
        Ok(rows_written)
    }
}

pub fn render_cell(value: &Value, list_format: &ListFormat) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => match list_format {
            ListFormat::Json => value.to_string(),
            ListFormat::Joined(sep) => items
                .iter()
                .map(|item| render_cell(item, list_format))
                .collect::<Vec<_>>()
                .join(sep),
        },
        Value::Object(_) => value.to_string(),
    }
}
