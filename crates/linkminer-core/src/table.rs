//! Flat record table persisted as CSV.
//!
//! Columns are the enrichment's own declared headers; the first CSV column
//! is an implicit row index with an empty header cell. The on-disk format
//! must re-read as the same schema it was written with.

use std::path::Path;

use crate::CoreError;

/// A tabular collection of extracted records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RecordTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating to the header width.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Index of a named column.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialize with an implicit leading row-index column.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push(',');
        out.push_str(
            &self
                .headers
                .iter()
                .map(|h| csv_escape(h))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
        for (i, row) in self.rows.iter().enumerate() {
            out.push_str(&i.to_string());
            for field in row {
                out.push(',');
                out.push_str(&csv_escape(field));
            }
            out.push('\n');
        }
        out
    }

    /// Parse a table written by [`to_csv`]. The leading index column is
    /// dropped.
    pub fn from_csv(text: &str) -> Result<Self, CoreError> {
        let mut records = parse_csv(text).into_iter();
        let header_record = records
            .next()
            .ok_or_else(|| CoreError::Table("missing header row".into()))?;
        if header_record.is_empty() {
            return Err(CoreError::Table("empty header row".into()));
        }
        let headers: Vec<String> = header_record.into_iter().skip(1).collect();

        let mut table = Self::new(headers);
        for record in records {
            if record.is_empty() {
                continue;
            }
            table.push_row(record.into_iter().skip(1).collect());
        }
        Ok(table)
    }

    pub fn write(&self, path: &Path) -> Result<(), CoreError> {
        std::fs::write(path, self.to_csv())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_csv(&text)
    }
}

/// Quote a field when it contains a quote, comma, or line break; embedded
/// quotes are doubled.
fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Minimal CSV reader matching [`csv_escape`]'s output: quoted fields may
/// contain commas, doubled quotes, and line breaks.
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}
