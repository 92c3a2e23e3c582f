//! Delimited tabular files, plain or gzip-compressed
//!
//! Artifacts carry a variable set of columns (`run_{i}_*`, `pos_{i}_*`), so
//! tables are kept as string cells addressed by header name.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use super::DatasetError;

/// Header plus string cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    records: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Self {
            headers,
            index,
            records: Vec::new(),
        }
    }

    /// Append a record; short records are padded with empty cells
    pub fn push(&mut self, mut cells: Vec<String>) {
        cells.resize(self.headers.len(), String::new());
        self.records.push(cells);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn rows(&self) -> impl Iterator<Item = TableRow<'_>> {
        self.records.iter().enumerate().map(move |(number, cells)| TableRow {
            table: self,
            number,
            cells,
        })
    }
}

/// Borrowed view of one record with typed accessors
pub struct TableRow<'a> {
    table: &'a Table,
    number: usize,
    cells: &'a [String],
}

impl<'a> TableRow<'a> {
    pub fn get(&self, column: &str) -> Result<&'a str, DatasetError> {
        self.get_opt(column)
            .ok_or_else(|| DatasetError::MissingColumn(column.to_string()))
    }

    pub fn get_opt(&self, column: &str) -> Option<&'a str> {
        let cells: &'a [String] = self.cells;
        self.table
            .index
            .get(column)
            .and_then(|&i| cells.get(i))
            .map(String::as_str)
    }

    pub fn parse<T>(&self, column: &str) -> Result<T, DatasetError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.get(column)?;
        raw.trim()
            .parse::<T>()
            .map_err(|e| self.invalid(format!("column {}: '{}': {}", column, raw, e)))
    }

    /// Integer cell that may have been written as a float (`"2.0"`)
    pub fn parse_index(&self, column: &str) -> Result<i64, DatasetError> {
        let raw = self.get(column)?.trim();
        if let Ok(v) = raw.parse::<i64>() {
            return Ok(v);
        }
        match raw.parse::<f64>() {
            Ok(v) if v.fract() == 0.0 => Ok(v as i64),
            _ => Err(self.invalid(format!("column {}: '{}' is not an integer", column, raw))),
        }
    }

    pub fn parse_bool(&self, column: &str) -> Result<bool, DatasetError> {
        match self.get(column)?.trim() {
            "true" | "True" | "TRUE" | "1" => Ok(true),
            "false" | "False" | "FALSE" | "0" => Ok(false),
            other => Err(self.invalid(format!("column {}: '{}' is not a boolean", column, other))),
        }
    }

    /// List of strings stored as a JSON array or a Python list literal
    pub fn string_list(&self, column: &str) -> Result<Vec<String>, DatasetError> {
        let raw = self.get(column)?;
        parse_string_list(raw)
            .ok_or_else(|| self.invalid(format!("column {}: cannot read list '{}'", column, raw)))
    }

    pub fn invalid(&self, reason: String) -> DatasetError {
        DatasetError::InvalidRow {
            row: self.number,
            reason,
        }
    }
}

fn quoted_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)""#).unwrap())
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Parse `["a", "b"]` or `['a', "b's"]`
pub fn parse_string_list(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
        return Some(list);
    }
    let inner = trimmed.strip_prefix('[')?.strip_suffix(']')?;
    let items = quoted_literal()
        .captures_iter(inner)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| unescape(m.as_str()))
        .collect::<Vec<_>>();
    if items.is_empty() && !inner.trim().is_empty() {
        return None;
    }
    Some(items)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

/// Read a CSV table; `.gz` files are decompressed transparently
pub fn read_table(path: impl AsRef<Path>) -> Result<Table, DatasetError> {
    let path = path.as_ref();
    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = csv_reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let mut table = Table::new(headers);
    for record in csv_reader.records() {
        table.push(record?.iter().map(str::to_string).collect());
    }
    Ok(table)
}

/// Write a CSV table; `.gz` paths are gzip-compressed
pub fn write_table(path: impl AsRef<Path>, table: &Table) -> Result<(), DatasetError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut csv_writer = csv::Writer::from_writer(Vec::new());
    csv_writer.write_record(&table.headers)?;
    for record in &table.records {
        csv_writer.write_record(record)?;
    }
    let bytes = csv_writer
        .into_inner()
        .map_err(|e| DatasetError::Io(e.into_error()))?;

    let file = File::create(path)?;
    if is_gzip(path) {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&bytes)?;
        encoder.finish()?;
    } else {
        let mut file = file;
        file.write_all(&bytes)?;
    }
    Ok(())
}
