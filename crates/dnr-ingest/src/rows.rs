//! Row mapping: scanned records to schema-less raw rows.
//!
//! Every data row becomes a map of column name to string value. No typing
//! happens here; the entity transformer owns coercion.

use crate::csv::scan_delimited;
use crate::error::ScanError;
use crate::xml::scan_tagged;
use dnr_core::{compute_checksum, SourceFormat};
use std::collections::HashSet;

/// One data row ready for `raw.record`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based position among non-blank data records
    pub row_number: i64,
    /// SHA-256 of the raw record text
    pub record_hash: String,
    /// Column name to value, in column order
    pub fields: Vec<(String, String)>,
}

impl RawRow {
    /// Payload as a JSON object
    pub fn payload_json(&self) -> String {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(map).to_string()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }
}

/// A parsed export file
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    /// Column names; empty when the file has no header
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl ParsedFile {
    pub fn has_header(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Decode file bytes to text.
///
/// A UTF-8 byte order mark is removed. Content that is not valid UTF-8 is
/// read as Latin-1; the second value reports that fallback.
pub fn decode_content(bytes: &[u8]) -> (String, bool) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), false),
        Err(_) => (bytes.iter().map(|&b| b as char).collect(), true),
    }
}

/// Parse an export in the given format
pub fn parse_export(
    format: SourceFormat,
    text: &str,
    delimiter: char,
    header_row: usize,
) -> Result<ParsedFile, ScanError> {
    match format {
        SourceFormat::Csv => parse_delimited(text, delimiter, header_row),
        SourceFormat::Xml => parse_tagged(text),
    }
}

/// Parse delimited text whose header is the `header_row`-th non-blank record
pub fn parse_delimited(
    text: &str,
    delimiter: char,
    header_row: usize,
) -> Result<ParsedFile, ScanError> {
    let records: Vec<_> = scan_delimited(text, delimiter)?
        .into_iter()
        .filter(|r| !r.is_blank())
        .collect();
    let Some(header) = records.get(header_row) else {
        return Ok(ParsedFile::default());
    };
    let data = &records[header_row + 1..];

    let mut width = data
        .iter()
        .map(|r| r.fields.len())
        .chain(std::iter::once(header.fields.len()))
        .max()
        .unwrap_or(0);
    let blank_at = |fields: &[String], i: usize| fields.get(i).is_none_or(|v| v.trim().is_empty());
    while width > 0
        && blank_at(&header.fields, width - 1)
        && data.iter().all(|r| blank_at(&r.fields, width - 1))
    {
        width -= 1;
    }

    let columns = column_names((0..width).map(|i| header.fields.get(i).map(String::as_str)));
    let rows = data
        .iter()
        .enumerate()
        .map(|(idx, record)| RawRow {
            row_number: idx as i64 + 1,
            record_hash: compute_checksum(&record.raw),
            fields: columns
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), record.fields.get(i).cloned().unwrap_or_default()))
                .collect(),
        })
        .collect();

    Ok(ParsedFile { columns, rows })
}

/// Parse a tag-dump XML export. Columns are the union of field names in
/// first-seen order; each payload holds the fields present in its row.
pub fn parse_tagged(text: &str) -> Result<ParsedFile, ScanError> {
    let mut columns: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for record in scan_tagged(text)? {
        if record.is_blank() {
            continue;
        }
        let mut fields: Vec<(String, String)> = Vec::with_capacity(record.fields.len());
        for (name, value) in record.fields {
            let name = name.trim().to_string();
            if seen.insert(name.clone()) {
                columns.push(name.clone());
            }
            match fields.iter_mut().find(|(k, _)| *k == name) {
                Some(existing) => existing.1 = value,
                None => fields.push((name, value)),
            }
        }
        rows.push(RawRow {
            row_number: rows.len() as i64 + 1,
            record_hash: compute_checksum(&record.raw),
            fields,
        });
    }

    Ok(ParsedFile { columns, rows })
}

/// Header cells to unique column names; blank cells become `column_<n>`
fn column_names<'a>(cells: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (i, cell) in cells.enumerate() {
        let base = match cell.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("column_{}", i + 1),
        };
        let mut name = base.clone();
        let mut n = 2;
        while names.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        names.push(name);
    }
    names
}

#[cfg(test)]
#[path = "rows_test.rs"]
mod tests;
