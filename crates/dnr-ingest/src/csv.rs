//! Delimited text scanner.
//!
//! A quoted field may contain the delimiter, line breaks and doubled quotes
//! (`""` is one literal quote). Records end at `\n`, `\r\n` or a lone `\r`
//! outside quotes. Each record keeps its exact source text for auditing.

use crate::error::ScanError;

/// One logical record with its source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedRecord {
    pub fields: Vec<String>,
    /// Record text without its terminator
    pub raw: String,
}

impl DelimitedRecord {
    /// Every field is empty or whitespace
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    /// Saw a quote inside a quoted field: either an escape or the close
    QuoteInQuoted,
}

/// Iterator over the records of delimited text
pub struct CsvScanner<'a> {
    input: &'a str,
    delimiter: char,
    pos: usize,
}

impl<'a> CsvScanner<'a> {
    pub fn new(input: &'a str, delimiter: char) -> Self {
        Self {
            input,
            delimiter,
            pos: 0,
        }
    }

    fn line_at(&self, offset: usize) -> usize {
        self.input[..offset].matches('\n').count() + 1
    }
}

impl Iterator for CsvScanner<'_> {
    type Item = Result<DelimitedRecord, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.input.len() {
            return None;
        }

        let start = self.pos;
        let rest = &self.input[start..];
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut state = State::FieldStart;
        // (raw end, next record start), both relative to `start`
        let mut terminator = None;

        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            let line_end = match c {
                '\n' => Some(i + 1),
                '\r' if chars.peek().map(|&(_, n)| n) == Some('\n') => Some(i + 2),
                '\r' => Some(i + 1),
                _ => None,
            };

            match state {
                State::Quoted => {
                    if c == '"' {
                        state = State::QuoteInQuoted;
                    } else {
                        field.push(c);
                    }
                }
                State::QuoteInQuoted if c == '"' => {
                    field.push('"');
                    state = State::Quoted;
                }
                State::FieldStart if c == '"' => state = State::Quoted,
                _ if c == self.delimiter => {
                    fields.push(std::mem::take(&mut field));
                    state = State::FieldStart;
                }
                _ if line_end.is_some() => {
                    terminator = line_end.map(|next| (i, next));
                    break;
                }
                // Text after a closing quote is kept verbatim
                _ => {
                    field.push(c);
                    state = State::Unquoted;
                }
            }
        }

        if terminator.is_none() && state == State::Quoted {
            self.pos = self.input.len();
            return Some(Err(ScanError::UnterminatedQuote {
                line: self.line_at(start),
            }));
        }

        fields.push(field);
        let (raw_end, next) = terminator.unwrap_or((rest.len(), rest.len()));
        self.pos = start + next;
        Some(Ok(DelimitedRecord {
            fields,
            raw: rest[..raw_end].to_string(),
        }))
    }
}

/// Scan all records of `input`
pub fn scan_delimited(input: &str, delimiter: char) -> Result<Vec<DelimitedRecord>, ScanError> {
    CsvScanner::new(input, delimiter).collect()
}

#[cfg(test)]
#[path = "csv_test.rs"]
mod tests;
