//! Streaming reader for the tag-dump XML export format:
//!
//! ```text
//! <rows>
//!   <row><field name="Id">1</field><field name="Email">a@x.com</field></row>
//! </rows>
//! ```
//!
//! Anything outside `<row>` elements (declarations, wrappers) is ignored.

use crate::error::ScanError;

/// One `<row>` with its fields in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedRecord {
    pub fields: Vec<(String, String)>,
    /// The `<row>...</row>` source text
    pub raw: String,
}

impl TaggedRecord {
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.trim().is_empty())
    }
}

/// Iterator over `<row>` elements
pub struct XmlRowReader<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> XmlRowReader<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn line_at(&self, offset: usize) -> usize {
        self.input[..offset].matches('\n').count() + 1
    }

    /// Offset of the next `<row` open tag at or after `from`
    fn find_row_start(&self, from: usize) -> Option<usize> {
        let mut search = from;
        while let Some(rel) = self.input[search..].find("<row") {
            let at = search + rel;
            match self.input[at + 4..].chars().next() {
                Some('>') | Some('/') => return Some(at),
                Some(c) if c.is_whitespace() => return Some(at),
                _ => search = at + 4,
            }
        }
        None
    }
}

impl Iterator for XmlRowReader<'_> {
    type Item = Result<TaggedRecord, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.find_row_start(self.pos)?;
        let line = self.line_at(start);
        let Some(open_end) = self.input[start..].find('>').map(|i| start + i) else {
            self.pos = self.input.len();
            return Some(Err(ScanError::UnterminatedRow { line }));
        };

        // <row/>
        if self.input[..open_end].ends_with('/') {
            self.pos = open_end + 1;
            return Some(Ok(TaggedRecord {
                fields: Vec::new(),
                raw: self.input[start..=open_end].to_string(),
            }));
        }

        let Some(close) = self.input[open_end..].find("</row>").map(|i| open_end + i) else {
            self.pos = self.input.len();
            return Some(Err(ScanError::UnterminatedRow { line }));
        };
        let end = close + "</row>".len();
        self.pos = end;

        let inner = &self.input[open_end + 1..close];
        Some(parse_fields(inner, line).map(|fields| TaggedRecord {
            fields,
            raw: self.input[start..end].to_string(),
        }))
    }
}

fn parse_fields(inner: &str, line: usize) -> Result<Vec<(String, String)>, ScanError> {
    let malformed = || ScanError::MalformedField { line };
    let mut fields = Vec::new();
    let mut rest = inner;

    while let Some(at) = rest.find("<field") {
        rest = &rest[at + "<field".len()..];
        let tag_end = rest.find('>').ok_or_else(malformed)?;
        let attributes = &rest[..tag_end];
        let self_closing = attributes.ends_with('/');
        let name = attribute(attributes.trim_end_matches('/'), "name").ok_or_else(malformed)?;
        rest = &rest[tag_end + 1..];

        if self_closing {
            fields.push((name, String::new()));
            continue;
        }

        let close = rest.find("</field>").ok_or_else(malformed)?;
        fields.push((name, decode_text(&rest[..close])));
        rest = &rest[close + "</field>".len()..];
    }
    Ok(fields)
}

/// Value of `key="..."` or `key='...'` inside a tag
fn attribute(tag: &str, key: &str) -> Option<String> {
    let mut rest = tag;
    while let Some(at) = rest.find(key) {
        let preceded_ok = rest[..at]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace);
        let after = rest[at + key.len()..].trim_start();
        if preceded_ok {
            if let Some(value) = after.strip_prefix('=') {
                let value = value.trim_start();
                let quote = value.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let body = &value[1..];
                    let end = body.find(quote)?;
                    return Some(decode_entities(&body[..end]));
                }
                return None;
            }
        }
        rest = &rest[at + key.len()..];
    }
    None
}

/// Element text: CDATA sections verbatim, everything else entity-decoded
fn decode_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find("<![CDATA[") {
        out.push_str(&decode_entities(&rest[..at]));
        let body = &rest[at + "<![CDATA[".len()..];
        match body.find("]]>") {
            Some(end) => {
                out.push_str(&body[..end]);
                rest = &body[end + "]]>".len()..];
            }
            None => {
                out.push_str(body);
                rest = "";
            }
        }
    }
    out.push_str(&decode_entities(rest));
    out
}

/// Decode the predefined entities and numeric character references.
/// Unknown references are kept as written.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        let after = &rest[at..];
        let decoded = after.find(';').and_then(|semi| {
            let entity = &after[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16).ok())
                    .unwrap_or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &after[len..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Read all rows of `input`
pub fn scan_tagged(input: &str) -> Result<Vec<TaggedRecord>, ScanError> {
    XmlRowReader::new(input).collect()
}

#[cfg(test)]
#[path = "xml_test.rs"]
mod tests;
