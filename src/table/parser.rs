//! `2DA V2.0` text parser.
//!
//! ```text
//! 2DA V2.0
//! DEFAULT: ****
//!         Label       Name     Description
//! 0       Fighter     111      269
//! 1       "Arcane Archer" 112  ****
//! ```
//!
//! The first token of each data line is a row label and is ignored; rows are
//! addressed by position.

use super::{Cell, TableData};

const SIGNATURE: &str = "2DA V2.0";

/// Errors produced while parsing table text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("table '{table}' is empty")]
    Empty { table: String },

    #[error("table '{table}' has bad signature '{found}' (expected '{SIGNATURE}')")]
    BadSignature { table: String, found: String },

    #[error("table '{table}' has no column header")]
    MissingHeader { table: String },

    #[error("table '{table}' has an unterminated quote on line {line}")]
    UnterminatedQuote { table: String, line: usize },
}

pub(super) fn parse_2da(name: String, bytes: &[u8]) -> Result<TableData, ParseError> {
    let decoded = String::from_utf8_lossy(bytes);
    let text: &str = &decoded;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.lines().enumerate();

    let signature = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => break line.trim(),
            None => return Err(ParseError::Empty { table: name }),
        }
    };
    if !signature
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .eq_ignore_ascii_case(SIGNATURE)
    {
        return Err(ParseError::BadSignature {
            table: name,
            found: signature.to_string(),
        });
    }

    let mut default_value = None;
    let header = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => {
                let trimmed = line.trim();
                if let Some(rest) = strip_default_prefix(trimmed) {
                    default_value = Some(rest.trim().to_string());
                    continue;
                }
                break trimmed;
            }
            None => return Err(ParseError::MissingHeader { table: name }),
        }
    };

    let columns: Vec<String> = header.split_whitespace().map(str::to_string).collect();
    if columns.is_empty() {
        return Err(ParseError::MissingHeader { table: name });
    }

    let mut rows = Vec::new();
    for (line_no, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let tokens = tokenize(line).ok_or_else(|| ParseError::UnterminatedQuote {
            table: name.clone(),
            line: line_no + 1,
        })?;
        // First token is the row label.
        rows.push(tokens.iter().skip(1).map(|t| Cell::parse(t)).collect());
    }

    Ok(TableData::new(name, columns, rows).with_default_value(default_value))
}

fn strip_default_prefix(line: &str) -> Option<&str> {
    let prefix = "DEFAULT:";
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Split a line on whitespace, honoring double quotes. Returns `None` for an
/// unterminated quote. An empty quoted token becomes the empty string, which
/// [`Cell::parse`] treats as null.
fn tokenize(line: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut token = String::new();
        if c == '"' {
            chars.next(); // consume opening quote
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '"' {
                    closed = true;
                    break;
                }
                token.push(ch);
            }
            if !closed {
                return None;
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
        }
        tokens.push(token);
    }

    Some(tokens)
}
