//! Query loading.
//!
//! Reads SQL text from an inline argument, a file, or stdin and splits it into
//! individual statements on top-level semicolons.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Result, SqlPipeError};

/// Where SQL text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlSource {
    /// SQL passed directly on the command line.
    Inline(String),
    /// SQL read from a file.
    File(PathBuf),
    /// SQL read from standard input.
    Stdin,
}

impl SqlSource {
    /// Reads the raw SQL text from this source.
    pub fn read(&self) -> Result<String> {
        match self {
            Self::Inline(text) => Ok(text.clone()),
            Self::File(path) => read_file(path),
            Self::Stdin => read_all(std::io::stdin().lock()),
        }
    }

    /// Reads and splits the statements from this source.
    pub fn load(&self) -> Result<Vec<String>> {
        let statements = load_from_str(&self.read()?);
        if statements.is_empty() {
            return Err(SqlPipeError::query("No SQL input provided."));
        }
        Ok(statements)
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        SqlPipeError::config(format!("Failed to read SQL file {}: {e}", path.display()))
    })
}

fn read_all(mut reader: impl Read) -> Result<String> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| SqlPipeError::internal(format!("Failed to read SQL input: {e}")))?;
    Ok(text)
}

/// Reads statements from a file.
pub fn load_from_file(path: &Path) -> Result<Vec<String>> {
    Ok(load_from_str(&read_file(path)?))
}

/// Reads statements from any reader.
pub fn load_from_reader(reader: impl Read) -> Result<Vec<String>> {
    Ok(load_from_str(&read_all(reader)?))
}

/// Splits SQL text into trimmed, non-empty statements.
///
/// Semicolons inside string literals, quoted identifiers, dollar-quoted bodies
/// and comments do not end a statement. The terminating semicolon is dropped,
/// as are fragments holding nothing but comments.
pub fn load_from_str(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut i = 0;
    // The current fragment has something besides whitespace and comments
    let mut code = false;
    let bytes = text.as_bytes();

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                i = skip_quoted(bytes, i, b'\'', is_escape_string(bytes, i));
                code = true;
            }
            b'"' => {
                i = skip_quoted(bytes, i, b'"', false);
                code = true;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = text[i..].find('\n').map(|n| i + n + 1).unwrap_or(bytes.len());
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'$' => {
                code = true;
                match dollar_tag(&text[i..]) {
                    Some(tag) => {
                        let body = i + tag.len();
                        i = text[body..]
                            .find(tag)
                            .map(|n| body + n + tag.len())
                            .unwrap_or(bytes.len());
                    }
                    None => i += 1,
                }
            }
            b';' => {
                if code {
                    statements.push(text[start..i].trim().to_string());
                }
                i += 1;
                start = i;
                code = false;
            }
            other => {
                code |= !other.is_ascii_whitespace();
                i += 1;
            }
        }
    }
    if code {
        statements.push(text[start..].trim().to_string());
    }

    statements
}

/// `E'…'` strings treat backslash as an escape character.
fn is_escape_string(bytes: &[u8], quote: usize) -> bool {
    let Some(prefix) = quote.checked_sub(1).map(|p| bytes[p]) else {
        return false;
    };
    let standalone = quote < 2 || {
        let before = bytes[quote - 2];
        !(before.is_ascii_alphanumeric() || before == b'_' || before == b'$')
    };
    matches!(prefix, b'E' | b'e') && standalone
}

/// Returns the index just past the closing quote. Doubled quotes are escapes,
/// and so are backslashes when `backslash_escapes` is set.
fn skip_quoted(bytes: &[u8], open: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        if backslash_escapes && bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Returns the index just past a (possibly nested) block comment.
fn skip_block_comment(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i + 1 < bytes.len() {
        if bytes[i] == b'/' && bytes[i + 1] == b'*' {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return i;
            }
        } else {
            i += 1;
        }
    }
    bytes.len()
}

/// Recognises a dollar-quote opener such as `$$` or `$body$` at the start of `s`.
fn dollar_tag(s: &str) -> Option<&str> {
    let rest = &s[1..];
    let end = rest.find('$')?;
    let tag = &rest[..end];
    let valid = tag
        .chars()
        .enumerate()
        .all(|(n, c)| c == '_' || c.is_ascii_alphabetic() || (n > 0 && c.is_ascii_digit()));
    valid.then(|| &s[..end + 2])
}
