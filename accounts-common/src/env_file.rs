//! `KEY=VALUE` environment file model.
//!
//! Comment and blank lines take no part in lookups but keep their position,
//! so rewriting a file only touches the keys that were set. Values are
//! trimmed and one pair of surrounding `"` or `'` quotes is dropped on read;
//! no escape sequences are interpreted.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvFileError {
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
    #[error("Value for {0} contains a line break")]
    LineBreak(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// `raw` holds the original text until the value is overwritten.
    Entry {
        key: String,
        value: String,
        raw: Option<String>,
    },
    /// Blank lines, `#` comments, and anything without an `=`.
    Verbatim(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    lines: Vec<Line>,
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// True if `value` can be written on a single line.
pub fn is_single_line(value: &str) -> bool {
    !value.contains(['\r', '\n'])
}

impl EnvFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(contents: &str) -> Self {
        let lines = contents
            .lines()
            .map(|raw| {
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return Line::Verbatim(raw.to_string());
                }
                match trimmed.split_once('=') {
                    Some((key, value)) if !key.trim().is_empty() => Line::Entry {
                        key: key.trim().to_string(),
                        value: unquote(value).to_string(),
                        raw: Some(raw.to_string()),
                    },
                    _ => Line::Verbatim(raw.to_string()),
                }
            })
            .collect();
        Self { lines }
    }

    /// Value of the last assignment to `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Overwrite every assignment to `key`, or append one if there is none.
    /// Keys and values that would span or split lines are refused.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), EnvFileError> {
        if key.is_empty()
            || key.contains('=')
            || key.starts_with('#')
            || key.chars().any(char::is_whitespace)
        {
            return Err(EnvFileError::InvalidKey(key.to_string()));
        }
        if !is_single_line(value) {
            return Err(EnvFileError::LineBreak(key.to_string()));
        }

        let mut found = false;
        for line in &mut self.lines {
            if let Line::Entry { key: k, value: v, raw } = line {
                if k == key {
                    *v = value.to_string();
                    *raw = None;
                    found = true;
                }
            }
        }
        if !found {
            self.lines.push(Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
                raw: None,
            });
        }
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, .. } => Some(key.as_str()),
            Line::Verbatim(_) => None,
        })
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { key, value, .. } => Some((key.clone(), value.clone())),
                Line::Verbatim(_) => None,
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { raw: Some(raw), .. } | Line::Verbatim(raw) => out.push_str(raw),
                Line::Entry { key, value, raw: None } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
            }
            out.push('\n');
        }
        out
    }
}
