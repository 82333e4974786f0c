//! Elastix-style solver parameter files.
//!
//! ```text
//! // B-spline settings
//! (FinalGridSpacingInPhysicalUnits 10.0 10.0 10.0)
//! (Metric "AdvancedMattesMutualInformation")
//! ```
//!
//! Each entry is a parenthesised key followed by one or more values. String
//! values are quoted. `//` starts a comment.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// Parsed parameter file. Keys are kept in sorted order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut map = Self::new();
        for (line_no, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let inner = line
                .strip_prefix('(')
                .and_then(|rest| rest.strip_suffix(')'))
                .with_context(|| format!("Line {}: expected `(Key value ...)`, got `{}`", line_no + 1, line))?;

            let mut tokens = tokenize(inner).with_context(|| format!("Line {}", line_no + 1))?.into_iter();
            let key = match tokens.next() {
                Some(key) => key,
                None => bail!("Line {}: empty parameter entry", line_no + 1),
            };
            let values: Vec<String> = tokens.collect();
            if values.is_empty() {
                bail!("Line {}: parameter `{}` has no value", line_no + 1, key);
            }
            map.entries.insert(key, values);
        }
        Ok(map)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read parameter file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Malformed parameter file {}", path.display()))
    }

    pub fn set<K: Into<String>>(&mut self, key: K, values: Vec<String>) {
        self.entries.insert(key.into(), values);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// First value of `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// First value of `key` parsed as `T`, `None` when the key is absent.
    pub fn get<T: FromStr>(&self, key: &str) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        match self.get_str(key) {
            None => Ok(None),
            Some(value) => value
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("Parameter `{}`: cannot parse `{}`: {}", key, value, e)),
        }
    }

    /// All values of `key` parsed as `T`.
    pub fn get_all<T: FromStr>(&self, key: &str) -> Result<Option<Vec<T>>>
    where
        T::Err: std::fmt::Display,
    {
        match self.values(key) {
            None => Ok(None),
            Some(values) => values
                .iter()
                .map(|value| {
                    value
                        .parse::<T>()
                        .map_err(|e| anyhow::anyhow!("Parameter `{}`: cannot parse `{}`: {}", key, value, e))
                })
                .collect::<Result<Vec<T>>>()
                .map(Some),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn strip_comment(line: &str) -> &str {
    // `//` inside a quoted value is not a comment
    let mut in_quotes = false;
    let bytes = line.as_bytes();
    for i in 0..bytes.len() {
        match bytes[i] {
            b'"' => in_quotes = !in_quotes,
            b'/' if !in_quotes && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
    }
    line
}

fn tokenize(inner: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = inner.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => token.push(ch),
                    None => bail!("unterminated string value"),
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Ok(tokens)
}
