//! Distinguished names identifying directory records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use dirsync_core::error::Error as CoreError;

/// Errors that can occur when parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// A component was empty or lacked an `=` separator.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component had nothing to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidDn(err.to_string())
    }
}

/// Distinguished name of a directory record.
///
/// Components are kept in their escaped wire form; the canonical string joins the components,
/// minus unescaped surrounding whitespace, with `,`. The empty string names the root DSE. A
/// record's DN never changes once the record exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName {
    raw: String,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if a component is not of the form `attribute=value`
    /// or the input ends inside an escape sequence.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let input = input.as_ref();
        if input.trim().is_empty() {
            return Ok(Self { raw: String::new() });
        }

        let components = split_unescaped(input, ',')?;
        for component in &components {
            for part in split_unescaped(component, '+')? {
                validate_attribute_value(&part)?;
            }
        }

        Ok(Self {
            raw: components.join(","),
        })
    }

    /// Borrows the canonical distinguished name string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

/// Splits on `delimiter` outside escape sequences, keeping escapes intact and trimming only
/// whitespace that is not escaped.
fn split_unescaped(
    input: &str,
    delimiter: char,
) -> std::result::Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    // Byte length of `current` ending at the last escaped character.
    let mut protected = 0;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let escaped = chars
                .next()
                .ok_or(DistinguishedNameError::UnterminatedEscape)?;
            current.push(ch);
            current.push(escaped);
            protected = current.len();
        } else if ch == delimiter {
            parts.push(trim_unescaped(&current, protected));
            current.clear();
            protected = 0;
        } else {
            current.push(ch);
        }
    }
    parts.push(trim_unescaped(&current, protected));

    if parts.iter().any(String::is_empty) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn trim_unescaped(part: &str, protected: usize) -> String {
    let end = part.trim_end().len().max(protected);
    part[..end].trim_start().to_string()
}

fn validate_attribute_value(part: &str) -> std::result::Result<(), DistinguishedNameError> {
    // Escaped characters never appear in attribute names, so the first `=` is the separator.
    let (attribute, _) = part
        .split_once('=')
        .ok_or_else(|| DistinguishedNameError::InvalidComponent(part.to_string()))?;
    if attribute.trim().is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(part.to_string()));
    }
    Ok(())
}
