//! Structured node and compact token helpers shared by the event encoders

use crate::error::DecodeError;
use std::fmt::Write;
use std::str::FromStr;

/// Delimiter terminating every field in the compact text encoding.
pub const TOKEN_DELIMITER: char = '|';

/// A tag with an ordered attribute list - one element of the log document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
}

impl Node {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set an attribute, replacing any previous value in place.
    pub fn set(&mut self, name: &str, value: impl ToString) -> &mut Self {
        let value = value.to_string();
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, name: &str) -> Result<&str, DecodeError> {
        self.get(name).ok_or_else(|| DecodeError::MissingAttribute {
            tag: self.tag.clone(),
            attr: name.to_string(),
        })
    }

    pub fn require_parse<T: FromStr>(&self, name: &str) -> Result<T, DecodeError> {
        let raw = self.require(name)?;
        raw.trim().parse().map_err(|_| DecodeError::InvalidValue {
            attr: name.to_string(),
            value: raw.to_string(),
        })
    }

    pub fn expect_tag(&self, expected: &str) -> Result<(), DecodeError> {
        if self.tag == expected {
            Ok(())
        } else {
            Err(DecodeError::UnexpectedTag {
                expected: expected.to_string(),
                found: self.tag.clone(),
            })
        }
    }
}

/// Appends one field followed by the delimiter.
pub(crate) fn write_token(out: &mut String, value: impl std::fmt::Display) {
    // Writing into a String cannot fail
    let _ = write!(out, "{}{}", value, TOKEN_DELIMITER);
}

/// Reads `|`-terminated fields in order.
///
/// The stream is not self-describing: the caller must know which event kind
/// starts at the current position.
pub struct TokenReader<'a> {
    tokens: std::str::Split<'a, char>,
}

impl<'a> TokenReader<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            tokens: input.split(TOKEN_DELIMITER),
        }
    }

    pub fn next_str(&mut self, field: &'static str) -> Result<&'a str, DecodeError> {
        self.tokens.next().ok_or(DecodeError::UnexpectedEnd(field))
    }

    pub fn next_parse<T: FromStr>(&mut self, field: &'static str) -> Result<T, DecodeError> {
        let token = self.next_str(field)?;
        token.trim().parse().map_err(|_| DecodeError::InvalidToken {
            field,
            token: token.to_string(),
        })
    }

    /// True when only the empty remainder after the final delimiter is left.
    pub fn is_exhausted(&self) -> bool {
        let mut rest = self.tokens.clone();
        matches!((rest.next(), rest.next()), (None, _) | (Some(""), None))
    }
}
