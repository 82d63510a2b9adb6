//! Parsed token value object
//!
//! A [`ParsedToken`] is the immutable result of assembling one token block
//! from the lexer stream. It embeds the separator configuration it was parsed
//! under so the derived views (`full`, `keypathless`, `store_key`) remain
//! stable regardless of later configuration changes.

use crate::config::Config;
use crate::domain::TokenPrefix;
use crate::errors::{ConfigManagerError, Result};
use serde::de::DeserializeOwned;
use std::fmt;

/// A single parsed configuration token
///
/// Shape in source text:
///
/// ```text
/// AWSSECRETS:///bar/foo|key1.key2[version=123]
/// ^ prefix   ^ sanitized path     ^ metadata
///            |        ^ key path
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    prefix: TokenPrefix,
    sanitized_path: String,
    key_path: String,
    metadata: String,
    token_separator: String,
    key_separator: char,
}

impl ParsedToken {
    /// Create an empty token for a prefix under the given configuration
    ///
    /// Fails with a config validation error when the configured key separator
    /// is not exactly one character.
    pub fn new(prefix: TokenPrefix, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new_unchecked(prefix, config))
    }

    /// Construct from an already-validated configuration
    pub(crate) fn new_unchecked(prefix: TokenPrefix, config: &Config) -> Self {
        Self {
            prefix,
            sanitized_path: String::new(),
            key_path: String::new(),
            metadata: String::new(),
            token_separator: config.token_separator().to_string(),
            key_separator: config.key_separator_char(),
        }
    }

    pub(crate) fn set_sanitized_path<S: Into<String>>(&mut self, path: S) {
        self.sanitized_path = path.into();
    }

    pub(crate) fn set_key_path<S: Into<String>>(&mut self, key_path: S) {
        self.key_path = key_path.into();
    }

    pub(crate) fn set_metadata<S: Into<String>>(&mut self, metadata: S) {
        self.metadata = metadata.into();
    }

    pub fn prefix(&self) -> TokenPrefix {
        self.prefix
    }

    /// The backend-visible identifier: no prefix, separator, key lookup, or
    /// metadata.
    pub fn store_key(&self) -> &str {
        &self.sanitized_path
    }

    /// Optional JSON path applied to the retrieved value; empty when absent
    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    /// Raw `k=v,...` string between the metadata brackets; empty when absent
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// Prefix + token separator + sanitized path
    ///
    /// Used as the normalization key when the token carries no metadata: two
    /// tokens differing only in key path share one backend call.
    pub fn keypathless(&self) -> String {
        format!("{}{}{}", self.prefix, self.token_separator, self.sanitized_path)
    }

    /// Everything except the metadata block
    pub fn metadataless(&self) -> String {
        let mut token = self.keypathless();
        if !self.key_path.is_empty() {
            token.push(self.key_separator);
            token.push_str(&self.key_path);
        }
        token
    }

    /// The full token spelling as it appeared in the input
    pub fn full(&self) -> String {
        let mut token = self.metadataless();
        if !self.metadata.is_empty() {
            token.push('[');
            token.push_str(&self.metadata);
            token.push(']');
        }
        token
    }

    /// Decode the `k=v,...` metadata string into a typed view
    ///
    /// Unknown keys are ignored; an empty metadata string produces the
    /// deserialized default of `T`. Pairs without a `=` are skipped.
    pub fn parse_metadata<T: DeserializeOwned>(&self) -> Result<T> {
        let mut object = serde_json::Map::new();
        for pair in self.metadata.split(',') {
            if let Some((key, value)) = pair.split_once('=') {
                object.insert(key.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(ConfigManagerError::from)
    }
}

impl fmt::Display for ParsedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full())
    }
}
