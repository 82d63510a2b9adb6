//! Token normalization
//!
//! Collapses the raw discovered tokens into the minimum set of backend calls.
//! Tokens sharing a prefix and sanitized path (and carrying no metadata)
//! group under their `keypathless()` view; a token with metadata selects a
//! distinct backend artifact (a version, a label) and must keep its own group
//! keyed by the full spelling.
//!
//! Groups are built single-threaded and then handed one-per-task to the
//! retrieval coordinator, which writes each group's response as its sole
//! owner. Nothing here needs a lock.

use crate::domain::{ParsedToken, TokenPrefix};
use crate::errors::ConfigManagerError;
use std::collections::{BTreeSet, HashMap};

/// Ordered map of full token spellings to their parsed tokens
///
/// Insertion-ordered per first appearance; a duplicate spelling always parses
/// identically, so later occurrences are dropped.
#[derive(Debug, Default)]
pub struct RawTokens {
    order: Vec<String>,
    map: HashMap<String, ParsedToken>,
}

impl RawTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: ParsedToken) {
        let key = token.full();
        if !self.map.contains_key(&key) {
            self.order.push(key.clone());
            self.map.insert(key, token);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParsedToken> {
        self.order.iter().filter_map(|key| self.map.get(key))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Outcome of the single backend call made for a token group
#[derive(Debug)]
pub struct TokenResponse {
    key: ParsedToken,
    value: String,
    error: Option<ConfigManagerError>,
}

impl TokenResponse {
    pub fn ok(key: ParsedToken, value: String) -> Self {
        Self { key, value, error: None }
    }

    pub fn err(key: ParsedToken, error: ConfigManagerError) -> Self {
        Self { key, value: String::new(), error: Some(error) }
    }

    /// The token the call was made for (the group's first member)
    pub fn key(&self) -> &ParsedToken {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn error(&self) -> Option<&ConfigManagerError> {
        self.error.as_ref()
    }

    /// Remove and return the recorded error
    pub fn take_error(&mut self) -> Option<ConfigManagerError> {
        self.error.take()
    }
}

/// All tokens sharing one backend call, plus that call's response
#[derive(Debug)]
pub struct TokenGroup {
    key: String,
    tokens: Vec<ParsedToken>,
    response: Option<TokenResponse>,
}

impl TokenGroup {
    fn new(key: String, token: ParsedToken) -> Self {
        Self { key, tokens: vec![token], response: None }
    }

    /// The normalization key: `full()` with metadata, `keypathless()` without
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tokens(&self) -> &[ParsedToken] {
        &self.tokens
    }

    /// The representative token the backend call is made with
    pub fn representative(&self) -> Option<&ParsedToken> {
        self.tokens.first()
    }

    pub fn response(&self) -> Option<&TokenResponse> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut TokenResponse> {
        self.response.as_mut()
    }

    pub fn set_response(&mut self, response: TokenResponse) {
        self.response = Some(response);
    }
}

/// The normalized token map: group per backend call, in discovery order
#[derive(Debug, Default)]
pub struct NormalizedTokens {
    groups: Vec<TokenGroup>,
    index: HashMap<String, usize>,
    prefixes: BTreeSet<TokenPrefix>,
}

impl NormalizedTokens {
    /// Group the raw tokens into the minimum set of backend calls
    pub fn from_raw(raw: RawTokens) -> Self {
        let mut normalized = Self::default();
        for token in raw.iter() {
            normalized.insert(token.clone());
        }
        normalized
    }

    fn insert(&mut self, token: ParsedToken) {
        let key = if token.metadata().is_empty() { token.keypathless() } else { token.full() };
        self.prefixes.insert(token.prefix());
        match self.index.get(&key) {
            Some(&at) => self.groups[at].tokens.push(token),
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push(TokenGroup::new(key, token));
            }
        }
    }

    /// Distinct prefixes seen across all groups; drives plugin initialisation
    pub fn prefixes(&self) -> &BTreeSet<TokenPrefix> {
        &self.prefixes
    }

    pub fn groups(&self) -> &[TokenGroup] {
        &self.groups
    }

    pub(crate) fn into_groups(self) -> Vec<TokenGroup> {
        self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
