//! # Token Generator
//!
//! The retrieval coordinator at the heart of the pipeline: discovers tokens
//! in the input via the lexer/parser, normalizes them into the minimum set of
//! backend calls, fans those calls out across the plugin host (one task per
//! normalized group), and fans the results back into a map of original token
//! spelling to final value.
//!
//! The [`Generator`] trait is the seam the facade composes against; tests and
//! embedders can substitute their own implementation with
//! [`crate::ConfigManager::with_generator`].

pub mod lookup;
pub mod normalize;
pub mod replace;

pub use normalize::{NormalizedTokens, RawTokens, TokenGroup, TokenResponse};

use crate::config::Config;
use crate::errors::{ConfigManagerError, Result};
use crate::parser::Parser;
use crate::plugin::PluginHost;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Map of original token spelling to its final substituted value
pub type ReplacedTokens = HashMap<String, String>;

/// The coordinator contract: resolve every token found in `tokens` to a value
///
/// Implementations must key results by the full token spelling so callers see
/// deterministic output regardless of retrieval order.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate the replaced-token map for the given token strings
    async fn generate(&self, tokens: &[String]) -> Result<ReplacedTokens>;

    /// Release any resources held across calls
    async fn close(&self) {}
}

/// Production [`Generator`] backed by the plugin host
pub struct PluginGenerator {
    config: Config,
    cancel: CancellationToken,
    host: Option<Arc<PluginHost>>,
}

impl PluginGenerator {
    /// Create a generator with the given configuration and cancellation handle
    ///
    /// Each `generate` call owns a fresh plugin host that is shut down before
    /// returning; use [`PluginGenerator::with_plugin_host`] to share one
    /// across calls or to pre-register in-process stores.
    pub fn new(config: Config, cancel: CancellationToken) -> Self {
        Self { config, cancel, host: None }
    }

    /// Use a caller-managed plugin host instead of a per-call one
    ///
    /// The caller keeps responsibility for shutting the host down.
    pub fn with_plugin_host(mut self, host: Arc<PluginHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the lexer and parser over `text` and normalize the discovered
    /// tokens into backend-call groups
    pub fn discover_tokens(&self, text: &str) -> Result<NormalizedTokens> {
        let parser = Parser::new(text, &self.config)?;
        let (blocks, errors) = parser.parse();
        if !errors.is_empty() {
            return Err(ConfigManagerError::TokenDiscovery { errors });
        }
        let mut raw = RawTokens::new();
        for block in blocks {
            raw.insert(block.token);
        }
        Ok(NormalizedTokens::from_raw(raw))
    }

    /// One task per normalized group; each group is owned by exactly one task
    /// so responses are written without contention.
    async fn fan_out(
        &self,
        normalized: NormalizedTokens,
        host: Arc<PluginHost>,
    ) -> Result<ReplacedTokens> {
        let mut tasks: JoinSet<TokenGroup> = JoinSet::new();

        for mut group in normalized.into_groups() {
            let host = host.clone();
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let Some(token) = group.representative().cloned() else {
                    return group;
                };
                let response = match host.get(token.prefix()) {
                    Err(err) => TokenResponse::err(token, err),
                    Ok(store) => {
                        match store
                            .value(token.store_key(), token.metadata().as_bytes(), &cancel)
                            .await
                        {
                            Ok(value) if value.is_empty() => {
                                let err = ConfigManagerError::empty_response(token.full());
                                TokenResponse::err(token, err)
                            }
                            Ok(value) => TokenResponse::ok(token, value),
                            Err(err) => TokenResponse::err(token, err),
                        }
                    }
                };
                group.set_response(response);
                group
            });
        }

        let mut groups = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(group) => groups.push(group),
                Err(err) => warn!(error = %err, "token retrieval task failed to join"),
            }
        }

        // partial results are discarded; they stay on their groups unmerged
        if self.cancel.is_cancelled() {
            return Err(ConfigManagerError::Cancelled);
        }

        // recorded errors are normally skipped at merge; fatal kinds surface
        for group in &mut groups {
            if let Some(response) = group.response_mut() {
                if response.error().is_some_and(ConfigManagerError::is_fatal) {
                    if let Some(err) = response.take_error() {
                        return Err(err);
                    }
                }
            }
        }

        Ok(Self::merge_groups(groups))
    }

    /// Fan the single response of each group out to all its member tokens
    fn merge_groups(groups: Vec<TokenGroup>) -> ReplacedTokens {
        let mut replaced = ReplacedTokens::new();
        for group in &groups {
            let Some(response) = group.response() else {
                continue;
            };
            match response.error() {
                // an empty backend value still substitutes, as ""
                Some(ConfigManagerError::EmptyResponse { .. }) => {
                    debug!(token = %response.key(), "backend returned an empty value");
                }
                Some(err) => {
                    debug!(error = %err, token = %response.key(), "skipping group with recorded error");
                    continue;
                }
                None => {}
            }
            for token in group.tokens() {
                replaced.insert(token.full(), lookup::key_path_lookup(token, response.value()));
            }
        }
        replaced
    }
}

#[async_trait]
impl Generator for PluginGenerator {
    async fn generate(&self, tokens: &[String]) -> Result<ReplacedTokens> {
        self.config.validate()?;

        let text = tokens.join("\n");
        let normalized = self.discover_tokens(&text)?;
        if normalized.is_empty() {
            debug!("no replaceable tokens found in input");
            return Ok(ReplacedTokens::new());
        }

        let prefixes = normalized.prefixes().clone();
        let (host, owned) = match &self.host {
            Some(host) => (host.clone(), false),
            None => (Arc::new(PluginHost::new()), true),
        };

        let result = match host.init(&prefixes).await {
            Ok(()) => self.fan_out(normalized, host.clone()).await,
            Err(err) => Err(err),
        };

        if owned {
            host.shutdown().await;
        }
        result
    }

    async fn close(&self) {
        if let Some(host) = &self.host {
            host.shutdown().await;
        }
    }
}
