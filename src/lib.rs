//! # configmanager
//!
//! Resolves embedded configuration tokens inside arbitrary text (env files,
//! JSON/YAML/TOML, CRD specs, plain strings) by fetching their values from
//! pluggable secret/parameter backends and substituting them in place.
//!
//! A token looks like `AWSSECRETS:///app/db|host[version=2]`: a backend
//! prefix, the backend-visible path, an optional JSON key lookup, and
//! optional `k=v` metadata. The pipeline is:
//!
//! ```text
//! input text → lexer → parser → normalizer → retrieval (plugins) → JSON-path → replacer
//! ```
//!
//! Backends are loaded as plugins, either out-of-process gRPC subprocesses or
//! in-process WASM modules, discovered under `.configmanager/plugins/`.
//!
//! ## Library example
//!
//! ```rust,ignore
//! use configmanager::ConfigManager;
//!
//! let cm = ConfigManager::new();
//! let replaced = cm
//!     .retrieve_replaced_string("db_host=AWSPARAMSTR:///app/db|host\n")
//!     .await?;
//! ```
//!
//! Tokens that fail to resolve are left verbatim in the output; retrieval
//! errors are recorded per token group and logged, never raced against each
//! other.

pub mod cli;
pub mod config;
pub mod domain;
pub mod envsubst;
pub mod errors;
pub mod generator;
pub mod lexer;
pub mod parser;
pub mod plugin;

pub use config::Config;
pub use domain::{ParsedToken, TokenPrefix};
pub use errors::{ConfigManagerError, Result};
pub use generator::{Generator, PluginGenerator, ReplacedTokens};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Public entry point composing the whole token pipeline
///
/// Configuration is adjusted with the `with_*` accessors before the first
/// retrieval. The default retrieval path loads plugins per call; tests and
/// embedders can swap the whole coordinator with
/// [`ConfigManager::with_generator`].
pub struct ConfigManager {
    config: Config,
    cancel: CancellationToken,
    generator: Option<Box<dyn Generator>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Create a manager with default configuration
    ///
    /// Defaults: token separator `://`, key separator `|`, no output path,
    /// envsubst disabled.
    pub fn new() -> Self {
        Self { config: Config::new(), cancel: CancellationToken::new(), generator: None }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set a custom token separator
    pub fn with_token_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.config = self.config.with_token_separator(separator);
        self
    }

    /// Set a custom single-character key separator
    pub fn with_key_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.config = self.config.with_key_separator(separator);
        self
    }

    /// Set the output path used by the CLI writers
    pub fn with_output_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config = self.config.with_output_path(path);
        self
    }

    /// Enable strict `$VAR` pre-expansion for string inputs
    pub fn with_env_subst(mut self, enabled: bool) -> Self {
        self.config = self.config.with_env_subst(enabled);
        self
    }

    /// Thread the caller's cancellation handle through retrieval
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Substitute the retrieval coordinator (primarily for testing)
    pub fn with_generator<G: Generator + 'static>(mut self, generator: G) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve the given token strings to their backend values
    ///
    /// The tokens are joined with newlines and fed through the pipeline; the
    /// result maps each full token spelling to its final value. Tokens whose
    /// retrieval failed are absent from the map.
    pub async fn retrieve(&self, tokens: &[String]) -> Result<ReplacedTokens> {
        match &self.generator {
            Some(generator) => generator.generate(tokens).await,
            None => {
                let generator =
                    PluginGenerator::new(self.config.clone(), self.cancel.clone());
                generator.generate(tokens).await
            }
        }
    }

    /// Resolve every token found in `input` and return the rewritten text
    ///
    /// With envsubst enabled, `$VAR` references are strictly expanded first.
    /// Unresolvable tokens are left verbatim.
    pub async fn retrieve_replaced_string(&self, input: &str) -> Result<String> {
        let input = if self.config.env_subst_enabled() {
            envsubst::expand(input)?
        } else {
            input.to_string()
        };

        let replaced = self.retrieve(std::slice::from_ref(&input)).await?;
        Ok(generator::replace::replace_tokens(&replaced, &input))
    }

    /// UTF-8 pass-through variant of [`ConfigManager::retrieve_replaced_string`]
    pub async fn retrieve_replaced_bytes(&self, input: &[u8]) -> Result<Vec<u8>> {
        let text = std::str::from_utf8(input).map_err(|e| {
            ConfigManagerError::config_validation(format!("input is not valid UTF-8: {}", e))
        })?;
        Ok(self.retrieve_replaced_string(text).await?.into_bytes())
    }

    /// Serialize `value` to JSON, resolve the tokens inside it, and
    /// deserialize the replaced document back
    ///
    /// Useful when a framework hands over a typed spec (e.g. a CRD) whose
    /// string fields carry tokens.
    pub async fn retrieve_replaced_json<T>(&self, value: T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let marshalled = serde_json::to_string(&value)?;
        let replaced = self.retrieve_replaced_string(&marshalled).await?;
        Ok(serde_json::from_str(&replaced)?)
    }

    /// YAML variant of [`ConfigManager::retrieve_replaced_json`]
    pub async fn retrieve_replaced_yaml<T>(&self, value: T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let marshalled = serde_yaml::to_string(&value)?;
        let replaced = self.retrieve_replaced_string(&marshalled).await?;
        Ok(serde_yaml::from_str(&replaced)?)
    }

    /// Release resources held by a long-lived coordinator
    ///
    /// The default per-call retrieval path cleans up after itself; this is
    /// for callers that injected a generator holding plugins across calls.
    pub async fn close(&self) {
        if let Some(generator) = &self.generator {
            generator.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "configmanager");
    }

    #[test]
    fn test_config_accessors_chain() {
        let cm = ConfigManager::new()
            .with_token_separator("#")
            .with_key_separator("!")
            .with_output_path("stdout")
            .with_env_subst(true);
        assert_eq!(cm.config().token_separator(), "#");
        assert_eq!(cm.config().key_separator(), "!");
        assert_eq!(cm.config().output_path(), "stdout");
        assert!(cm.config().env_subst_enabled());
    }
}
