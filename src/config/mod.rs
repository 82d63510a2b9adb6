//! # Configuration
//!
//! Runtime configuration for the token pipeline: the token separator that
//! splits a prefix from its store path, the single-character key separator
//! that introduces a JSON key lookup, the optional output path, and the
//! envsubst pre-expansion toggle.

use crate::errors::{ConfigManagerError, Result};

/// Name the tool identifies itself as (CLI name, plugin directory owner)
pub const SELF_NAME: &str = "configmanager";

/// Default separator between a prefix and the store path
const DEFAULT_TOKEN_SEPARATOR: &str = "://";

/// Default separator between the store path and a JSON key lookup
const DEFAULT_KEY_SEPARATOR: &str = "|";

/// Pipeline configuration snapshot
///
/// Built with chained `with_*` calls; a copy is embedded in every
/// [`crate::domain::ParsedToken`] so derived token views stay stable even if
/// the caller reconfigures afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    output_path: String,
    token_separator: String,
    key_separator: String,
    enable_env_subst: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_path: String::new(),
            token_separator: DEFAULT_TOKEN_SEPARATOR.to_string(),
            key_separator: DEFAULT_KEY_SEPARATOR.to_string(),
            enable_env_subst: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output path the CLI writes export lines to
    pub fn with_output_path<S: Into<String>>(mut self, output_path: S) -> Self {
        self.output_path = output_path.into();
        self
    }

    /// Set a custom token separator, e.g. `#`
    pub fn with_token_separator<S: Into<String>>(mut self, token_separator: S) -> Self {
        self.token_separator = token_separator.into();
        self
    }

    /// Set a custom key separator; must be a single character
    pub fn with_key_separator<S: Into<String>>(mut self, key_separator: S) -> Self {
        self.key_separator = key_separator.into();
        self
    }

    /// Enable or disable strict `$VAR` pre-expansion
    pub fn with_env_subst(mut self, enabled: bool) -> Self {
        self.enable_env_subst = enabled;
        self
    }

    pub fn output_path(&self) -> &str {
        &self.output_path
    }

    pub fn token_separator(&self) -> &str {
        &self.token_separator
    }

    pub fn key_separator(&self) -> &str {
        &self.key_separator
    }

    pub fn env_subst_enabled(&self) -> bool {
        self.enable_env_subst
    }

    /// The key separator as a single character; only valid after
    /// [`Config::validate`] has passed.
    pub(crate) fn key_separator_char(&self) -> char {
        self.key_separator.chars().next().unwrap_or('|')
    }

    /// Validate the configuration
    ///
    /// The key separator must be exactly one character: the lexer recognises
    /// it as a standalone token kind and cannot do so for longer sequences.
    pub fn validate(&self) -> Result<()> {
        if self.key_separator.chars().count() != 1 {
            return Err(ConfigManagerError::config_validation(
                "keyseparator can only be 1 character",
            ));
        }
        if self.token_separator.is_empty() {
            return Err(ConfigManagerError::config_validation("tokenseparator cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::new();
        assert_eq!(config.token_separator(), "://");
        assert_eq!(config.key_separator(), "|");
        assert_eq!(config.output_path(), "");
        assert!(!config.env_subst_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_withers() {
        let config = Config::new()
            .with_token_separator("#")
            .with_key_separator("/")
            .with_output_path("./app.env")
            .with_env_subst(true);

        assert_eq!(config.token_separator(), "#");
        assert_eq!(config.key_separator(), "/");
        assert_eq!(config.output_path(), "./app.env");
        assert!(config.env_subst_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_separator_must_be_single_char() {
        let config = Config::new().with_key_separator("||");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigManagerError::ConfigValidation { .. }));

        let config = Config::new().with_key_separator("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_token_separator_rejected() {
        let config = Config::new().with_token_separator("");
        assert!(config.validate().is_err());
    }
}
