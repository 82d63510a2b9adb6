//! # Error Handling
//!
//! Error types for the configmanager token pipeline, defined with `thiserror`.
//!
//! The closed set of error kinds mirrors the failure modes of the pipeline:
//! configuration validation, token discovery, env-var pre-expansion, plugin
//! resolution/transport, backend retrieval, and caller cancellation. Per-token
//! retrieval failures are recorded on their token group and logged at debug
//! level; only the kinds marked by [`ConfigManagerError::is_fatal`] surface to
//! the caller.

use crate::parser::ParseError;

/// Custom result type for configmanager operations
pub type Result<T> = std::result::Result<T, ConfigManagerError>;

/// Main error type for the configmanager library and CLI
#[derive(thiserror::Error, Debug)]
pub enum ConfigManagerError {
    /// Configuration validation errors, e.g. a multi-character key separator
    #[error("config validation failed: {message}")]
    ConfigValidation { message: String },

    /// The parser emitted one or more errors while scanning the input
    #[error("failed to discover tokens: {} parse error(s): {}", .errors.len(), format_parse_errors(.errors))]
    TokenDiscovery { errors: Vec<ParseError> },

    /// Strict `$VAR` expansion failed (variable unset or empty)
    #[error("envsubst enabled and errored on: {message}")]
    EnvSubst { message: String },

    /// No plugin binary discovered or registered for a prefix
    #[error("plugin does not exist for prefix: {prefix}")]
    PluginNotFound { prefix: String },

    /// Subprocess, gRPC channel, or WASM runtime failure
    #[error("plugin transport error: {message}")]
    PluginTransport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A WASM plugin returned a non-OK code
    #[error("plugin returned error code: {code}")]
    PluginReturn { code: PluginReturnCode },

    /// The backend RPC completed but reported an error
    #[error("failed to retrieve config item: {message}")]
    RetrieveFailed { message: String },

    /// The backend returned a null/empty value; non-fatal, value substitutes as ""
    #[error("value retrieved but empty for token: {token}")]
    EmptyResponse { token: String },

    /// Caller cancellation observed
    #[error("operation cancelled")]
    Cancelled,

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("serialization error: {context}")]
    Serialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
        context: String,
    },
}

/// Closed set of non-OK return codes a WASM plugin can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginReturnCode {
    BufTooSmall,
    InvalidUtf8,
    EmptyInput,
    Internal,
    FailedUnmarshal,
    InitStore,
    FailedValueRetrieval,
}

impl PluginReturnCode {
    /// Map a raw plugin return code to its kind; `None` for OK or codes
    /// outside the closed set.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::BufTooSmall),
            -2 => Some(Self::InvalidUtf8),
            -3 => Some(Self::EmptyInput),
            -4 => Some(Self::Internal),
            -5 => Some(Self::FailedUnmarshal),
            -6 => Some(Self::InitStore),
            -7 => Some(Self::FailedValueRetrieval),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            Self::BufTooSmall => -1,
            Self::InvalidUtf8 => -2,
            Self::EmptyInput => -3,
            Self::Internal => -4,
            Self::FailedUnmarshal => -5,
            Self::InitStore => -6,
            Self::FailedValueRetrieval => -7,
        }
    }
}

impl std::fmt::Display for PluginReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BufTooSmall => "buffer too small",
            Self::InvalidUtf8 => "invalid UTF-8 in input",
            Self::EmptyInput => "empty input",
            Self::Internal => "internal plugin error",
            Self::FailedUnmarshal => "failed to unmarshal input",
            Self::InitStore => "failed to initialize the backing store",
            Self::FailedValueRetrieval => "failed to retrieve the value",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

impl ConfigManagerError {
    /// Create a new configuration validation error
    pub fn config_validation<S: Into<String>>(message: S) -> Self {
        Self::ConfigValidation { message: message.into() }
    }

    /// Create an envsubst error
    pub fn env_subst<S: Into<String>>(message: S) -> Self {
        Self::EnvSubst { message: message.into() }
    }

    /// Create a plugin-not-found error for a prefix
    pub fn plugin_not_found<S: Into<String>>(prefix: S) -> Self {
        Self::PluginNotFound { prefix: prefix.into() }
    }

    /// Create a plugin transport error
    pub fn plugin_transport<S: Into<String>>(message: S) -> Self {
        Self::PluginTransport { message: message.into(), source: None }
    }

    /// Create a plugin transport error with source
    pub fn plugin_transport_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::PluginTransport { message: message.into(), source: Some(source) }
    }

    /// Create a retrieval error
    pub fn retrieve_failed<S: Into<String>>(message: S) -> Self {
        Self::RetrieveFailed { message: message.into() }
    }

    /// Create an empty-response error for a token
    pub fn empty_response<S: Into<String>>(token: S) -> Self {
        Self::EmptyResponse { token: token.into() }
    }

    /// Whether this error surfaces to the caller or is recorded on its token
    /// group and skipped during fan-out.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConfigManagerError::ConfigValidation { .. }
                | ConfigManagerError::TokenDiscovery { .. }
                | ConfigManagerError::EnvSubst { .. }
                | ConfigManagerError::PluginNotFound { .. }
                | ConfigManagerError::Cancelled
        )
    }
}

impl From<std::io::Error> for ConfigManagerError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for ConfigManagerError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            source: Box::new(error),
            context: "JSON serialization failed".to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigManagerError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization {
            source: Box::new(error),
            context: "YAML serialization failed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = ConfigManagerError::config_validation("keyseparator can only be 1 character");
        assert!(matches!(error, ConfigManagerError::ConfigValidation { .. }));
        assert_eq!(
            error.to_string(),
            "config validation failed: keyseparator can only be 1 character"
        );
    }

    #[test]
    fn test_plugin_return_code_roundtrip() {
        for code in -7..=-1 {
            let kind = PluginReturnCode::from_code(code).unwrap();
            assert_eq!(kind.as_i32(), code);
        }
        assert!(PluginReturnCode::from_code(0).is_none());
        assert!(PluginReturnCode::from_code(-8).is_none());
        assert!(PluginReturnCode::from_code(1).is_none());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(ConfigManagerError::config_validation("x").is_fatal());
        assert!(ConfigManagerError::env_subst("x").is_fatal());
        assert!(ConfigManagerError::plugin_not_found("VAULT").is_fatal());
        assert!(ConfigManagerError::Cancelled.is_fatal());
        assert!(!ConfigManagerError::retrieve_failed("x").is_fatal());
        assert!(!ConfigManagerError::empty_response("x").is_fatal());
        assert!(!ConfigManagerError::plugin_transport("x").is_fatal());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ConfigManagerError = io_error.into();
        assert!(matches!(error, ConfigManagerError::Io { .. }));

        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: ConfigManagerError = json_error.into();
        assert!(matches!(error, ConfigManagerError::Serialization { .. }));
    }
}
