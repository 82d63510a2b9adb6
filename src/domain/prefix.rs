//! Implementation prefix for the closed set of backend stores

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend selector at the front of every token
///
/// The prefix determines which plugin resolves the token; it never appears in
/// the sanitized path handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TokenPrefix {
    /// AWS Secrets Manager
    #[serde(rename = "AWSSECRETS")]
    AwsSecrets,
    /// AWS Systems Manager Parameter Store
    #[serde(rename = "AWSPARAMSTR")]
    AwsParamStr,
    /// Azure Key Vault secrets
    #[serde(rename = "AZKVSECRET")]
    AzKvSecret,
    /// Azure Table Storage
    #[serde(rename = "AZTABLESTORE")]
    AzTableStore,
    /// Azure App Configuration
    #[serde(rename = "AZAPPCONF")]
    AzAppConf,
    /// GCP Secret Manager
    #[serde(rename = "GCPSECRETS")]
    GcpSecrets,
    /// HashiCorp Vault
    #[serde(rename = "VAULT")]
    Vault,
    /// Reserved test/no-op implementation
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

/// Every recognised prefix, in declaration order
pub const ALL_PREFIXES: [TokenPrefix; 8] = [
    TokenPrefix::AwsSecrets,
    TokenPrefix::AwsParamStr,
    TokenPrefix::AzKvSecret,
    TokenPrefix::AzTableStore,
    TokenPrefix::AzAppConf,
    TokenPrefix::GcpSecrets,
    TokenPrefix::Vault,
    TokenPrefix::Unknown,
];

impl TokenPrefix {
    /// The literal as it appears in source text
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwsSecrets => "AWSSECRETS",
            Self::AwsParamStr => "AWSPARAMSTR",
            Self::AzKvSecret => "AZKVSECRET",
            Self::AzTableStore => "AZTABLESTORE",
            Self::AzAppConf => "AZAPPCONF",
            Self::GcpSecrets => "GCPSECRETS",
            Self::Vault => "VAULT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// The lower-cased name used for plugin discovery on disk
    pub fn plugin_name(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl FromStr for TokenPrefix {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ALL_PREFIXES
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown implementation prefix: {}", s))
    }
}

impl fmt::Display for TokenPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
