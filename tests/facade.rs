//! Facade integration tests with an injected coordinator
//!
//! A fake [`Generator`] stands in for the plugin-backed retrieval so the
//! facade's discovery, replacement, and serde round-trip behavior can be
//! exercised without plugins on disk.

use async_trait::async_trait;
use configmanager::{
    ConfigManager, ConfigManagerError, Generator, ReplacedTokens, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Returns a canned map regardless of input
struct FixedGenerator {
    replaced: HashMap<String, String>,
}

impl FixedGenerator {
    fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            replaced: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }
}

#[async_trait]
impl Generator for FixedGenerator {
    async fn generate(&self, _tokens: &[String]) -> Result<ReplacedTokens> {
        Ok(self.replaced.clone())
    }
}

#[tokio::test]
async fn retrieve_returns_generator_map() {
    let cm = ConfigManager::new()
        .with_generator(FixedGenerator::new(&[("AWSSECRETS:///foo", "bar")]));
    let replaced = cm.retrieve(&["AWSSECRETS:///foo".to_string()]).await.unwrap();
    assert_eq!(replaced.len(), 1);
    assert_eq!(replaced["AWSSECRETS:///foo"], "bar");
}

#[tokio::test]
async fn input_without_tokens_is_returned_unchanged() {
    let cm = ConfigManager::new().with_generator(FixedGenerator::new(&[]));
    let input = "plain=text\nno tokens anywhere\n";
    let replaced = cm.retrieve_replaced_string(input).await.unwrap();
    assert_eq!(replaced, input);
}

#[tokio::test]
async fn adjacent_tokens_are_both_replaced() {
    let cm = ConfigManager::new().with_generator(FixedGenerator::new(&[
        ("AWSPARAMSTR:///path|key", "VP"),
        ("AWSSECRETS:///foo", "VS"),
    ]));
    let replaced = cm
        .retrieve_replaced_string("foo=AWSPARAMSTR:///path|keyAWSSECRETS:///foo\n")
        .await
        .unwrap();
    assert_eq!(replaced, "foo=VPVS\n");
}

#[tokio::test]
async fn longest_token_is_replaced_first() {
    let cm = ConfigManager::new().with_generator(FixedGenerator::new(&[
        ("AWSSECRETS:///foo", "SHORT"),
        ("AWSSECRETS:///foo/bar", "LONG"),
    ]));
    let replaced =
        cm.retrieve_replaced_string("a=AWSSECRETS:///foo/bar\nb=AWSSECRETS:///foo\n").await.unwrap();
    assert_eq!(replaced, "a=LONG\nb=SHORT\n");
}

#[tokio::test]
async fn replacement_is_idempotent_when_values_carry_no_tokens() {
    let cm = ConfigManager::new().with_generator(FixedGenerator::new(&[(
        "GCPSECRETS://project/secret",
        "resolved-value",
    )]));
    let input = "key=GCPSECRETS://project/secret\n";
    let once = cm.retrieve_replaced_string(input).await.unwrap();
    let twice = cm.retrieve_replaced_string(&once).await.unwrap();
    assert_eq!(once, twice);
}

#[tokio::test]
async fn envsubst_expands_before_discovery() {
    std::env::set_var("FACADE_TEST_BAR", "test");
    let cm = ConfigManager::new()
        .with_env_subst(true)
        .with_generator(FixedGenerator::new(&[]));
    let replaced = cm.retrieve_replaced_string("path=FOO#/${FACADE_TEST_BAR}").await.unwrap();
    assert_eq!(replaced, "path=FOO#/test");
    std::env::remove_var("FACADE_TEST_BAR");
}

#[tokio::test]
async fn envsubst_unset_variable_is_fatal() {
    std::env::remove_var("FACADE_TEST_UNSET");
    let cm = ConfigManager::new()
        .with_env_subst(true)
        .with_generator(FixedGenerator::new(&[]));
    let err =
        cm.retrieve_replaced_string("path=FOO#/${FACADE_TEST_UNSET}").await.unwrap_err();
    assert!(matches!(err, ConfigManagerError::EnvSubst { .. }));
}

#[tokio::test]
async fn bytes_round_trip_through_string_path() {
    let cm = ConfigManager::new().with_generator(FixedGenerator::new(&[(
        "VAULT://app/secret",
        "v",
    )]));
    let replaced =
        cm.retrieve_replaced_bytes(b"secret=VAULT://app/secret\n").await.unwrap();
    assert_eq!(replaced, b"secret=v\n");
}

#[tokio::test]
async fn invalid_utf8_bytes_are_rejected() {
    let cm = ConfigManager::new().with_generator(FixedGenerator::new(&[]));
    let err = cm.retrieve_replaced_bytes(&[0xff, 0xfe, 0x00]).await.unwrap_err();
    assert!(matches!(err, ConfigManagerError::ConfigValidation { .. }));
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct AppSpec {
    name: String,
    database_password: String,
}

#[tokio::test]
async fn json_spec_round_trip() {
    let cm = ConfigManager::new().with_generator(FixedGenerator::new(&[(
        "AZKVSECRET://vault/db-password",
        "hunter2",
    )]));
    let spec = AppSpec {
        name: "app".to_string(),
        database_password: "AZKVSECRET://vault/db-password".to_string(),
    };
    let replaced = cm.retrieve_replaced_json(spec).await.unwrap();
    assert_eq!(replaced.database_password, "hunter2");
    assert_eq!(replaced.name, "app");
}

#[tokio::test]
async fn yaml_spec_round_trip() {
    let cm = ConfigManager::new().with_generator(FixedGenerator::new(&[(
        "AZAPPCONF://config/endpoint",
        "https://example.com",
    )]));
    let spec = AppSpec {
        name: "app".to_string(),
        database_password: "AZAPPCONF://config/endpoint".to_string(),
    };
    let replaced = cm.retrieve_replaced_yaml(spec).await.unwrap();
    assert_eq!(replaced.database_password, "https://example.com");
}
