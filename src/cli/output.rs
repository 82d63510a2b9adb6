//! CLI output writers
//!
//! `retrieve` renders the replaced-token map as shell `export KEY='value'`
//! lines; `string-input` writes the rewritten text as-is. The special path
//! `stdout` sends output to standard out, any other path is created or
//! truncated as a file.

use crate::config::Config;
use crate::generator::ReplacedTokens;
use std::fs::File;
use std::io::{self, Write};

/// Special `--path` value routing output to standard out
pub const STDOUT_PATH: &str = "stdout";

/// Open the requested output destination
pub fn writer(path: &str) -> io::Result<Box<dyn Write>> {
    if path == STDOUT_PATH {
        Ok(Box::new(io::stdout()))
    } else {
        Ok(Box::new(File::create(path)?))
    }
}

/// Write the replaced map as sourceable `export KEY='value'` lines
///
/// Lines are ordered by token spelling so output is deterministic.
pub fn write_export_lines<W: Write>(
    out: &mut W,
    replaced: &ReplacedTokens,
    config: &Config,
) -> io::Result<()> {
    let mut spellings: Vec<&String> = replaced.keys().collect();
    spellings.sort();

    for spelling in spellings {
        let value = &replaced[spelling];
        writeln!(out, "export {}='{}'", export_key(spelling, config), escape_single_quotes(value))?;
    }
    Ok(())
}

/// Write replaced text output verbatim
pub fn write_string<W: Write>(out: &mut W, content: &str) -> io::Result<()> {
    out.write_all(content.as_bytes())
}

/// Derive the export variable name from a token spelling
///
/// The tail `/`-segment of the store path, stripped of everything that is not
/// alphanumeric or underscore, upper-cased.
fn export_key(spelling: &str, config: &Config) -> String {
    let mut path = spelling;
    if let Some(at) = path.find('[') {
        path = &path[..at];
    }
    if let Some(at) = path.find(config.key_separator()) {
        path = &path[..at];
    }
    if let Some(at) = path.find(config.token_separator()) {
        path = &path[at + config.token_separator().len()..];
    }
    let tail = path.rsplit('/').next().unwrap_or(path);
    tail.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_uppercase()
}

fn escape_single_quotes(value: &str) -> String {
    value.replace('\'', r"'\''")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> ReplacedTokens {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_export_key_from_tail_segment() {
        let config = Config::new();
        assert_eq!(export_key("AWSSECRETS://bar/qusx", &config), "QUSX");
        assert_eq!(export_key("AWSPARAMSTR:///app/db_host", &config), "DB_HOST");
    }

    #[test]
    fn test_export_key_strips_key_path_and_metadata() {
        let config = Config::new();
        assert_eq!(export_key("AWSSECRETS:///app/db|host.port", &config), "DB");
        assert_eq!(export_key("AWSSECRETS:///app/db[version=1]", &config), "DB");
        assert_eq!(export_key("AWSSECRETS:///app/db|host[version=1]", &config), "DB");
    }

    #[test]
    fn test_export_lines() {
        let config = Config::new();
        let replaced = map(&[
            ("AWSSECRETS://bar/qusx", "aksujg"),
            ("AWSSECRETS://bar/lorem", ""),
            ("AWSSECRETS://bar/ducks", "sdhbjk0293"),
        ]);

        let mut out = Vec::new();
        write_export_lines(&mut out, &replaced, &config).unwrap();
        let rendered = String::from_utf8(out).unwrap();

        assert!(rendered.contains("export QUSX='aksujg'"));
        assert!(rendered.contains("export LOREM=''"));
        assert!(rendered.contains("export DUCKS='sdhbjk0293'"));
    }

    #[test]
    fn test_export_lines_are_sorted_by_spelling() {
        let config = Config::new();
        let replaced = map(&[
            ("VAULT://z/last", "1"),
            ("AWSSECRETS://a/first", "2"),
        ]);

        let mut out = Vec::new();
        write_export_lines(&mut out, &replaced, &config).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        let first = rendered.find("FIRST").unwrap();
        let last = rendered.find("LAST").unwrap();
        assert!(first < last);
    }

    #[test]
    fn test_values_with_single_quotes_are_escaped() {
        let config = Config::new();
        let replaced = map(&[("VAULT://app/secret", "it's")]);

        let mut out = Vec::new();
        write_export_lines(&mut out, &replaced, &config).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains(r"export SECRET='it'\''s'"));
    }

    #[test]
    fn test_custom_separator_key_derivation() {
        let config = Config::new().with_token_separator("#").with_key_separator("!");
        assert_eq!(export_key("AWSSECRETS#/app/token!key", &config), "TOKEN");
    }
}
