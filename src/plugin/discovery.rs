//! Plugin discovery on disk
//!
//! Plugins live under `.configmanager/plugins/<prefix_lower>/`, searched
//! first relative to the current working directory and then the user's home
//! directory. A native `<prefix_lower>-<os>-<arch>` binary is preferred (it
//! is served as a gRPC subprocess); a `<prefix_lower>.wasm` module in the
//! same directory is the in-process fallback.

use crate::domain::TokenPrefix;
use crate::errors::{ConfigManagerError, Result};
use std::path::PathBuf;

/// Directory plugins are looked up under, relative to each search root
const PLUGIN_DIR: &str = ".configmanager/plugins";

/// How a discovered plugin is to be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginBinary {
    /// Subprocess served over gRPC
    Grpc(PathBuf),
    /// WASI preview 1 module hosted in-process
    Wasm(PathBuf),
}

/// Locate the plugin for a prefix
///
/// Returns `PluginNotFound` when neither binary form exists under any search
/// root.
pub fn find_plugin(prefix: TokenPrefix) -> Result<PluginBinary> {
    find_plugin_in(prefix, &search_roots())
}

fn find_plugin_in(prefix: TokenPrefix, roots: &[PathBuf]) -> Result<PluginBinary> {
    let name = prefix.plugin_name();
    for root in roots {
        let dir = root.join(PLUGIN_DIR).join(&name);
        let native = dir.join(format!(
            "{}-{}-{}",
            name,
            std::env::consts::OS,
            std::env::consts::ARCH
        ));
        if native.is_file() {
            return Ok(PluginBinary::Grpc(native));
        }
        let wasm = dir.join(format!("{}.wasm", name));
        if wasm.is_file() {
            return Ok(PluginBinary::Wasm(wasm));
        }
    }
    Err(ConfigManagerError::plugin_not_found(prefix.as_str()))
}

/// Current working directory first, then the user's home
fn search_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            roots.push(PathBuf::from(home));
        }
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn plugin_dir_for(root: &Path, prefix: TokenPrefix) -> PathBuf {
        root.join(PLUGIN_DIR).join(prefix.plugin_name())
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_missing_plugin() {
        let root = tempfile::tempdir().unwrap();
        let err = find_plugin_in(TokenPrefix::Vault, &[root.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, ConfigManagerError::PluginNotFound { .. }));
    }

    #[test]
    fn test_native_binary_found() {
        let root = tempfile::tempdir().unwrap();
        let dir = plugin_dir_for(root.path(), TokenPrefix::Vault);
        let native = dir.join(format!(
            "vault-{}-{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ));
        touch(&native);

        let found = find_plugin_in(TokenPrefix::Vault, &[root.path().to_path_buf()]).unwrap();
        assert_eq!(found, PluginBinary::Grpc(native));
    }

    #[test]
    fn test_native_binary_preferred_over_wasm() {
        let root = tempfile::tempdir().unwrap();
        let dir = plugin_dir_for(root.path(), TokenPrefix::GcpSecrets);
        let native = dir.join(format!(
            "gcpsecrets-{}-{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ));
        touch(&native);
        touch(&dir.join("gcpsecrets.wasm"));

        let found =
            find_plugin_in(TokenPrefix::GcpSecrets, &[root.path().to_path_buf()]).unwrap();
        assert_eq!(found, PluginBinary::Grpc(native));
    }

    #[test]
    fn test_wasm_fallback() {
        let root = tempfile::tempdir().unwrap();
        let dir = plugin_dir_for(root.path(), TokenPrefix::AwsParamStr);
        let wasm = dir.join("awsparamstr.wasm");
        touch(&wasm);

        let found =
            find_plugin_in(TokenPrefix::AwsParamStr, &[root.path().to_path_buf()]).unwrap();
        assert_eq!(found, PluginBinary::Wasm(wasm));
    }

    #[test]
    fn test_first_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let in_first = plugin_dir_for(first.path(), TokenPrefix::Unknown).join("unknown.wasm");
        let in_second = plugin_dir_for(second.path(), TokenPrefix::Unknown).join("unknown.wasm");
        touch(&in_first);
        touch(&in_second);

        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = find_plugin_in(TokenPrefix::Unknown, &roots).unwrap();
        assert_eq!(found, PluginBinary::Wasm(in_first));
    }
}
