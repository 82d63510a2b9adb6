//! # Plugin Host
//!
//! Loads and owns the per-prefix backend plugins. A plugin is either an
//! out-of-process gRPC subprocess or an in-process WASM module; both expose
//! the same [`TokenStore`] contract, `Value(store_key, metadata) -> value`.
//!
//! The prefix-to-plugin registry is built once from the set of prefixes the
//! normalizer discovered, before retrieval fans out; during fan-out it is
//! read-only. The host guarantees every spawned subprocess is signalled on
//! shutdown.

pub mod discovery;
pub mod grpc;
pub mod proto;
pub mod scaffold;
pub mod wasm;

pub use discovery::{find_plugin, PluginBinary};
pub use grpc::GrpcPlugin;
pub use wasm::WasmPlugin;

use crate::domain::TokenPrefix;
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The uniform contract every backend plugin implements
///
/// Implementations must be safe for concurrent calls; the retrieval
/// coordinator makes one call per normalized token group, in parallel.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Exchange a sanitized store key (plus raw metadata bytes) for the
    /// backend's value
    ///
    /// The cancellation handle is the caller's; implementations must observe
    /// it and abandon in-flight work.
    async fn value(
        &self,
        store_key: &str,
        metadata: &[u8],
        cancel: &CancellationToken,
    ) -> Result<String>;

    /// Release transport resources (kill the subprocess, drop the runtime)
    async fn close(&self) {}
}

impl std::fmt::Debug for dyn TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn TokenStore").finish_non_exhaustive()
    }
}

/// Owns every loaded plugin, keyed by implementation prefix
#[derive(Default)]
pub struct PluginHost {
    plugins: RwLock<HashMap<TokenPrefix, Arc<dyn TokenStore>>>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process [`TokenStore`] for a prefix
    ///
    /// Registered stores take precedence over on-disk plugin discovery; this
    /// is the injection point for custom backends and test fakes.
    pub fn register(&self, prefix: TokenPrefix, store: Arc<dyn TokenStore>) {
        if let Ok(mut plugins) = self.plugins.write() {
            plugins.insert(prefix, store);
        }
    }

    /// Discover and load a plugin for every prefix not yet registered
    ///
    /// A prefix with neither a registered store nor an on-disk plugin fails
    /// the whole initialisation; retrieval never starts with a partial
    /// registry.
    pub async fn init(&self, prefixes: &BTreeSet<TokenPrefix>) -> Result<()> {
        let missing: Vec<TokenPrefix> = {
            let plugins = match self.plugins.read() {
                Ok(plugins) => plugins,
                Err(poisoned) => poisoned.into_inner(),
            };
            prefixes.iter().filter(|p| !plugins.contains_key(p)).copied().collect()
        };

        for prefix in missing {
            let store = Self::load(prefix).await?;
            info!(prefix = %prefix, "loaded plugin");
            self.register(prefix, store);
        }
        Ok(())
    }

    async fn load(prefix: TokenPrefix) -> Result<Arc<dyn TokenStore>> {
        match find_plugin(prefix)? {
            PluginBinary::Grpc(path) => {
                debug!(prefix = %prefix, path = %path.display(), "spawning subprocess plugin");
                Ok(Arc::new(GrpcPlugin::spawn(&path).await?))
            }
            PluginBinary::Wasm(path) => {
                debug!(prefix = %prefix, path = %path.display(), "compiling wasm plugin");
                Ok(Arc::new(WasmPlugin::load(&path)?))
            }
        }
    }

    /// Look up the plugin for a prefix
    pub fn get(&self, prefix: TokenPrefix) -> Result<Arc<dyn TokenStore>> {
        let plugins = match self.plugins.read() {
            Ok(plugins) => plugins,
            Err(poisoned) => poisoned.into_inner(),
        };
        plugins
            .get(&prefix)
            .cloned()
            .ok_or_else(|| crate::errors::ConfigManagerError::plugin_not_found(prefix.as_str()))
    }

    /// Close every plugin and clear the registry
    ///
    /// Must not run while retrieval is in flight; the coordinator only calls
    /// it after joining all tasks.
    pub async fn shutdown(&self) {
        let stores: Vec<Arc<dyn TokenStore>> = {
            let mut plugins = match self.plugins.write() {
                Ok(plugins) => plugins,
                Err(poisoned) => poisoned.into_inner(),
            };
            plugins.drain().map(|(_, store)| store).collect()
        };
        for store in stores {
            store.close().await;
        }
    }
}
