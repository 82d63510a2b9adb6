//! In-process WASM plugin transport (WASI preview 1)
//!
//! The module is compiled once per prefix; every call instantiates a fresh
//! instance, because instances are not re-entrant and concurrent tasks must
//! never share one. A call is one lease over the guest's linear memory:
//!
//! 1. JSON-serialize `{sanitized_path, metadata}` and `allocate` + write it
//! 2. `allocate` a 4-byte little-endian length cell and a 64-byte output
//!    buffer
//! 3. call `strategy_token_value(in_ptr, in_len, out_ptr, out_cap,
//!    out_len_ptr)`
//! 4. on `ERR_BUF_TOO_SMALL`, grow the output buffer to the required length
//!    and retry exactly once
//! 5. on `OK`, copy the value out of linear memory (detached into host-owned
//!    bytes) and `deallocate` all scratch
//!
//! All pointers crossing the boundary are u32 offsets into the guest's
//! linear memory and never outlive the call.

use crate::errors::{ConfigManagerError, PluginReturnCode, Result};
use crate::plugin::TokenStore;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use wasmtime::{Engine, Linker, Module, Store, TypedFunc};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::WasiCtxBuilder;

/// Success return code from `strategy_token_value`
pub const OK: i32 = 0;
/// Output buffer smaller than the value; retry with the required capacity
pub const ERR_BUF_TOO_SMALL: i32 = -1;

/// Initial output buffer size; the guest asks for more when needed
const INITIAL_OUT_CAP: u32 = 64;
/// Upper bound on a guest-requested output buffer
const MAX_OUT_CAP: u32 = 1 << 26;

/// The JSON payload handed to the guest
#[derive(Serialize)]
struct MessageExchange<'a> {
    sanitized_path: &'a str,
    metadata: &'a str,
}

/// A per-prefix plugin hosted as a WASI preview 1 module
pub struct WasmPlugin {
    engine: Engine,
    module: Module,
    linker: Linker<WasiP1Ctx>,
}

impl std::fmt::Debug for WasmPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmPlugin").finish_non_exhaustive()
    }
}

impl WasmPlugin {
    /// Compile the module at `path` once for the lifetime of the host
    pub fn load(path: &Path) -> Result<Self> {
        let engine = Engine::default();
        let module = Module::from_file(&engine, path).map_err(|e| {
            ConfigManagerError::plugin_transport(format!(
                "failed to compile wasm module {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut linker: Linker<WasiP1Ctx> = Linker::new(&engine);
        preview1::add_to_linker_sync(&mut linker, |ctx| ctx).map_err(|e| {
            ConfigManagerError::plugin_transport(format!("failed to link WASI imports: {}", e))
        })?;
        Ok(Self { engine, module, linker })
    }
}

#[async_trait]
impl TokenStore for WasmPlugin {
    async fn value(
        &self,
        store_key: &str,
        metadata: &[u8],
        cancel: &CancellationToken,
    ) -> Result<String> {
        if store_key.is_empty() {
            return Err(ConfigManagerError::retrieve_failed("token must not be empty"));
        }

        let metadata = String::from_utf8_lossy(metadata);
        let exchange = MessageExchange { sanitized_path: store_key, metadata: &metadata };
        let payload = serde_json::to_vec(&exchange)?;

        let engine = self.engine.clone();
        let module = self.module.clone();
        let linker = self.linker.clone();
        let call =
            tokio::task::spawn_blocking(move || call_token_value(&engine, &module, &linker, &payload));

        tokio::select! {
            _ = cancel.cancelled() => Err(ConfigManagerError::Cancelled),
            joined = call => match joined {
                Ok(result) => result.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
                Err(err) => Err(ConfigManagerError::plugin_transport(format!(
                    "wasm call task failed: {}",
                    err
                ))),
            },
        }
    }
}

/// Typed view over the guest's exported ABI
struct GuestApi {
    memory: wasmtime::Memory,
    allocate: TypedFunc<u32, u32>,
    deallocate: TypedFunc<(u32, u32), ()>,
    token_value: TypedFunc<(u32, u32, u32, u32, u32), i32>,
}

fn transport(message: impl std::fmt::Display) -> ConfigManagerError {
    ConfigManagerError::plugin_transport(message.to_string())
}

fn instantiate(
    engine: &Engine,
    module: &Module,
    linker: &Linker<WasiP1Ctx>,
) -> Result<(Store<WasiP1Ctx>, GuestApi)> {
    let wasi = WasiCtxBuilder::new().inherit_stderr().build_p1();
    let mut store = Store::new(engine, wasi);

    let instance = linker
        .instantiate(&mut store, module)
        .map_err(|e| transport(format!("failed to instantiate wasm module: {}", e)))?;

    // reactor-style modules export _initialize instead of _start
    if let Ok(init) = instance.get_typed_func::<(), ()>(&mut store, "_initialize") {
        init.call(&mut store, ())
            .map_err(|e| transport(format!("wasm _initialize failed: {}", e)))?;
    }

    let memory = instance
        .get_memory(&mut store, "memory")
        .ok_or_else(|| transport("wasm module exports no memory"))?;
    let allocate = instance
        .get_typed_func::<u32, u32>(&mut store, "allocate")
        .map_err(|e| transport(format!("missing export allocate: {}", e)))?;
    let deallocate = instance
        .get_typed_func::<(u32, u32), ()>(&mut store, "deallocate")
        .map_err(|e| transport(format!("missing export deallocate: {}", e)))?;
    let token_value = instance
        .get_typed_func::<(u32, u32, u32, u32, u32), i32>(&mut store, "strategy_token_value")
        .map_err(|e| transport(format!("missing export strategy_token_value: {}", e)))?;

    Ok((store, GuestApi { memory, allocate, deallocate, token_value }))
}

/// Allocate guest memory and write `bytes` into it
fn put(store: &mut Store<WasiP1Ctx>, api: &GuestApi, bytes: &[u8]) -> Result<(u32, u32)> {
    let len = bytes.len() as u32;
    let ptr = api
        .allocate
        .call(&mut *store, len)
        .map_err(|e| transport(format!("allocate failed: {}", e)))?;
    if ptr == 0 {
        return Err(transport("allocate returned 0 for input buffer"));
    }
    if let Err(e) = api.memory.write(&mut *store, ptr as usize, bytes) {
        let _ = api.deallocate.call(&mut *store, (ptr, len));
        return Err(transport(format!("memory write failed: {}", e)));
    }
    Ok((ptr, len))
}

fn alloc(store: &mut Store<WasiP1Ctx>, api: &GuestApi, size: u32, what: &str) -> Result<u32> {
    let ptr = api
        .allocate
        .call(&mut *store, size)
        .map_err(|e| transport(format!("allocate {} failed: {}", what, e)))?;
    if ptr == 0 {
        return Err(transport(format!("allocate returned 0 for {}", what)));
    }
    Ok(ptr)
}

/// Read the little-endian u32 required-length cell
fn read_required(store: &Store<WasiP1Ctx>, api: &GuestApi, out_len_ptr: u32) -> Result<u32> {
    let at = out_len_ptr as usize;
    let data = api.memory.data(store);
    let cell = data
        .get(at..at + 4)
        .ok_or_else(|| transport("required-length cell out of bounds"))?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(cell);
    Ok(u32::from_le_bytes(raw))
}

/// Reusable output buffer lease; grown at most once per call
struct OutBuffer {
    ptr: u32,
    cap: u32,
}

/// One full lease over the guest: alloc, write, call, read, free
fn call_token_value(
    engine: &Engine,
    module: &Module,
    linker: &Linker<WasiP1Ctx>,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let (mut store, api) = instantiate(engine, module, linker)?;

    let (in_ptr, in_len) = put(&mut store, &api, payload)?;
    let out_len_ptr = alloc(&mut store, &api, 4, "out_len_ptr")?;
    let mut out =
        OutBuffer { ptr: alloc(&mut store, &api, INITIAL_OUT_CAP, "out buffer")?, cap: INITIAL_OUT_CAP };

    let result = exchange(&mut store, &api, in_ptr, in_len, out_len_ptr, &mut out);

    // free scratch before the instance goes away
    let _ = api.deallocate.call(&mut store, (in_ptr, in_len));
    let _ = api.deallocate.call(&mut store, (out.ptr, out.cap));
    let _ = api.deallocate.call(&mut store, (out_len_ptr, 4));

    result
}

fn exchange(
    store: &mut Store<WasiP1Ctx>,
    api: &GuestApi,
    in_ptr: u32,
    in_len: u32,
    out_len_ptr: u32,
    out: &mut OutBuffer,
) -> Result<Vec<u8>> {
    let (first_rc, first_required) = invoke(store, api, in_ptr, in_len, out, out_len_ptr)?;

    let (rc, required) = if first_rc == ERR_BUF_TOO_SMALL {
        if first_required > MAX_OUT_CAP {
            return Err(transport(format!(
                "plugin requested an unreasonable output buffer of {} bytes",
                first_required
            )));
        }
        // grow once to the required length and retry
        let _ = api.deallocate.call(&mut *store, (out.ptr, out.cap));
        out.cap = first_required;
        out.ptr = alloc(store, api, out.cap, "resized out buffer")?;
        invoke(store, api, in_ptr, in_len, out, out_len_ptr)?
    } else {
        (first_rc, first_required)
    };

    match rc {
        OK => {
            let mut value = vec![0u8; required as usize];
            api.memory
                .read(&*store, out.ptr as usize, &mut value)
                .map_err(|e| transport(format!("memory read failed: {}", e)))?;
            Ok(value)
        }
        ERR_BUF_TOO_SMALL => Err(transport(format!(
            "output buffer still too small after resize (need {})",
            required
        ))),
        code => match PluginReturnCode::from_code(code) {
            Some(kind) => Err(ConfigManagerError::PluginReturn { code: kind }),
            None => Err(transport(format!("unknown plugin return code: {}", code))),
        },
    }
}

fn invoke(
    store: &mut Store<WasiP1Ctx>,
    api: &GuestApi,
    in_ptr: u32,
    in_len: u32,
    out: &OutBuffer,
    out_len_ptr: u32,
) -> Result<(i32, u32)> {
    let rc = api
        .token_value
        .call(&mut *store, (in_ptr, in_len, out.ptr, out.cap, out_len_ptr))
        .map_err(|e| transport(format!("strategy_token_value trapped: {}", e)))?;
    let required = read_required(store, api, out_len_ptr)?;
    Ok((rc, required))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_rejects_invalid_module() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wasm");
        std::fs::write(&path, b"not a wasm module").unwrap();

        let err = WasmPlugin::load(&path).unwrap_err();
        assert!(matches!(err, ConfigManagerError::PluginTransport { .. }));
    }

    #[test]
    fn test_load_rejects_missing_file() {
        let err = WasmPlugin::load(Path::new("/nonexistent/plugin.wasm")).unwrap_err();
        assert!(matches!(err, ConfigManagerError::PluginTransport { .. }));
    }

    #[test]
    fn test_message_exchange_shape() {
        let exchange = MessageExchange { sanitized_path: "/app/db", metadata: "version=1" };
        let json = serde_json::to_string(&exchange).unwrap();
        assert_eq!(json, r#"{"sanitized_path":"/app/db","metadata":"version=1"}"#);
    }
}
