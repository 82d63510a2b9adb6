//! Plugin-side scaffolding
//!
//! Building blocks for writing a configmanager plugin in Rust: implement
//! [`ValueResolver`] for your backend and hand it to [`serve_plugin`] from
//! the plugin binary's `main`. The helper performs the host handshake
//! (cookie check, handshake line on stdout) and serves the
//! `tokenstore.v1.TokenStore` contract over loopback TCP until the host
//! kills the process.
//!
//! ```rust,ignore
//! struct ParamStoreResolver;
//!
//! #[async_trait::async_trait]
//! impl configmanager::plugin::scaffold::ValueResolver for ParamStoreResolver {
//!     async fn resolve(&self, token: &str, _metadata: &[u8]) -> Result<String, tonic::Status> {
//!         Ok(format!("value-for-{token}"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> configmanager::Result<()> {
//!     configmanager::plugin::scaffold::serve_plugin(ParamStoreResolver).await
//! }
//! ```

use crate::errors::{ConfigManagerError, Result};
use crate::plugin::grpc::{HANDSHAKE_COOKIE_KEY, HANDSHAKE_COOKIE_VALUE, PROTOCOL_VERSION};
use crate::plugin::proto::{TokenValueRequest, TokenValueResponse};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_stream::wrappers::TcpListenerStream;

/// The backend logic a plugin author supplies
#[async_trait]
pub trait ValueResolver: Send + Sync + 'static {
    /// Exchange a sanitized store key (plus raw metadata bytes) for a value
    async fn resolve(
        &self,
        token: &str,
        metadata: &[u8],
    ) -> std::result::Result<String, tonic::Status>;
}

/// gRPC service adapter exposing a [`ValueResolver`] as
/// `tokenstore.v1.TokenStore`
pub struct TokenStoreServer<R: ValueResolver> {
    resolver: Arc<R>,
}

impl<R: ValueResolver> TokenStoreServer<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver: Arc::new(resolver) }
    }
}

impl<R: ValueResolver> Clone for TokenStoreServer<R> {
    fn clone(&self) -> Self {
        Self { resolver: self.resolver.clone() }
    }
}

/// Service glue in the shape `tonic-build` produces, trimmed to the single
/// unary method of the contract.
mod service {
    use super::*;
    use tonic::codegen::*;

    impl<R, B> tonic::codegen::Service<http::Request<B>> for TokenStoreServer<R>
    where
        R: ValueResolver,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            match req.uri().path() {
                "/tokenstore.v1.TokenStore/Value" => {
                    struct ValueSvc<R: ValueResolver>(Arc<R>);
                    impl<R: ValueResolver> tonic::server::UnaryService<TokenValueRequest> for ValueSvc<R> {
                        type Response = TokenValueResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;

                        fn call(&mut self, request: tonic::Request<TokenValueRequest>) -> Self::Future {
                            let resolver = Arc::clone(&self.0);
                            Box::pin(async move {
                                let request = request.into_inner();
                                let value =
                                    resolver.resolve(&request.token, &request.metadata).await?;
                                Ok(tonic::Response::new(TokenValueResponse { value }))
                            })
                        }
                    }

                    let resolver = self.resolver.clone();
                    Box::pin(async move {
                        let method = ValueSvc(resolver);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        Ok(grpc.unary(method, req).await)
                    })
                }
                _ => Box::pin(async move {
                    let mut response = http::Response::new(empty_body());
                    let headers = response.headers_mut();
                    headers.insert(
                        tonic::Status::GRPC_STATUS,
                        (tonic::Code::Unimplemented as i32).into(),
                    );
                    headers
                        .insert(http::header::CONTENT_TYPE, tonic::metadata::GRPC_CONTENT_TYPE);
                    Ok(response)
                }),
            }
        }
    }

    impl<R: ValueResolver> tonic::server::NamedService for TokenStoreServer<R> {
        const NAME: &'static str = "tokenstore.v1.TokenStore";
    }
}

/// Serve `resolver` the way a host expects a plugin binary to behave
///
/// Validates the magic cookie (refusing direct execution), binds a loopback
/// port, prints the handshake line, and serves until the process is killed.
pub async fn serve_plugin<R: ValueResolver>(resolver: R) -> Result<()> {
    if std::env::var(HANDSHAKE_COOKIE_KEY).as_deref() != Ok(HANDSHAKE_COOKIE_VALUE) {
        return Err(ConfigManagerError::plugin_transport(
            "this binary is a configmanager plugin and must be launched by the host",
        ));
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    announce_handshake(addr)?;

    tonic::transport::Server::builder()
        .add_service(TokenStoreServer::new(resolver))
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await
        .map_err(|e| {
            ConfigManagerError::plugin_transport_with_source("plugin server failed", Box::new(e))
        })
}

fn announce_handshake(addr: std::net::SocketAddr) -> Result<()> {
    use std::io::Write;
    let mut stdout = std::io::stdout();
    writeln!(stdout, "1|{}|tcp|{}|grpc", PROTOCOL_VERSION, addr)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoResolver;

    #[async_trait]
    impl ValueResolver for EchoResolver {
        async fn resolve(
            &self,
            token: &str,
            metadata: &[u8],
        ) -> std::result::Result<String, tonic::Status> {
            Ok(format!("{}+{}", token, metadata.len()))
        }
    }

    #[tokio::test]
    async fn test_serve_plugin_refuses_direct_execution() {
        std::env::remove_var(HANDSHAKE_COOKIE_KEY);
        let err = serve_plugin(EchoResolver).await.unwrap_err();
        assert!(matches!(err, ConfigManagerError::PluginTransport { .. }));
    }
}
