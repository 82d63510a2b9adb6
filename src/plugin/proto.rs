//! Wire types for the `tokenstore.v1.TokenStore` plugin contract
//!
//! Mirrors `proto/tokenstore/v1/token_store.proto`. The messages and client
//! are written out in the shape `tonic-build` produces so the build carries no
//! protoc requirement; keep them in sync with the proto file.

/// The sanitized store key plus raw token metadata.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TokenValueRequest {
    #[prost(string, tag = "1")]
    pub token: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub metadata: ::prost::alloc::vec::Vec<u8>,
}

/// The backend's value for the requested store key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TokenValueResponse {
    #[prost(string, tag = "1")]
    pub value: ::prost::alloc::string::String,
}

/// Client for the TokenStore service.
pub mod token_store_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::wildcard_imports)]
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct TokenStoreClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl TokenStoreClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> TokenStoreClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        /// Exchange a sanitized store key for the backend's value.
        pub async fn value(
            &mut self,
            request: impl tonic::IntoRequest<super::TokenValueRequest>,
        ) -> std::result::Result<tonic::Response<super::TokenValueResponse>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/tokenstore.v1.TokenStore/Value");
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new("tokenstore.v1.TokenStore", "Value"));
            self.inner.unary(req, path, codec).await
        }
    }
}
