//! Client stub for the `txstream.Transactor` service.
//!
//! Hand-written in the shape tonic's code generator produces, restricted to the
//! single bidirectional `transaction` method the driver needs.

use crate::transaction;
use tonic::codegen::http;
use tonic::transport::{Channel, Endpoint};

/// gRPC path of the bidirectional transaction method.
pub const TRANSACTION_PATH: &str = "/txstream.Transactor/transaction";

#[derive(Debug, Clone)]
pub struct TransactorClient {
    inner: tonic::client::Grpc<Channel>,
}

impl TransactorClient {
    /// Connect to a server, e.g. `"http://127.0.0.1:1729"`.
    pub async fn connect(dst: impl Into<String>) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(dst.into())?.connect().await?;
        Ok(Self::new(channel))
    }

    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Open a bidirectional transaction stream.
    ///
    /// Every item of `request` becomes one client frame on the wire; the
    /// returned stream yields server frames until the server completes or
    /// fails the call.
    pub async fn transaction(
        &mut self,
        request: impl tonic::IntoStreamingRequest<Message = transaction::Client>,
    ) -> Result<tonic::Response<tonic::Streaming<transaction::Server>>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {}", e)))?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(TRANSACTION_PATH);
        self.inner
            .streaming(request.into_streaming_request(), path, codec)
            .await
    }
}
