//! Duplex channel
//!
//! Message-passing boundary between the network and the routing logic. The
//! write side is an unbounded sender of client frames; dropping every sender
//! ends the stream towards the server. The read side is a stream of server
//! frames or the status that terminated the call.

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::Status;
use txstream_proto::transaction;

/// Inbound half of a duplex channel
pub type InboundStream = BoxStream<'static, Result<transaction::Server, Status>>;

/// One physical bidirectional channel, owned by one transaction
pub struct DuplexChannel {
    pub outbound: UnboundedSender<transaction::Client>,
    pub inbound: InboundStream,
}

impl DuplexChannel {
    pub fn new(outbound: UnboundedSender<transaction::Client>, inbound: InboundStream) -> Self {
        Self { outbound, inbound }
    }
}

/// Create an in-process channel together with the server end that drives it.
pub fn loopback() -> (DuplexChannel, LoopbackServer) {
    let (request_sink, requests) = mpsc::unbounded_channel();
    let (responses, response_source) = mpsc::unbounded_channel();
    let channel = DuplexChannel::new(
        request_sink,
        UnboundedReceiverStream::new(response_source).boxed(),
    );
    let server = LoopbackServer {
        requests,
        responses: Some(responses),
    };
    (channel, server)
}

/// Server side of a [`loopback`] channel.
pub struct LoopbackServer {
    requests: UnboundedReceiver<transaction::Client>,
    responses: Option<UnboundedSender<Result<transaction::Server, Status>>>,
}

impl LoopbackServer {
    /// Wait for the next client frame. `None` once the client ended its
    /// write side.
    pub async fn recv(&mut self) -> Option<transaction::Client> {
        self.requests.recv().await
    }

    /// Next client frame if one was already written
    pub fn try_recv(&mut self) -> Option<transaction::Client> {
        match self.requests.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Send a server frame. Returns false if the client side is gone.
    pub fn send(&self, message: transaction::Server) -> bool {
        self.send_result(Ok(message))
    }

    /// Terminate the call with an error status
    pub fn fail(&mut self, status: Status) {
        self.send_result(Err(status));
        self.responses = None;
    }

    /// Complete the call normally
    pub fn finish(&mut self) {
        self.responses = None;
    }

    fn send_result(&self, result: Result<transaction::Server, Status>) -> bool {
        match &self.responses {
            Some(sink) => sink.send(result).is_ok(),
            None => false,
        }
    }
}
