/// Test utilities and helpers for txstream testing
///
/// Provides a scripted server over an in-process loopback channel, request
/// builders, and an echo server that answers every request kind.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::task::JoinHandle;
use tonic::Status;
use tracing::debug;
use txstream_core::{
    loopback, BidirectionalStream, LoopbackServer, RequestTransmitter, TransmitterConfig,
};
use txstream_proto::transaction::{
    self, commit, open, query, req, res, res_part, rollback, server, stream, Options, Type,
};

/// How long the scripted server waits for a client frame before failing the test
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A transmitter, one stream bound to it, and the server end of the stream's channel
pub struct TestStream {
    pub transmitter: RequestTransmitter,
    pub stream: BidirectionalStream,
    pub server: ScriptedServer,
}

impl TestStream {
    /// Create a test stream with default batching. Must run inside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_config(TransmitterConfig::default())
    }

    pub fn with_config(config: TransmitterConfig) -> Self {
        let transmitter = RequestTransmitter::new(config).expect("Failed to create transmitter");
        let (channel, server) = loopback();
        let stream =
            BidirectionalStream::new(channel, &transmitter).expect("Failed to create stream");

        Self {
            transmitter,
            stream,
            server: ScriptedServer::new(server),
        }
    }
}

impl Default for TestStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Server end driven step by step from a test
pub struct ScriptedServer {
    inner: LoopbackServer,
    pending: VecDeque<transaction::Req>,
    frames: usize,
}

impl ScriptedServer {
    pub fn new(inner: LoopbackServer) -> Self {
        Self {
            inner,
            pending: VecDeque::new(),
            frames: 0,
        }
    }

    /// Wait for the next client frame. Panics after `RECV_TIMEOUT`.
    pub async fn next_frame(&mut self) -> transaction::Client {
        let frame = tokio::time::timeout(RECV_TIMEOUT, self.inner.recv())
            .await
            .expect("Timed out waiting for a client frame")
            .expect("Client closed its write side");
        self.frames += 1;
        frame
    }

    /// Next client frame if one has already been written
    pub fn try_next_frame(&mut self) -> Option<transaction::Client> {
        let frame = self.inner.try_recv()?;
        self.frames += 1;
        Some(frame)
    }

    /// Next request, reading a new frame only when the last one is used up
    pub async fn next_request(&mut self) -> transaction::Req {
        if self.pending.is_empty() {
            let frame = self.next_frame().await;
            self.pending.extend(frame.reqs);
        }
        self.pending
            .pop_front()
            .expect("Client wrote an empty frame")
    }

    /// Wait for the client to end its write side
    pub async fn expect_closed(&mut self) {
        let next = tokio::time::timeout(RECV_TIMEOUT, self.inner.recv())
            .await
            .expect("Timed out waiting for the client to close");
        assert!(next.is_none(), "Expected end of stream, got {:?}", next);
    }

    /// Number of frames received so far
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn respond(&self, req_id: &[u8], result: res::Res) {
        self.send_res(req_id, Some(result));
    }

    /// Answer with an envelope that carries no result
    pub fn respond_empty(&self, req_id: &[u8]) {
        self.send_res(req_id, None);
    }

    pub fn send_answers(&self, req_id: &[u8], answers: &[&[u8]]) {
        self.send_part(
            req_id,
            Some(res_part::Res::QueryResPart(query::ResPart {
                answers: answers.iter().map(|a| a.to_vec()).collect(),
            })),
        );
    }

    pub fn send_continue(&self, req_id: &[u8]) {
        self.send_state(req_id, stream::res_part::State::Continue);
    }

    pub fn send_done(&self, req_id: &[u8]) {
        self.send_state(req_id, stream::res_part::State::Done);
    }

    /// Terminate the call with an error status
    pub fn fail(&mut self, status: Status) {
        self.inner.fail(status);
    }

    /// Complete the call normally
    pub fn finish(&mut self) {
        self.inner.finish();
    }

    fn send_state(&self, req_id: &[u8], state: stream::res_part::State) {
        self.send_part(
            req_id,
            Some(res_part::Res::StreamResPart(stream::ResPart {
                state: state as i32,
            })),
        );
    }

    fn send_res(&self, req_id: &[u8], result: Option<res::Res>) {
        self.inner.send(transaction::Server {
            server: Some(server::Server::Res(transaction::Res {
                req_id: req_id.to_vec(),
                res: result,
            })),
        });
    }

    fn send_part(&self, req_id: &[u8], part: Option<res_part::Res>) {
        self.inner.send(transaction::Server {
            server: Some(server::Server::ResPart(transaction::ResPart {
                req_id: req_id.to_vec(),
                res: part,
            })),
        });
    }
}

/// Build a request envelope without an id; the stream assigns one.
pub fn request(payload: req::Req) -> transaction::Req {
    transaction::Req {
        req_id: Vec::new(),
        metadata: HashMap::new(),
        req: Some(payload),
    }
}

pub fn open_request(session_id: &[u8], transaction_type: Type) -> transaction::Req {
    request(req::Req::OpenReq(open::Req {
        session_id: session_id.to_vec(),
        r#type: transaction_type as i32,
        options: Some(Options::default()),
        network_latency_millis: 0,
    }))
}

pub fn commit_request() -> transaction::Req {
    request(req::Req::CommitReq(commit::Req {}))
}

pub fn rollback_request() -> transaction::Req {
    request(req::Req::RollbackReq(rollback::Req {}))
}

pub fn query_request(text: &str) -> transaction::Req {
    request(req::Req::QueryReq(query::Req {
        query: text.to_string(),
        options: None,
    }))
}

/// Traffic observed by an echo server
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EchoStats {
    pub frames: usize,
    pub requests: usize,
}

/// Serve `server` until the client ends its write side.
///
/// Open, commit and rollback get their matching response. A query answers with
/// `pages` pages of one answer each (a `Continue` between pages, `Done` after
/// the last); stream continuations advance the query to its next page.
pub fn spawn_echo_server(mut server: LoopbackServer, pages: usize) -> JoinHandle<EchoStats> {
    tokio::spawn(async move {
        let mut stats = EchoStats::default();
        let mut remaining: HashMap<Vec<u8>, usize> = HashMap::new();

        while let Some(frame) = server.recv().await {
            stats.frames += 1;
            stats.requests += frame.reqs.len();

            for request in frame.reqs {
                let req_id = request.req_id;
                let reply = |result: res::Res| transaction::Server {
                    server: Some(server::Server::Res(transaction::Res {
                        req_id: req_id.clone(),
                        res: Some(result),
                    })),
                };
                match request.req {
                    Some(req::Req::OpenReq(_)) => {
                        server.send(reply(res::Res::OpenRes(open::Res {
                            server_duration_millis: 0,
                        })));
                    }
                    Some(req::Req::CommitReq(_)) => {
                        server.send(reply(res::Res::CommitRes(commit::Res {})));
                    }
                    Some(req::Req::RollbackReq(_)) => {
                        server.send(reply(res::Res::RollbackRes(rollback::Res {})));
                    }
                    Some(req::Req::QueryReq(q)) => {
                        remaining.insert(req_id.clone(), pages);
                        send_page(&server, &mut remaining, &req_id, q.query.as_bytes());
                    }
                    Some(req::Req::StreamReq(_)) => {
                        send_page(&server, &mut remaining, &req_id, b"next");
                    }
                    None => {}
                }
            }
        }

        debug!(frames = stats.frames, requests = stats.requests, "Echo server finished");
        stats
    })
}

fn send_page(
    server: &LoopbackServer,
    remaining: &mut HashMap<Vec<u8>, usize>,
    req_id: &[u8],
    answer: &[u8],
) {
    let part = |res: res_part::Res| transaction::Server {
        server: Some(server::Server::ResPart(transaction::ResPart {
            req_id: req_id.to_vec(),
            res: Some(res),
        })),
    };
    let state = |state: stream::res_part::State| {
        part(res_part::Res::StreamResPart(stream::ResPart {
            state: state as i32,
        }))
    };

    let left = remaining.get(req_id).copied().unwrap_or(0);
    if left == 0 {
        remaining.remove(req_id);
        server.send(state(stream::res_part::State::Done));
        return;
    }

    server.send(part(res_part::Res::QueryResPart(query::ResPart {
        answers: vec![answer.to_vec()],
    })));
    if left == 1 {
        remaining.remove(req_id);
        server.send(state(stream::res_part::State::Done));
    } else {
        remaining.insert(req_id.to_vec(), left - 1);
        server.send(state(stream::res_part::State::Continue));
    }
}
