//! Transaction facade
//!
//! Typed operations over one bidirectional stream. Each method builds a
//! request envelope, hands it to the stream and checks the shape of the
//! response it gets back.

use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use txstream_core::{BidirectionalStream, Error, Result};
use txstream_proto::transaction::{
    self, commit, open, query, req, res, res_part, rollback, Options, Type,
};

/// Stream of raw query answers
pub type AnswerStream = BoxStream<'static, Result<Vec<u8>>>;

pub struct Transaction {
    stream: BidirectionalStream,
    transaction_type: Type,
    network_latency: Duration,
}

impl Transaction {
    /// Open a transaction on `stream`.
    ///
    /// `latency_estimate` is the caller's current view of the network latency,
    /// forwarded to the server. The open request bypasses batching.
    pub async fn open(
        stream: BidirectionalStream,
        session_id: Vec<u8>,
        transaction_type: Type,
        options: Options,
        latency_estimate: Duration,
    ) -> Result<Self> {
        let request = envelope(req::Req::OpenReq(open::Req {
            session_id,
            r#type: transaction_type as i32,
            options: Some(options),
            network_latency_millis: millis(latency_estimate),
        }));

        let start = Instant::now();
        let response = stream.single(request, false)?.get().await?;
        let server_duration = match response.res {
            Some(res::Res::OpenRes(open)) => {
                Duration::from_millis(open.server_duration_millis.max(0) as u64)
            }
            other => return Err(unexpected("open", &other)),
        };
        let network_latency = start.elapsed().saturating_sub(server_duration);

        debug!(
            ?transaction_type,
            latency_ms = network_latency.as_millis() as u64,
            "Opened transaction"
        );
        Ok(Self {
            stream,
            transaction_type,
            network_latency,
        })
    }

    pub fn transaction_type(&self) -> Type {
        self.transaction_type
    }

    /// Round trip of the open request minus the time the server spent on it
    pub fn network_latency(&self) -> Duration {
        self.network_latency
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_open()
    }

    /// Run a query whose answers arrive in pages. Answers of every page are
    /// flattened into one stream, which ends after the first error.
    pub fn query(&self, text: impl Into<String>, options: Options) -> Result<AnswerStream> {
        let parts = self.stream.stream(query_request(text.into(), options))?;

        let answers = parts.into_stream().flat_map(|part| {
            let answers: Vec<Result<Vec<u8>>> = match part {
                Ok(transaction::ResPart {
                    res: Some(res_part::Res::QueryResPart(page)),
                    ..
                }) => page.answers.into_iter().map(Ok).collect(),
                Ok(other) => vec![Err(unexpected("query part", &other.res))],
                Err(e) => vec![Err(e)],
            };
            stream::iter(answers)
        });
        Ok(answers.boxed())
    }

    /// Run a query with exactly one answer
    pub async fn query_single(&self, text: impl Into<String>, options: Options) -> Result<Vec<u8>> {
        let single = self.stream.single(query_request(text.into(), options), true)?;
        match single.get().await?.res {
            Some(res::Res::QueryRes(query::Res { answer })) => Ok(answer),
            other => Err(unexpected("query", &other)),
        }
    }

    /// Commit and close the transaction.
    pub async fn commit(&self) -> Result<()> {
        let single = self
            .stream
            .single(envelope(req::Req::CommitReq(commit::Req {})), true)?;
        let result = match single.get().await?.res {
            Some(res::Res::CommitRes(_)) => Ok(()),
            other => Err(unexpected("commit", &other)),
        };
        self.stream.close(None);
        result
    }

    /// Roll back every change made so far. The transaction stays open.
    pub async fn rollback(&self) -> Result<()> {
        let single = self
            .stream
            .single(envelope(req::Req::RollbackReq(rollback::Req {})), true)?;
        match single.get().await?.res {
            Some(res::Res::RollbackRes(_)) => Ok(()),
            other => Err(unexpected("rollback", &other)),
        }
    }

    pub fn close(&self) {
        self.stream.close(None);
    }
}

fn envelope(request: req::Req) -> transaction::Req {
    transaction::Req {
        req_id: Vec::new(),
        metadata: HashMap::new(),
        req: Some(request),
    }
}

fn query_request(query: String, options: Options) -> transaction::Req {
    envelope(req::Req::QueryReq(query::Req {
        query,
        options: Some(options),
    }))
}

fn unexpected(expected: &str, got: &impl std::fmt::Debug) -> Error {
    Error::UnexpectedResponse(format!("expected {} result, got {:?}", expected, got))
}

fn millis(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use txstream_core::{loopback, LoopbackServer, RequestTransmitter, TransmitterConfig};
    use txstream_proto::transaction::server;

    fn respond(server: &LoopbackServer, req_id: Vec<u8>, result: res::Res) {
        server.send(transaction::Server {
            server: Some(server::Server::Res(transaction::Res {
                req_id,
                res: Some(result),
            })),
        });
    }

    async fn opened(transmitter: &RequestTransmitter) -> (Transaction, LoopbackServer) {
        let (channel, mut server) = loopback();
        let stream = BidirectionalStream::new(channel, transmitter).unwrap();

        let opening = tokio::spawn(Transaction::open(
            stream,
            b"session".to_vec(),
            Type::Write,
            Options::default(),
            Duration::from_millis(7),
        ));
        let frame = server.recv().await.unwrap();
        match &frame.reqs[0].req {
            Some(req::Req::OpenReq(request)) => {
                assert_eq!(request.session_id, b"session");
                assert_eq!(request.r#type, Type::Write as i32);
                assert_eq!(request.network_latency_millis, 7);
            }
            other => panic!("expected open request, got {other:?}"),
        }
        respond(
            &server,
            frame.reqs[0].req_id.clone(),
            res::Res::OpenRes(open::Res {
                server_duration_millis: 0,
            }),
        );
        (opening.await.unwrap().unwrap(), server)
    }

    #[tokio::test]
    async fn test_open_and_commit_closes() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default()).unwrap();
        let (tx, mut server) = opened(&transmitter).await;
        assert!(tx.is_open());
        assert_eq!(tx.transaction_type(), Type::Write);

        let committing = tokio::spawn(async move {
            let result = tx.commit().await;
            (result, tx.is_open())
        });
        let frame = server.recv().await.unwrap();
        assert!(matches!(frame.reqs[0].req, Some(req::Req::CommitReq(_))));
        respond(
            &server,
            frame.reqs[0].req_id.clone(),
            res::Res::CommitRes(commit::Res {}),
        );

        let (result, still_open) = committing.await.unwrap();
        assert!(result.is_ok());
        assert!(!still_open);
        assert!(server.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_rollback_keeps_transaction_open() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default()).unwrap();
        let (tx, mut server) = opened(&transmitter).await;

        let rolling_back = tokio::spawn(async move {
            let result = tx.rollback().await;
            (result, tx)
        });
        let frame = server.recv().await.unwrap();
        respond(
            &server,
            frame.reqs[0].req_id.clone(),
            res::Res::RollbackRes(rollback::Res {}),
        );

        let (result, tx) = rolling_back.await.unwrap();
        assert!(result.is_ok());
        assert!(tx.is_open());
    }

    #[tokio::test]
    async fn test_wrong_result_kind_is_unexpected() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default()).unwrap();
        let (tx, mut server) = opened(&transmitter).await;

        let rolling_back = tokio::spawn(async move { tx.rollback().await });
        let frame = server.recv().await.unwrap();
        respond(
            &server,
            frame.reqs[0].req_id.clone(),
            res::Res::CommitRes(commit::Res {}),
        );

        assert!(matches!(
            rolling_back.await.unwrap(),
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_query_single() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default()).unwrap();
        let (tx, mut server) = opened(&transmitter).await;

        let pending = tokio::spawn(async move { tx.query_single("count", Options::default()).await });
        let frame = server.recv().await.unwrap();
        match &frame.reqs[0].req {
            Some(req::Req::QueryReq(q)) => assert_eq!(q.query, "count"),
            other => panic!("expected query request, got {other:?}"),
        }
        respond(
            &server,
            frame.reqs[0].req_id.clone(),
            res::Res::QueryRes(query::Res {
                answer: b"42".to_vec(),
            }),
        );

        assert_eq!(pending.await.unwrap().unwrap(), b"42");
    }

    #[tokio::test]
    async fn test_close_fails_later_operations() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default()).unwrap();
        let (tx, _server) = opened(&transmitter).await;

        tx.close();
        assert!(!tx.is_open());
        assert!(matches!(
            tx.query("match", Options::default()),
            Err(Error::TransactionClosed)
        ));
        assert_eq!(tx.commit().await, Err(Error::TransactionClosed));
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(12)), 12);
        assert_eq!(millis(Duration::from_secs(u64::MAX / 1000)), i32::MAX);
    }
}
