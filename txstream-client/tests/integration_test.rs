/// Integration tests for the txstream client
///
/// Connection errors surface as `Connection`, and a transaction driven through
/// the public facade behaves the same over any duplex channel.

use std::time::Duration;
use txstream_client::{Client, ClientConfig, Error, Options, Transaction, Type};
use txstream_core::{loopback, BidirectionalStream, RequestTransmitter};
use txstream_proto::transaction::{self, open, req, res, server};

#[tokio::test]
async fn test_connect_refused() {
    // Nothing listens on port 1
    let config = ClientConfig::new().with_connect_timeout(Duration::from_secs(2));
    let result = Client::connect("http://127.0.0.1:1", config).await;

    match result {
        Err(Error::Connection(msg)) => assert!(msg.starts_with("Failed to connect")),
        Err(other) => panic!("expected a connection error, got {}", other),
        Ok(_) => panic!("connected to a closed port"),
    }
}

#[tokio::test]
async fn test_open_failure_reports_server_status() {
    let config = ClientConfig::default();
    let transmitter = RequestTransmitter::new(config.transmitter).unwrap();
    let (channel, mut server) = loopback();
    let stream = BidirectionalStream::new(channel, &transmitter).unwrap();

    let opening = tokio::spawn(Transaction::open(
        stream,
        b"missing-session".to_vec(),
        Type::Read,
        Options::default(),
        Duration::ZERO,
    ));
    let frame = server.recv().await.unwrap();
    assert!(matches!(frame.reqs[0].req, Some(req::Req::OpenReq(_))));
    server.fail(tonic::Status::not_found("session does not exist"));

    match opening.await.unwrap() {
        Err(Error::Rpc { code, message }) => {
            assert_eq!(code, tonic::Code::NotFound);
            assert_eq!(message, "session does not exist");
        }
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("transaction opened on a failed call"),
    }
}

#[tokio::test]
async fn test_open_discounts_server_time() {
    let transmitter = RequestTransmitter::new(Default::default()).unwrap();
    let (channel, mut server) = loopback();
    let stream = BidirectionalStream::new(channel, &transmitter).unwrap();

    let opening = tokio::spawn(Transaction::open(
        stream,
        b"session".to_vec(),
        Type::Read,
        Options::default(),
        Duration::ZERO,
    ));
    let frame = server.recv().await.unwrap();

    // Server claims more time than the whole round trip can have taken
    server.send(transaction::Server {
        server: Some(server::Server::Res(transaction::Res {
            req_id: frame.reqs[0].req_id.clone(),
            res: Some(res::Res::OpenRes(open::Res {
                server_duration_millis: 60_000,
            })),
        })),
    });

    let transaction = opening.await.unwrap().unwrap();
    assert_eq!(transaction.network_latency(), Duration::ZERO);
    assert_eq!(transaction.transaction_type(), Type::Read);
}
