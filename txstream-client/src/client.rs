/// txstream gRPC client implementation
use crate::config::ClientConfig;
use crate::transaction::Transaction;
use crossbeam::atomic::AtomicCell;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::transport::Endpoint;
use tracing::{debug, info};
use txstream_core::{BidirectionalStream, DuplexChannel, Error, RequestTransmitter, Result};
use txstream_proto::transaction::{Options, Type};
use txstream_proto::TransactorClient;

/// txstream remote client
///
/// One connection shared by every transaction. Each transaction gets its own
/// bidirectional call; all of them are batched by the same transmitter.
pub struct Client {
    transactor: TransactorClient,
    transmitter: RequestTransmitter,
    latency: LatencyTracker,
}

impl Client {
    /// Connect to a txstream server
    ///
    /// # Arguments
    /// * `addr` - Server address (e.g., "http://127.0.0.1:1729")
    /// * `config` - Batching and connection settings
    ///
    /// # Example
    /// ```no_run
    /// # use txstream_client::{Client, ClientConfig};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = Client::connect("http://localhost:1729", ClientConfig::default()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(addr: impl Into<String>, config: ClientConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidConfig)?;

        let addr = addr.into();
        let channel = Endpoint::from_shared(addr.clone())
            .map_err(|e| Error::Connection(format!("Invalid address: {}", e)))?
            .connect_timeout(config.connect_timeout)
            .connect()
            .await
            .map_err(|e| Error::Connection(format!("Failed to connect: {}", e)))?;

        let transmitter = RequestTransmitter::new(config.transmitter)?;
        info!(%addr, "Connected to txstream server");

        Ok(Self {
            transactor: TransactorClient::new(channel),
            transmitter,
            latency: LatencyTracker::new(Duration::ZERO),
        })
    }

    /// Start a bidirectional transaction call.
    pub async fn open_channel(&self) -> Result<DuplexChannel> {
        if !self.transmitter.is_open() {
            return Err(Error::ClientClosed);
        }

        let (outbound, requests) = mpsc::unbounded_channel();
        let response = self
            .transactor
            .clone()
            .transaction(UnboundedReceiverStream::new(requests))
            .await?;

        Ok(DuplexChannel::new(outbound, response.into_inner().boxed()))
    }

    /// Open a transaction in `session_id`.
    pub async fn transaction(
        &self,
        session_id: Vec<u8>,
        transaction_type: Type,
        options: Options,
    ) -> Result<Transaction> {
        let channel = self.open_channel().await?;
        let stream = BidirectionalStream::new(channel, &self.transmitter)?;

        let transaction = Transaction::open(
            stream,
            session_id,
            transaction_type,
            options,
            self.latency.current(),
        )
        .await?;
        self.latency.update(transaction.network_latency());
        Ok(transaction)
    }

    /// Current network latency estimate
    pub fn network_latency(&self) -> Duration {
        self.latency.current()
    }

    pub fn is_open(&self) -> bool {
        self.transmitter.is_open()
    }

    /// Close the client. Every open transaction stops accepting requests.
    pub fn close(&self) {
        debug!(
            dispatchers = self.transmitter.active_dispatchers(),
            "Closing client"
        );
        self.transmitter.close();
    }
}

/// Running estimate of the network latency, refined by every open.
///
/// Each measurement is averaged with the previous estimate, so the newest
/// sample carries as much weight as all earlier ones together.
#[derive(Debug)]
pub(crate) struct LatencyTracker {
    millis: AtomicCell<u64>,
}

impl LatencyTracker {
    pub(crate) fn new(initial: Duration) -> Self {
        Self {
            millis: AtomicCell::new(initial.as_millis() as u64),
        }
    }

    pub(crate) fn update(&self, measured: Duration) {
        let measured = measured.as_millis() as u64;
        self.millis
            .fetch_update(|previous| Some((previous + measured) / 2))
            .ok();
    }

    pub(crate) fn current(&self) -> Duration {
        Duration::from_millis(self.millis.load())
    }
}
