//! Bidirectional transaction stream
//!
//! Binds one duplex channel to a dispatcher (outbound) and two response
//! collectors (inbound): one for single-shot responses and one for the parts
//! of paginated responses. A listener task demultiplexes server frames by
//! request id. Any failure that breaks correlation tears the whole stream
//! down, failing every request still in flight.

use crate::channel::{DuplexChannel, InboundStream};
use crate::collector::ResponseCollector;
use crate::iterator::ResponsePartIterator;
use crate::metrics::{OPEN_STREAMS, PROTOCOL_ERRORS_TOTAL, STREAM_CLOSURES_TOTAL};
use crate::queue::ResponseQueue;
use crate::transmitter::{Dispatcher, RequestTransmitter};
use crate::types::RequestId;
use crate::{Error, Result};
use crossbeam::atomic::AtomicCell;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use txstream_proto::transaction::{self, server::Server};

pub struct BidirectionalStream {
    shared: Arc<StreamShared>,
    listener: JoinHandle<()>,
}

struct StreamShared {
    res_collector: Arc<ResponseCollector<transaction::Res>>,
    res_part_collector: Arc<ResponseCollector<transaction::ResPart>>,
    dispatcher: Dispatcher,
    is_open: AtomicCell<bool>,
}

impl BidirectionalStream {
    /// Take ownership of `channel`: its write side goes to a new dispatcher of
    /// `transmitter`, its read side to a listener task on the transmitter's
    /// runtime.
    pub fn new(channel: DuplexChannel, transmitter: &RequestTransmitter) -> Result<Self> {
        let DuplexChannel { outbound, inbound } = channel;
        let dispatcher = transmitter.dispatcher(outbound)?;

        let shared = Arc::new(StreamShared {
            res_collector: Arc::new(ResponseCollector::new()),
            res_part_collector: Arc::new(ResponseCollector::new()),
            dispatcher,
            is_open: AtomicCell::new(true),
        });
        OPEN_STREAMS.inc();

        let listener = transmitter
            .runtime()
            .spawn(listen(inbound, Arc::clone(&shared)));
        Ok(Self { shared, listener })
    }

    /// Send a request expecting exactly one response.
    ///
    /// With `batch` the request waits for the next timed flush; without it the
    /// request is written before this returns.
    pub fn single(&self, mut request: transaction::Req, batch: bool) -> Result<Single> {
        if !self.is_open() {
            return Err(Error::TransactionClosed);
        }
        let request_id = RequestId::generate();
        request.req_id = request_id.to_bytes();

        let queue = self.shared.res_collector.queue(request_id)?;
        let dispatched = if batch {
            self.shared.dispatcher.dispatch(request)
        } else {
            self.shared.dispatcher.dispatch_now(request)
        };
        if let Err(e) = dispatched {
            self.shared.res_collector.remove(&request_id);
            return Err(e);
        }

        Ok(Single { request_id, queue })
    }

    /// Send a request whose response arrives in parts. Always batched.
    pub fn stream(&self, mut request: transaction::Req) -> Result<ResponsePartIterator> {
        if !self.is_open() {
            return Err(Error::TransactionClosed);
        }
        let request_id = RequestId::generate();
        request.req_id = request_id.to_bytes();

        let queue = self.shared.res_part_collector.queue(request_id)?;
        if let Err(e) = self.shared.dispatcher.dispatch(request) {
            self.shared.res_part_collector.remove(&request_id);
            return Err(e);
        }

        Ok(ResponsePartIterator::new(
            request_id,
            queue,
            Arc::clone(&self.shared.res_part_collector),
            self.shared.dispatcher.clone(),
        ))
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open.load()
    }

    /// Close the stream. Every request still waiting fails with `error`, or
    /// with `TransactionClosed` when no error is given.
    pub fn close(&self, error: Option<Error>) {
        self.shared.close(error);
    }
}

impl Drop for BidirectionalStream {
    fn drop(&mut self) {
        self.shared.close(None);
        self.listener.abort();
    }
}

/// Pending single-shot response
pub struct Single {
    request_id: RequestId,
    queue: Arc<ResponseQueue<transaction::Res>>,
}

impl Single {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Wait for the response
    pub async fn get(self) -> Result<transaction::Res> {
        let res = self.queue.take().await?;
        if res.res.is_none() {
            return Err(Error::MissingResponse(self.request_id));
        }
        Ok(res)
    }
}

impl StreamShared {
    fn close(&self, error: Option<Error>) {
        if !self.is_open.swap(false) {
            return;
        }

        let reason = match &error {
            None => "closed",
            Some(e) if matches!(e, Error::Rpc { .. }) => "channel_error",
            Some(_) => "protocol_error",
        };
        STREAM_CLOSURES_TOTAL.with_label_values(&[reason]).inc();
        OPEN_STREAMS.dec();
        debug!(reason, "Closing transaction stream");

        self.res_collector.close(error.clone());
        self.res_part_collector.close(error);
        self.dispatcher.close();
    }

    fn collect(&self, message: transaction::Server) -> Result<()> {
        match message.server {
            Some(Server::Res(res)) => {
                let request_id = RequestId::from_bytes(&res.req_id)?;
                self.res_collector.collect_final(request_id, res)
            }
            Some(Server::ResPart(res_part)) => {
                let request_id = RequestId::from_bytes(&res_part.req_id)?;
                self.res_part_collector.collect(request_id, res_part)
            }
            None => Err(Error::IllegalServerMessage(
                "server frame carries neither a response nor a response part".to_string(),
            )),
        }
    }
}

async fn listen(mut inbound: InboundStream, shared: Arc<StreamShared>) {
    loop {
        let next = tokio::select! {
            next = inbound.next() => next,
            _ = shared.dispatcher.write_failed() => {
                warn!("Channel write side is gone, closing transaction stream");
                break shared.close(Some(Error::TransactionClosed));
            }
        };
        match next {
            Some(Ok(message)) => {
                if !shared.is_open.load() {
                    break;
                }
                if let Err(e) = shared.collect(message) {
                    error!(error = %e, "Lost request correlation, closing transaction stream");
                    match &e {
                        Error::InvalidRequestId(_) => PROTOCOL_ERRORS_TOTAL
                            .with_label_values(&["invalid_request_id"])
                            .inc(),
                        Error::IllegalServerMessage(_) => PROTOCOL_ERRORS_TOTAL
                            .with_label_values(&["illegal_server_message"])
                            .inc(),
                        _ => {}
                    }
                    break shared.close(Some(e));
                }
            }
            Some(Err(status)) => {
                warn!(code = ?status.code(), message = status.message(), "Transaction stream failed");
                break shared.close(Some(status.into()));
            }
            None => {
                debug!("Server ended the transaction stream");
                break shared.close(None);
            }
        }
    }
}
