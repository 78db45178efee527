//! Response part iterator
//!
//! Consumes the parts of one paginated exchange. The server pauses after each
//! page with a `Continue` marker; the iterator answers it with a stream
//! request under the same request id and keeps reading, so the caller only
//! ever sees the data parts. A `Done` marker ends the exchange.

use crate::collector::ResponseCollector;
use crate::queue::ResponseQueue;
use crate::transmitter::Dispatcher;
use crate::types::RequestId;
use crate::{Error, Result};
use futures::stream::{self, BoxStream};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;
use txstream_proto::transaction::{self, req, res_part, stream::res_part::State};

pub struct ResponsePartIterator {
    request_id: RequestId,
    queue: Arc<ResponseQueue<transaction::ResPart>>,
    collector: Arc<ResponseCollector<transaction::ResPart>>,
    dispatcher: Dispatcher,
    done: bool,
    /// Set once the exchange failed; repeated on every later call
    terminal: Option<Error>,
}

impl ResponsePartIterator {
    pub(crate) fn new(
        request_id: RequestId,
        queue: Arc<ResponseQueue<transaction::ResPart>>,
        collector: Arc<ResponseCollector<transaction::ResPart>>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            request_id,
            queue,
            collector,
            dispatcher,
            done: false,
            terminal: None,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Next data part, `None` once the server reported the exchange done.
    ///
    /// After an error (channel failure, close, malformed part) every later
    /// call returns the same error; the exchange cannot make progress.
    pub async fn next(&mut self) -> Option<Result<transaction::ResPart>> {
        loop {
            if self.done {
                return None;
            }
            if let Some(error) = &self.terminal {
                return Some(Err(error.clone()));
            }

            let part = match self.queue.take().await {
                Ok(part) => part,
                Err(e) => return Some(Err(self.fail(e))),
            };

            match &part.res {
                Some(res_part::Res::StreamResPart(marker)) => match State::try_from(marker.state) {
                    Ok(State::Done) => {
                        trace!(request_id = %self.request_id, "Response stream done");
                        self.done = true;
                        self.collector.remove(&self.request_id);
                    }
                    Ok(State::Continue) => {
                        trace!(request_id = %self.request_id, "Requesting next page");
                        if let Err(e) = self.dispatcher.dispatch(self.continue_request()) {
                            return Some(Err(self.fail(e)));
                        }
                    }
                    Err(_) => {
                        let error = Error::IllegalServerMessage(format!(
                            "unknown response stream state {}",
                            marker.state
                        ));
                        return Some(Err(self.fail(error)));
                    }
                },
                Some(_) => return Some(Ok(part)),
                None => return Some(Err(self.fail(Error::MissingResponse(self.request_id)))),
            }
        }
    }

    /// Record `error` as terminal and release the request id.
    fn fail(&mut self, error: Error) -> Error {
        self.collector.remove(&self.request_id);
        self.terminal = Some(error.clone());
        error
    }

    /// Adapt into a `Stream` of data parts. The stream ends after the first
    /// error it yields.
    pub fn into_stream(self) -> BoxStream<'static, Result<transaction::ResPart>> {
        Box::pin(stream::unfold(Some(self), |state| async move {
            let mut iter = state?;
            match iter.next().await? {
                Ok(part) => Some((Ok(part), Some(iter))),
                Err(e) => Some((Err(e), None)),
            }
        }))
    }

    fn continue_request(&self) -> transaction::Req {
        transaction::Req {
            req_id: self.request_id.to_bytes(),
            metadata: HashMap::new(),
            req: Some(req::Req::StreamReq(transaction::stream::Req {})),
        }
    }
}
