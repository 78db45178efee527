//! Response queue
//!
//! Unbounded FIFO between the task that receives server frames and the caller
//! waiting for a response. The producer side never blocks and never fails;
//! failures are only observed by the consumer, through `take`.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

struct State<T> {
    responses: VecDeque<T>,
    /// Terminal condition, set by the first `close`. Re-delivered to every
    /// `take` once `responses` is drained.
    done: Option<Error>,
}

/// Async-blocking queue of responses terminated by a single `Done` marker.
///
/// Intended for one consumer: `take` may be called from one task at a time.
pub struct ResponseQueue<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

impl<T> ResponseQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                responses: VecDeque::new(),
                done: None,
            }),
            notify: Notify::new(),
        }
    }

    /// Append a response. Ignored once the queue is done.
    pub fn put(&self, value: T) {
        {
            let mut state = self.state.lock();
            if state.done.is_some() {
                return;
            }
            state.responses.push_back(value);
        }
        self.notify.notify_one();
    }

    /// Append the terminal marker. `None` means a normal close, reported to
    /// the consumer as `TransactionClosed`. Only the first close counts.
    pub fn close(&self, error: Option<Error>) {
        {
            let mut state = self.state.lock();
            if state.done.is_some() {
                return;
            }
            state.done = Some(error.unwrap_or(Error::TransactionClosed));
        }
        self.notify.notify_one();
    }

    /// Wait for the next response.
    ///
    /// Responses put before the close are returned first; after that, this and
    /// every later call fails with the terminal error without waiting.
    pub async fn take(&self) -> Result<T> {
        loop {
            if let Some(result) = self.try_take() {
                return result;
            }
            // A notify_one without a waiter stores a permit, so a put landing
            // between try_take and here is not lost.
            self.notify.notified().await;
        }
    }

    /// Non-blocking `take`: `None` when nothing has arrived yet.
    pub fn try_take(&self) -> Option<Result<T>> {
        let mut state = self.state.lock();
        if let Some(value) = state.responses.pop_front() {
            return Some(Ok(value));
        }
        state.done.clone().map(Err)
    }

    /// Number of responses waiting to be taken
    pub fn len(&self) -> usize {
        self.state.lock().responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once `close` has been called
    pub fn is_done(&self) -> bool {
        self.state.lock().done.is_some()
    }
}

impl<T> Default for ResponseQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = ResponseQueue::new();
        queue.put(1);
        queue.put(2);
        queue.put(3);

        assert_eq!(queue.take().await.unwrap(), 1);
        assert_eq!(queue.take().await.unwrap(), 2);
        assert_eq!(queue.take().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_k_takes_then_terminal_error() {
        let queue = ResponseQueue::new();
        for i in 0..5 {
            queue.put(i);
        }
        queue.close(None);

        for i in 0..5 {
            assert_eq!(queue.take().await.unwrap(), i);
        }
        for _ in 0..3 {
            assert_eq!(queue.take().await, Err(Error::TransactionClosed));
        }
    }

    #[tokio::test]
    async fn test_close_with_error_is_redelivered() {
        let queue: ResponseQueue<u32> = ResponseQueue::new();
        let error = Error::Rpc {
            code: tonic::Code::Unavailable,
            message: "gone".to_string(),
        };
        queue.close(Some(error.clone()));

        assert_eq!(queue.take().await, Err(error.clone()));
        assert_eq!(queue.take().await, Err(error));
    }

    #[tokio::test]
    async fn test_only_first_close_counts() {
        let queue: ResponseQueue<u32> = ResponseQueue::new();
        queue.close(None);
        queue.close(Some(Error::ClientClosed));

        assert_eq!(queue.take().await, Err(Error::TransactionClosed));
    }

    #[tokio::test]
    async fn test_put_after_close_is_ignored() {
        let queue = ResponseQueue::new();
        queue.close(None);
        queue.put(7);

        assert!(queue.is_empty());
        assert_eq!(queue.take().await, Err(Error::TransactionClosed));
    }

    #[tokio::test]
    async fn test_take_waits_for_put() {
        let queue = Arc::new(ResponseQueue::new());
        let consumer = Arc::clone(&queue);

        let handle = tokio::spawn(async move { consumer.take().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        queue.put("hello");
        let value = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_take_wakes_on_close() {
        let queue: Arc<ResponseQueue<u32>> = Arc::new(ResponseQueue::new());
        let consumer = Arc::clone(&queue);

        let handle = tokio::spawn(async move { consumer.take().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close(None);

        let value = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, Err(Error::TransactionClosed));
    }

    #[test]
    fn test_try_take() {
        let queue = ResponseQueue::new();
        assert!(queue.try_take().is_none());
        queue.put(1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.try_take(), Some(Ok(1)));
        assert!(!queue.is_done());
        queue.close(None);
        assert!(queue.is_done());
        assert_eq!(queue.try_take(), Some(Err(Error::TransactionClosed)));
    }
}
