/// Response queue and collector integration tests
///
/// Covers delivery across tasks, per-id isolation under concurrent producers,
/// and the terminal behaviour every waiting caller relies on.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use txstream_core::{Error, RequestId, ResponseCollector, ResponseQueue};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_k_puts_then_close(values in prop::collection::vec(any::<u32>(), 0..50), fail in any::<bool>()) {
        let terminal = if fail { Some(Error::ClientClosed) } else { None };
        let expected_error = terminal.clone().unwrap_or(Error::TransactionClosed);

        let (taken, errors) = block_on(async {
            let queue = ResponseQueue::new();
            for value in &values {
                queue.put(*value);
            }
            queue.close(terminal);

            let mut taken = Vec::new();
            for _ in 0..values.len() {
                taken.push(queue.take().await.unwrap());
            }
            // Terminal error re-delivered without blocking
            let errors = tokio::time::timeout(Duration::from_secs(1), async {
                vec![queue.take().await, queue.take().await, queue.take().await]
            })
            .await
            .unwrap();
            (taken, errors)
        });

        prop_assert_eq!(taken, values);
        for error in errors {
            prop_assert_eq!(error, Err(expected_error.clone()));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_stay_isolated() {
    let collector = Arc::new(ResponseCollector::new());
    let ids: Vec<RequestId> = (0..8).map(|_| RequestId::generate()).collect();
    let queues: Vec<_> = ids.iter().map(|id| collector.queue(*id).unwrap()).collect();

    let mut handles = vec![];
    for (n, id) in ids.iter().enumerate() {
        let collector = Arc::clone(&collector);
        let id = *id;
        handles.push(tokio::spawn(async move {
            for i in 0..100 {
                collector.collect(id, (n, i)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for (n, queue) in queues.iter().enumerate() {
        for i in 0..100 {
            assert_eq!(queue.take().await.unwrap(), (n, i));
        }
        assert!(queue.is_empty());
    }
}

#[tokio::test]
async fn test_waiting_consumer_woken_by_producer_task() {
    let queue = Arc::new(ResponseQueue::new());

    let consumer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.take().await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    queue.put("late");

    assert_eq!(consumer.await.unwrap(), Ok("late"));
}

#[tokio::test]
async fn test_close_wakes_every_waiting_request() {
    let collector: Arc<ResponseCollector<u32>> = Arc::new(ResponseCollector::new());
    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let queue = collector.queue(RequestId::generate()).unwrap();
            tokio::spawn(async move { queue.take().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let error = Error::IllegalServerMessage("garbage".to_string());
    collector.close(Some(error.clone()));

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Err(error.clone()));
    }
    assert_eq!(collector.pending(), 0);
}

#[tokio::test]
async fn test_unknown_id_after_completion() {
    let collector = ResponseCollector::new();
    let id = RequestId::generate();
    let queue = collector.queue(id).unwrap();

    collector.collect_final(id, 1u32).unwrap();
    assert_eq!(queue.take().await, Ok(1));
    assert_eq!(collector.collect(id, 2), Err(Error::UnknownRequestId(id)));
}
