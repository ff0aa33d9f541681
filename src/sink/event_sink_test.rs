use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tonic::async_trait;
use tracing_test::traced_test;

use crate::test_utils::fast_backoff;
use crate::test_utils::recording_transport;
use crate::test_utils::TEST_QUEUE_NAME;
use crate::test_utils::TEST_ROUTING_PROPERTY;
use crate::Batch;
use crate::BatchBuilder;
use crate::BoundedBuffer;
use crate::ChangeItem;
use crate::Dispatcher;
use crate::Error;
use crate::EventSink;
use crate::FailurePolicies;
use crate::MockRoutingKeyProvider;
use crate::MockTransport;
use crate::OverflowPolicy;
use crate::RoutingKey;
use crate::RoutingKeyProvider;
use crate::SinkError;
use crate::SinkState;
use crate::StaticRoutingKey;
use crate::Transport;
use crate::TransportError;

const WAIT: Duration = Duration::from_secs(5);

fn sink_with(
    transport: impl Transport,
    routing: Arc<dyn RoutingKeyProvider>,
    capacity: usize,
    policy: OverflowPolicy,
    shutdown_signal: watch::Receiver<()>,
) -> EventSink<String> {
    let builder = BatchBuilder::new(
        Dispatcher::new(Box::new(transport), fast_backoff()),
        1024,
        TEST_QUEUE_NAME,
        TEST_ROUTING_PROPERTY,
        FailurePolicies::default(),
    );
    EventSink::new(
        Arc::new(BoundedBuffer::new(capacity, policy)),
        builder,
        routing,
        shutdown_signal,
    )
}

fn static_key(key: &str) -> Arc<dyn RoutingKeyProvider> {
    Arc::new(StaticRoutingKey::new(key))
}

fn currents(batches: &[Batch]) -> Vec<String> {
    batches
        .iter()
        .flat_map(|batch| batch.messages())
        .map(|message| {
            let body: serde_json::Value = serde_json::from_slice(message.body()).unwrap();
            body["current"].as_str().unwrap().to_string()
        })
        .collect()
}

async fn wait_for_batches(
    sent: &Arc<Mutex<Vec<Batch>>>,
    count: usize,
) {
    timeout(WAIT, async {
        while sent.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("batches were not dispatched in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocking_policy_loses_nothing_under_concurrent_producers() {
    let (transport, sent) = recording_transport();
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let sink = sink_with(transport, static_key("ns"), 4, OverflowPolicy::Block, shutdown_rx);
    let handle = sink.handle();
    let running = tokio::spawn(sink.run());

    let mut producers = Vec::new();
    for p in 0..8 {
        let handle = handle.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..50 {
                handle.update_events(Some(format!("p{p}-{i:03}")), None).await;
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    handle.close();
    timeout(WAIT, running).await.unwrap().unwrap().unwrap();

    let delivered = currents(&sent.lock());
    assert_eq!(delivered.len(), 400);
    assert_eq!(handle.dropped(), 0);
    for p in 0..8 {
        let prefix = format!("p{p}-");
        let own: Vec<&String> = delivered.iter().filter(|c| c.starts_with(&prefix)).collect();
        assert_eq!(own.len(), 50);
        assert!(own.windows(2).all(|w| w[0] < w[1]), "producer {p} reordered");
    }
}

#[tokio::test]
async fn test_close_forwards_queued_items_in_one_cycle() {
    let (transport, sent) = recording_transport();
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let sink = sink_with(transport, static_key("ns-a"), 16, OverflowPolicy::Block, shutdown_rx);
    let handle = sink.handle();

    for name in ["a", "b", "c"] {
        handle.update_events(Some(name.to_string()), None).await;
    }
    assert_eq!(handle.pending(), 3);
    handle.close();

    timeout(WAIT, sink.run()).await.unwrap().unwrap();

    let sent = sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].routing_key().as_str(), "ns-a");
    assert_eq!(currents(&sent), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_overflow_policy_forwards_most_recent_items() {
    let (transport, sent) = recording_transport();
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let sink = sink_with(transport, static_key("ns"), 2, OverflowPolicy::DropOldest, shutdown_rx);
    let handle = sink.handle();

    for i in 0..5 {
        handle.update_events(Some(format!("item-{i}")), None).await;
    }
    handle.close();
    timeout(WAIT, sink.run()).await.unwrap().unwrap();

    assert_eq!(currents(&sent.lock()), vec!["item-3", "item-4"]);
    assert_eq!(handle.dropped(), 3);
}

#[tokio::test]
async fn test_routing_key_is_resolved_once_per_cycle() {
    let (transport, sent) = recording_transport();
    let cycles = Arc::new(AtomicUsize::new(0));
    let cycles_clone = cycles.clone();
    let mut routing = MockRoutingKeyProvider::new();
    routing.expect_routing_key().times(2).returning(move || {
        RoutingKey::new(format!("key-{}", cycles_clone.fetch_add(1, Ordering::SeqCst)))
    });

    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let sink = sink_with(transport, Arc::new(routing), 16, OverflowPolicy::Block, shutdown_rx);
    let handle = sink.handle();
    let running = tokio::spawn(sink.run());

    handle.update_events(Some("first".to_string()), None).await;
    wait_for_batches(&sent, 1).await;
    handle.update_events(Some("second".to_string()), None).await;
    wait_for_batches(&sent, 2).await;
    handle.close();
    timeout(WAIT, running).await.unwrap().unwrap().unwrap();

    let keys: Vec<String> = sent.lock().iter().map(|b| b.routing_key().to_string()).collect();
    assert_eq!(keys, vec!["key-0", "key-1"]);
    assert_eq!(cycles.load(Ordering::SeqCst), 2);
}

#[tokio::test]
#[traced_test]
async fn test_shutdown_signal_stops_loop_and_closes_transport() {
    let mut transport = MockTransport::new();
    transport.expect_publish().times(0);
    transport.expect_close().times(1).returning(|| ());

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let sink = sink_with(transport, static_key("ns"), 4, OverflowPolicy::Block, shutdown_rx);
    let mut state_rx = sink.subscribe_state();

    shutdown_tx.send(()).unwrap();

    timeout(WAIT, sink.run()).await.unwrap().unwrap();
    assert_eq!(*state_rx.borrow_and_update(), SinkState::Stopped);
    assert!(logs_contain("shutdown signal received"));
    assert!(logs_contain("event sink stopped"));
}

#[tokio::test]
async fn test_dropped_shutdown_sender_stops_loop() {
    let (transport, _sent) = recording_transport();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let sink = sink_with(transport, static_key("ns"), 4, OverflowPolicy::Block, shutdown_rx);
    let running = tokio::spawn(sink.run());

    drop(shutdown_tx);

    assert!(timeout(WAIT, running).await.unwrap().unwrap().is_ok());
}

/// Holds every publish until a permit is added
struct GatedTransport {
    gate: Arc<Semaphore>,
    published: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for GatedTransport {
    async fn publish(
        &self,
        _batch: &Batch,
    ) -> std::result::Result<(), TransportError> {
        let permit = self.gate.acquire().await.map_err(|_| TransportError::Closed)?;
        permit.forget();
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {}
}

#[tokio::test]
async fn test_state_moves_through_draining_back_to_running() {
    let gate = Arc::new(Semaphore::new(0));
    let published = Arc::new(AtomicUsize::new(0));
    let transport = GatedTransport {
        gate: gate.clone(),
        published: published.clone(),
    };

    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let sink = sink_with(transport, static_key("ns"), 4, OverflowPolicy::Block, shutdown_rx);
    let handle = sink.handle();
    let mut state_rx = sink.subscribe_state();
    assert_eq!(*state_rx.borrow(), SinkState::Running);
    let running = tokio::spawn(sink.run());

    handle.update_events(Some("pod".to_string()), None).await;
    timeout(WAIT, state_rx.wait_for(|s| *s == SinkState::Draining))
        .await
        .unwrap()
        .unwrap();

    gate.add_permits(1);
    timeout(WAIT, state_rx.wait_for(|s| *s == SinkState::Running))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(published.load(Ordering::SeqCst), 1);

    handle.close();
    timeout(WAIT, running).await.unwrap().unwrap().unwrap();
    assert_eq!(*state_rx.borrow_and_update(), SinkState::Stopped);
}

#[tokio::test]
async fn test_fail_fast_send_failure_stops_sink_with_error() {
    let mut transport = MockTransport::new();
    transport
        .expect_publish()
        .times(1)
        .returning(|_| Err(TransportError::Unauthorized("expired".to_string())));
    transport.expect_close().times(1).returning(|| ());

    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let sink = sink_with(transport, static_key("ns"), 4, OverflowPolicy::Block, shutdown_rx);
    let handle = sink.handle();
    let state_rx = sink.subscribe_state();
    let running = tokio::spawn(sink.run());

    handle.update_events(Some("pod".to_string()), None).await;
    let result = timeout(WAIT, running).await.unwrap().unwrap();

    assert!(matches!(
        result,
        Err(Error::Sink(SinkError::DispatchFailed { messages: 1, .. }))
    ));
    assert_eq!(*state_rx.borrow(), SinkState::Stopped);

    // the buffer is closed once the loop has stopped
    handle.submit(ChangeItem::new(None, Some("late".to_string()))).await;
    assert_eq!(handle.dropped(), 1);
    assert_eq!(handle.pending(), 0);
}
