//! Behavioural tests for the broadcast registry.
//!
//! A recording channel stands in for the transport. It can be told to
//! fail, stall or slow down its next writes so delivery isolation,
//! eviction, write deadlines and ordering under concurrency can be
//! observed without any network.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use livetext_broadcast::event;
use livetext_broadcast::{BroadcastConfig, Channel, ChannelError, Registry, SubscriberState};

#[derive(Default)]
struct Recorder {
    chunks: Mutex<Vec<Bytes>>,
    fail: AtomicBool,
    stall: AtomicBool,
    slow: Mutex<Option<(&'static str, Duration)>>,
    closes: AtomicUsize,
}

#[derive(Clone, Default)]
struct RecordingChannel(Arc<Recorder>);

impl RecordingChannel {
    fn received(&self) -> Vec<String> {
        self.0
            .chunks
            .lock()
            .unwrap()
            .iter()
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect()
    }

    fn fail_writes(&self) {
        self.0.fail.store(true, Ordering::SeqCst);
    }

    fn stall_writes(&self) {
        self.0.stall.store(true, Ordering::SeqCst);
    }

    /// Delay every write whose payload contains `needle`.
    fn slow_writes_containing(&self, needle: &'static str, delay: Duration) {
        *self.0.slow.lock().unwrap() = Some((needle, delay));
    }

    /// Record a chunk as if it had been queued before any publish.
    fn preload(&self, chunk: Bytes) {
        self.0.chunks.lock().unwrap().push(chunk);
    }

    /// The `dynamicString` values received so far, in arrival order.
    fn texts(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|frame| {
                let json = frame.trim_start_matches("data: ").trim_end();
                let value: serde_json::Value = serde_json::from_str(json).unwrap();
                value["dynamicString"].as_str().unwrap().to_owned()
            })
            .collect()
    }

    fn close_count(&self) -> usize {
        self.0.closes.load(Ordering::SeqCst)
    }
}

impl Channel for RecordingChannel {
    fn write(&self, chunk: Bytes) -> impl Future<Output = Result<(), ChannelError>> + Send {
        let inner = Arc::clone(&self.0);
        async move {
            if inner.stall.load(Ordering::SeqCst) {
                futures::future::pending::<()>().await;
            }
            let slow = *inner.slow.lock().unwrap();
            if let Some((needle, delay)) = slow {
                if chunk.windows(needle.len()).any(|w| w == needle.as_bytes()) {
                    tokio::time::sleep(delay).await;
                }
            }
            if inner.fail.load(Ordering::SeqCst) {
                return Err(ChannelError::Io(String::from("broken pipe")));
            }
            inner.chunks.lock().unwrap().push(chunk);
            Ok(())
        }
    }

    fn close(&self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn registry() -> Registry<RecordingChannel> {
    Registry::new(BroadcastConfig::default(), "initial")
}

const HELLO: &str = "data: {\"dynamicString\":\"hello\"}\n\n";
const WORLD: &str = "data: {\"dynamicString\":\"world\"}\n\n";

// =========================================================================
// Subscribe
// =========================================================================

#[tokio::test]
async fn subscribe_grows_live_set_by_one_with_unique_ids() {
    let registry = registry();
    let mut ids = HashSet::new();

    for expected in 1..=5 {
        let subscriber = registry.subscribe(RecordingChannel::default());
        assert_eq!(registry.len(), expected);
        assert_eq!(subscriber.state(), SubscriberState::Open);
        assert!(ids.insert(subscriber.id()));
    }

    // Ids are never reused, even after a subscriber leaves.
    let first = registry.subscribe(RecordingChannel::default());
    first.close();
    let next = registry.subscribe(RecordingChannel::default());
    assert!(ids.insert(first.id()));
    assert!(ids.insert(next.id()));
    assert!(next.id().seq() > first.id().seq());
}

#[tokio::test]
async fn subscribe_with_snapshot_sees_current_text() {
    let registry = registry();
    registry.publish("latest").await;

    let mut seen = String::new();
    let subscriber = registry.subscribe_with_snapshot(|text| {
        seen = text.to_owned();
        RecordingChannel::default()
    });

    assert_eq!(seen, "latest");
    assert!(registry.contains(subscriber.id()));
}

// =========================================================================
// Publish
// =========================================================================

#[tokio::test]
async fn publish_reaches_every_subscriber_once() {
    let registry = registry();
    let channels: Vec<RecordingChannel> = (0..4).map(|_| RecordingChannel::default()).collect();
    for channel in &channels {
        registry.subscribe(channel.clone());
    }

    let report = registry.publish("hello").await;

    assert_eq!(report.delivered, 4);
    assert!(report.failed.is_empty());
    assert_eq!(registry.len(), 4);
    for channel in &channels {
        assert_eq!(channel.received(), vec![HELLO.to_owned()]);
    }
    assert_eq!(registry.current_text(), "hello");
}

#[tokio::test]
async fn failed_subscriber_is_evicted_and_others_still_receive() {
    let registry = registry();
    let a = RecordingChannel::default();
    let b = RecordingChannel::default();
    let c = RecordingChannel::default();
    let _sub_a = registry.subscribe(a.clone());
    let sub_b = registry.subscribe(b.clone());
    let _sub_c = registry.subscribe(c.clone());

    registry.publish("hello").await;
    for channel in [&a, &b, &c] {
        assert_eq!(channel.received(), vec![HELLO.to_owned()]);
    }

    b.fail_writes();
    let report = registry.publish("world").await;

    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, vec![sub_b.id()]);
    assert_eq!(a.received(), vec![HELLO.to_owned(), WORLD.to_owned()]);
    assert_eq!(c.received(), vec![HELLO.to_owned(), WORLD.to_owned()]);
    assert_eq!(b.received(), vec![HELLO.to_owned()]);

    let stats = registry.stats();
    assert_eq!(stats.total_clients, 2);
    assert!(stats.clients.iter().all(|client| client.id != sub_b.id()));
    assert!(sub_b.is_closed());
    assert_eq!(b.close_count(), 1);

    // B no longer receives anything.
    registry.publish("again").await;
    assert_eq!(b.received().len(), 1);
}

#[tokio::test]
async fn publish_without_subscribers_only_updates_text() {
    let registry = registry();

    let report = registry.publish("lonely").await;

    assert_eq!(report.delivered, 0);
    assert!(report.failed.is_empty());
    assert_eq!(registry.current_text(), "lonely");
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_write_times_out_without_blocking_others() {
    let config = BroadcastConfig {
        write_timeout_ms: 200,
        ..BroadcastConfig::default()
    };
    let registry: Registry<RecordingChannel> = Registry::new(config, "");
    let fast = RecordingChannel::default();
    let slow = RecordingChannel::default();
    registry.subscribe(fast.clone());
    let slow_sub = registry.subscribe(slow.clone());
    slow.stall_writes();

    let report = registry.publish("hello").await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, vec![slow_sub.id()]);
    assert_eq!(fast.received(), vec![HELLO.to_owned()]);
    assert!(!registry.contains(slow_sub.id()));
    assert!(slow_sub.is_closed());
}

// =========================================================================
// Close / unsubscribe
// =========================================================================

#[tokio::test]
async fn close_twice_has_single_effect() {
    let registry = registry();
    let channel = RecordingChannel::default();
    let subscriber = registry.subscribe(channel.clone());
    registry.subscribe(RecordingChannel::default());

    subscriber.close();
    subscriber.close();
    registry.unsubscribe(&subscriber);

    assert_eq!(registry.len(), 1);
    assert_eq!(channel.close_count(), 1);
    assert_eq!(subscriber.state(), SubscriberState::Closed);
}

#[tokio::test]
async fn unsubscribe_is_idempotent_and_leaves_channel_open() {
    let registry = registry();
    let channel = RecordingChannel::default();
    let subscriber = registry.subscribe(channel.clone());

    registry.unsubscribe(&subscriber);
    registry.unsubscribe(&subscriber);

    assert!(registry.is_empty());
    assert_eq!(channel.close_count(), 0);
}

#[tokio::test]
async fn write_after_close_is_silently_dropped() {
    let registry = registry();
    let channel = RecordingChannel::default();
    let subscriber = registry.subscribe(channel.clone());
    subscriber.close();

    let outcome = subscriber.write(event::text_changed("late")).await;

    assert!(outcome.is_ok());
    assert!(channel.received().is_empty());
}

// =========================================================================
// Expiry
// =========================================================================

#[tokio::test(start_paused = true)]
async fn idle_subscriber_expires() {
    let config = BroadcastConfig {
        expiry_secs: 60,
        ..BroadcastConfig::default()
    };
    let registry: Registry<RecordingChannel> = Registry::new(config, "");
    let channel = RecordingChannel::default();
    let subscriber = registry.subscribe(channel.clone());

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(registry.contains(subscriber.id()));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!registry.contains(subscriber.id()));
    assert!(subscriber.is_closed());
    assert_eq!(channel.close_count(), 1);

    registry.publish("after expiry").await;
    assert!(channel.received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn expiry_is_not_refreshed_by_writes() {
    let config = BroadcastConfig {
        expiry_secs: 60,
        ..BroadcastConfig::default()
    };
    let registry: Registry<RecordingChannel> = Registry::new(config, "");
    let subscriber = registry.subscribe(RecordingChannel::default());

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        registry.publish("tick").await;
    }
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert!(subscriber.is_closed());
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn closed_subscriber_timer_does_not_fire_again() {
    let config = BroadcastConfig {
        expiry_secs: 5,
        ..BroadcastConfig::default()
    };
    let registry: Registry<RecordingChannel> = Registry::new(config, "");
    let channel = RecordingChannel::default();
    let subscriber = registry.subscribe(channel.clone());

    subscriber.close();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(channel.close_count(), 1);
}

// =========================================================================
// Stats / shutdown
// =========================================================================

#[tokio::test]
async fn stats_lists_every_live_subscriber_in_connection_order() {
    let registry = registry();
    let first = registry.subscribe(RecordingChannel::default());
    let second = registry.subscribe(RecordingChannel::default());

    let stats = registry.stats();

    assert_eq!(stats.total_clients, 2);
    let ids: Vec<_> = stats.clients.iter().map(|client| client.id).collect();
    assert_eq!(ids, vec![first.id(), second.id()]);
    assert_eq!(
        stats.clients.first().map(|client| client.connected_at),
        Some(first.connected_at())
    );

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["totalClients"], 2);
    assert_eq!(json["clients"][0]["id"], first.id().to_string());
    assert!(json["clients"][0]["duration"].is_u64());
    assert!(json["clients"][0]["connectedAt"].is_string());
}

#[tokio::test]
async fn shutdown_all_closes_everything() {
    let registry = registry();
    let channels: Vec<RecordingChannel> = (0..3).map(|_| RecordingChannel::default()).collect();
    let subscribers: Vec<_> = channels
        .iter()
        .map(|channel| registry.subscribe(channel.clone()))
        .collect();

    registry.shutdown_all();

    assert!(registry.is_empty());
    assert!(subscribers.iter().all(|subscriber| subscriber.is_closed()));
    assert!(channels.iter().all(|channel| channel.close_count() == 1));
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publishes_arrive_in_call_order() {
    let registry = registry();
    let channel = RecordingChannel::default();
    channel.slow_writes_containing("hello", Duration::from_millis(50));
    registry.subscribe(channel.clone());

    let first = tokio::spawn({
        let registry = registry.clone();
        async move { registry.publish("hello").await }
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = tokio::spawn({
        let registry = registry.clone();
        async move { registry.publish("world").await }
    });
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(registry.current_text(), "world");
    assert_eq!(channel.received(), vec![HELLO.to_owned(), WORLD.to_owned()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn subscribe_racing_publish_keeps_snapshot_order() {
    const ROUNDS: u32 = 50;
    let registry = registry();

    let publisher = tokio::spawn({
        let registry = registry.clone();
        async move {
            for n in 1..=ROUNDS {
                registry.publish(n.to_string()).await;
                tokio::task::yield_now().await;
            }
        }
    });
    let joiner = tokio::spawn({
        let registry = registry.clone();
        async move {
            let mut channels = Vec::new();
            for _ in 0..20 {
                let channel = RecordingChannel::default();
                let preloaded = channel.clone();
                registry.subscribe_with_snapshot(move |text| {
                    preloaded.preload(event::text_changed(text));
                    preloaded
                });
                channels.push(channel);
                tokio::task::yield_now().await;
            }
            channels
        }
    });
    publisher.await.unwrap();
    let channels = joiner.await.unwrap();

    for channel in &channels {
        let values: Vec<u32> = channel
            .texts()
            .iter()
            .map(|text| if text == "initial" { 0 } else { text.parse().unwrap() })
            .collect();
        assert!(
            values.iter().zip(values.iter().skip(1)).all(|(a, b)| a < b),
            "out of order: {values:?}"
        );
        assert_eq!(values.last(), Some(&ROUNDS));
    }
}
