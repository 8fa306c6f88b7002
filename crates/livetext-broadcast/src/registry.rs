//! The broadcast registry.
//!
//! [`Registry`] is the single authoritative fan-out point for text
//! changes. It owns the shared text and the live set of
//! [`Subscriber`]s. Both are guarded by one mutex so a publish never
//! observes a half-updated set, and the lock is never held across an
//! await point. A separate async guard lets only one publish fan out at
//! a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelError};
use crate::config::BroadcastConfig;
use crate::event;
use crate::stats::{ClientStats, RegistryStats};
use crate::subscriber::{Subscriber, SubscriberId};

/// Outcome of one [`Registry::publish`] call.
///
/// Purely informational: per-subscriber failures are handled inside the
/// registry and are never surfaced as errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose write completed without error.
    pub delivered: usize,
    /// Subscribers that were evicted because their write failed.
    pub failed: Vec<SubscriberId>,
}

/// Shared text plus the live set.
struct RegistryState<C: Channel> {
    text: String,
    live: HashMap<SubscriberId, Arc<Subscriber<C>>>,
}

/// State shared between the registry handle and its subscribers.
pub(crate) struct RegistryInner<C: Channel> {
    config: BroadcastConfig,
    next_seq: AtomicU64,
    state: Mutex<RegistryState<C>>,
    /// Serializes whole publishes so rounds reach each viewer in call order.
    publishing: tokio::sync::Mutex<()>,
}

impl<C: Channel> RegistryInner<C> {
    fn lock(&self) -> MutexGuard<'_, RegistryState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove a subscriber from the live set. Returns `false` if it was
    /// already absent.
    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        let (removed, total) = {
            let mut state = self.lock();
            let removed = state.live.remove(&id).is_some();
            (removed, state.live.len())
        };
        if removed {
            info!(subscriber_id = %id, total_clients = total, "Subscriber disconnected");
        }
        removed
    }
}

/// Fan-out registry for the shared text.
///
/// Cheap to clone; all clones refer to the same live set. Construct one
/// at startup, hand it to whatever terminates subscribe and update
/// requests, and call [`Registry::shutdown_all`] at teardown.
pub struct Registry<C: Channel> {
    inner: Arc<RegistryInner<C>>,
}

impl<C: Channel> Clone for Registry<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Channel> Registry<C> {
    /// Create a registry seeded with the given text.
    pub fn new(config: BroadcastConfig, initial_text: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                next_seq: AtomicU64::new(0),
                state: Mutex::new(RegistryState {
                    text: initial_text.into(),
                    live: HashMap::new(),
                }),
                publishing: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &BroadcastConfig {
        &self.inner.config
    }

    /// Register a new viewer channel.
    ///
    /// Starts the subscriber's expiry timer, so this must be called from
    /// within a Tokio runtime.
    pub fn subscribe(&self, channel: C) -> Arc<Subscriber<C>> {
        self.subscribe_with_snapshot(|_| channel)
    }

    /// Register a viewer whose channel is built from the current text.
    ///
    /// `make_channel` runs inside the same critical section that inserts
    /// the subscriber, so anything it pre-loads into the channel is
    /// ordered before every later publish and no publish is missed.
    pub fn subscribe_with_snapshot<F>(&self, make_channel: F) -> Arc<Subscriber<C>>
    where
        F: FnOnce(&str) -> C,
    {
        let seq = self
            .inner
            .next_seq
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1);
        let now = Utc::now();
        let id = SubscriberId::new(seq, now.timestamp_millis());

        let (subscriber, total) = {
            let mut state = self.inner.lock();
            let channel = make_channel(&state.text);
            let subscriber = Arc::new(Subscriber::new(
                id,
                now,
                channel,
                Arc::downgrade(&self.inner),
            ));
            state.live.insert(id, Arc::clone(&subscriber));
            (subscriber, state.live.len())
        };

        self.start_expiry(&subscriber);
        info!(subscriber_id = %id, total_clients = total, "Subscriber connected");
        subscriber
    }

    fn start_expiry(&self, subscriber: &Arc<Subscriber<C>>) {
        let weak = Arc::downgrade(subscriber);
        let expiry = self.inner.config.expiry();
        let task = tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            if let Some(subscriber) = weak.upgrade() {
                info!(subscriber_id = %subscriber.id(), "Closing subscriber after expiry");
                subscriber.close();
            }
        });
        subscriber.arm_expiry(task.abort_handle());
    }

    /// Remove a subscriber from the live set and cancel its timer.
    ///
    /// Idempotent. Does not close the channel; use
    /// [`Subscriber::close`] for the full teardown.
    pub fn unsubscribe(&self, subscriber: &Subscriber<C>) {
        subscriber.cancel_expiry();
        self.inner.remove(subscriber.id());
    }

    /// Replace the shared text and push it to every live subscriber.
    ///
    /// The text update and the recipient snapshot happen atomically;
    /// subscribers added while the fan-out is running do not receive this
    /// round. Writes run concurrently, each bounded by the configured
    /// write timeout. Subscribers whose write failed are evicted after
    /// all writes have finished.
    ///
    /// Concurrent publishes run one at a time, in the order they acquire
    /// the publish guard, so every viewer sees updates in the same order
    /// the shared text took them.
    pub async fn publish(&self, text: impl Into<String>) -> PublishReport {
        let text = text.into();
        let chunk = event::text_changed(&text);
        let _round = self.inner.publishing.lock().await;

        let targets: Vec<Arc<Subscriber<C>>> = {
            let mut state = self.inner.lock();
            state.text = text;
            state.live.values().cloned().collect()
        };

        if targets.is_empty() {
            debug!("No subscribers connected, skipping broadcast");
            return PublishReport::default();
        }

        let limit = self.inner.config.write_timeout();
        let outcomes = join_all(
            targets
                .iter()
                .map(|subscriber| deliver(subscriber, chunk.clone(), limit)),
        )
        .await;

        let failed: Vec<&Arc<Subscriber<C>>> = targets
            .iter()
            .zip(outcomes)
            .filter_map(|(subscriber, outcome)| match outcome {
                Ok(()) => None,
                Err(e) => {
                    warn!(subscriber_id = %subscriber.id(), error = %e, "Failed to send to subscriber");
                    Some(subscriber)
                }
            })
            .collect();

        for subscriber in &failed {
            self.unsubscribe(subscriber);
            subscriber.close();
        }

        let report = PublishReport {
            delivered: targets.len().saturating_sub(failed.len()),
            failed: failed.iter().map(|subscriber| subscriber.id()).collect(),
        };
        debug!(
            delivered = report.delivered,
            failed = report.failed.len(),
            "Broadcast complete"
        );
        report
    }

    /// Read-only diagnostic snapshot of the live set.
    pub fn stats(&self) -> RegistryStats {
        let now = Utc::now();
        let mut clients: Vec<ClientStats> = {
            let state = self.inner.lock();
            state
                .live
                .values()
                .map(|subscriber| ClientStats::at(subscriber, now))
                .collect()
        };
        clients.sort_by_key(|client| client.id);
        RegistryStats {
            total_clients: clients.len(),
            clients,
        }
    }

    /// The current shared text.
    pub fn current_text(&self) -> String {
        self.inner.lock().text.clone()
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.inner.lock().live.len()
    }

    /// Whether no subscriber is connected.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().live.is_empty()
    }

    /// Whether the given subscriber is currently in the live set.
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner.lock().live.contains_key(&id)
    }

    /// Close and remove every live subscriber. Used at process teardown.
    pub fn shutdown_all(&self) {
        let drained: Vec<Arc<Subscriber<C>>> = {
            let mut state = self.inner.lock();
            state.live.drain().map(|(_, subscriber)| subscriber).collect()
        };
        info!(count = drained.len(), "Closing all subscribers");
        for subscriber in drained {
            subscriber.close();
        }
    }
}

impl<C: Channel> std::fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.inner.config)
            .field("live", &self.len())
            .finish_non_exhaustive()
    }
}

/// Write one chunk, treating a missed deadline as a failure.
async fn deliver<C: Channel>(
    subscriber: &Subscriber<C>,
    chunk: Bytes,
    limit: Duration,
) -> Result<(), ChannelError> {
    match tokio::time::timeout(limit, subscriber.write(chunk)).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => Err(ChannelError::TimedOut),
    }
}
