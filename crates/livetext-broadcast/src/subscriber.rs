//! One connected viewer.
//!
//! A [`Subscriber`] wraps the viewer's [`Channel`], carries an explicit
//! [`SubscriberState`], and owns the abort handle of its expiry timer.
//! It moves from `Open` to `Closed` exactly once, whichever trigger
//! fires first: viewer cancellation, a failed write, or expiry.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, Weak};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::channel::{Channel, ChannelError};
use crate::registry::RegistryInner;

/// Unique identifier of a subscription.
///
/// A process-wide sequence number paired with the creation time in
/// milliseconds. Rendered as `client_<seq>_<unix_ms>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId {
    seq: u64,
    created_ms: i64,
}

impl SubscriberId {
    pub(crate) const fn new(seq: u64, created_ms: i64) -> Self {
        Self { seq, created_ms }
    }

    /// The sequence number component.
    pub const fn seq(self) -> u64 {
        self.seq
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client_{}_{}", self.seq, self.created_ms)
    }
}

impl Serialize for SubscriberId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Lifecycle state of a [`Subscriber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Writes are attempted.
    Open,
    /// Terminal. Writes are silently dropped.
    Closed,
}

/// A registered viewer connection.
pub struct Subscriber<C: Channel> {
    id: SubscriberId,
    connected_at: DateTime<Utc>,
    channel: C,
    closed: AtomicBool,
    expiry: Mutex<Option<AbortHandle>>,
    registry: Weak<RegistryInner<C>>,
}

impl<C: Channel> Subscriber<C> {
    pub(crate) const fn new(
        id: SubscriberId,
        connected_at: DateTime<Utc>,
        channel: C,
        registry: Weak<RegistryInner<C>>,
    ) -> Self {
        Self {
            id,
            connected_at,
            channel,
            closed: AtomicBool::new(false),
            expiry: Mutex::new(None),
            registry,
        }
    }

    /// This subscription's identifier.
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// When the viewer connected.
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriberState {
        if self.is_closed() {
            SubscriberState::Closed
        } else {
            SubscriberState::Open
        }
    }

    /// Whether the subscriber has reached the terminal state.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Push one encoded event to the viewer.
    ///
    /// A closed subscriber drops the chunk and returns `Ok(())`. A failed
    /// write closes the subscriber before the error is returned.
    pub async fn write(&self, chunk: Bytes) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Ok(());
        }
        match self.channel.write(chunk).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(subscriber_id = %self.id, error = %e, "Write to subscriber failed");
                self.close();
                Err(e)
            }
        }
    }

    /// Transition to `Closed`.
    ///
    /// Cancels the expiry timer, deregisters from the registry and closes
    /// the channel. Only the first call has any effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel_expiry();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
        self.channel.close();
        debug!(subscriber_id = %self.id, "Subscriber closed");
    }

    /// Attach the expiry timer. A subscriber that closed before the timer
    /// was armed aborts it immediately.
    pub(crate) fn arm_expiry(&self, handle: AbortHandle) {
        let mut slot = self.expiry.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            handle.abort();
        } else {
            *slot = Some(handle);
        }
    }

    /// Abort the pending expiry timer, if any. Safe after it has fired.
    pub(crate) fn cancel_expiry(&self) {
        let handle = self
            .expiry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl<C: Channel> fmt::Debug for Subscriber<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
