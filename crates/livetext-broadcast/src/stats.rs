//! Diagnostic snapshot of the live set.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::channel::Channel;
use crate::subscriber::{Subscriber, SubscriberId};

/// Connected-client summary returned by [`Registry::stats`](crate::Registry::stats).
///
/// Serializes as `{"totalClients": n, "clients": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Size of the live set.
    pub total_clients: usize,
    /// One entry per live subscriber, ordered by connection sequence.
    pub clients: Vec<ClientStats>,
}

/// One live subscriber in a [`RegistryStats`] snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    /// Subscription identifier.
    pub id: SubscriberId,
    /// When the viewer connected.
    pub connected_at: DateTime<Utc>,
    /// Milliseconds connected so far.
    pub duration: u64,
}

impl ClientStats {
    pub(crate) fn at<C: Channel>(subscriber: &Subscriber<C>, now: DateTime<Utc>) -> Self {
        let elapsed = now
            .signed_duration_since(subscriber.connected_at())
            .num_milliseconds();
        Self {
            id: subscriber.id(),
            connected_at: subscriber.connected_at(),
            duration: u64::try_from(elapsed).unwrap_or(0),
        }
    }
}
