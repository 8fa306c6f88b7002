//! Tuning knobs for the broadcast registry.

use std::time::Duration;

use serde::Deserialize;

/// Default lifetime of a subscription before it is force-closed.
pub const DEFAULT_EXPIRY_SECS: u64 = 5 * 60;

/// Default deadline for a single write during a publish.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5_000;

/// Default number of chunks a transport may buffer per viewer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Broadcast registry configuration.
///
/// The expiry is measured from connection time and is not refreshed by
/// successful writes, so dead connections the transport never reports
/// are still reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Seconds after connecting at which a subscriber is closed.
    pub expiry_secs: u64,
    /// Milliseconds a single publish write may take before the
    /// subscriber is treated as failed.
    pub write_timeout_ms: u64,
    /// Per-viewer buffer size used by queue-backed transports.
    pub channel_capacity: usize,
}

impl BroadcastConfig {
    /// The subscription expiry as a [`Duration`].
    pub const fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }

    /// The per-write deadline as a [`Duration`].
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            expiry_secs: DEFAULT_EXPIRY_SECS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
