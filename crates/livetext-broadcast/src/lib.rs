//! Live text broadcast core.
//!
//! This crate owns the only piece of runtime design in the `LiveText`
//! service: a [`Registry`] that holds the current shared text and the set
//! of connected viewers, and fans every text change out to them.
//!
//! - [`Registry`] -- subscribe, unsubscribe, publish, stats, shutdown
//! - [`Subscriber`] -- one viewer connection with an explicit
//!   open/closed state and a self-expiring timer
//! - [`Channel`] -- the push sink seam implemented by the transport
//!   (server-sent events in `livetext-server`)
//! - [`event`] -- the `data: {...}\n\n` wire framing
//!
//! # Architecture
//!
//! The registry is an explicitly constructed, cheaply cloneable handle.
//! All mutations of the shared text and the live set happen under a
//! single mutex that is never held across an await point. Publishing
//! snapshots the live set under that lock, writes to every subscriber
//! concurrently, and only then evicts the subscribers whose write failed.

pub mod channel;
pub mod config;
pub mod event;
pub mod registry;
pub mod stats;
pub mod subscriber;

pub use channel::{Channel, ChannelError};
pub use config::BroadcastConfig;
pub use registry::{PublishReport, Registry};
pub use stats::{ClientStats, RegistryStats};
pub use subscriber::{Subscriber, SubscriberId, SubscriberState};
