//! The push sink seam between the registry and the transport.
//!
//! A [`Channel`] is a one-way, ordered sink of byte chunks that reaches a
//! single remote viewer. The registry never owns the transport; it only
//! writes to the channel and asks it to close.

use std::future::Future;

use bytes::Bytes;

/// Failure to deliver a chunk to a single viewer.
///
/// These never escape [`Registry::publish`](crate::Registry::publish):
/// the affected subscriber is dropped and delivery to everyone else
/// continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The remote end has gone away.
    #[error("channel closed")]
    Closed,

    /// The channel's buffer is full and cannot accept more data.
    #[error("channel full")]
    Full,

    /// The write did not complete within the configured deadline.
    #[error("write timed out")]
    TimedOut,

    /// Any other transport failure.
    #[error("channel I/O error: {0}")]
    Io(String),
}

/// A one-way push sink to one viewer.
///
/// Implementations must tolerate `close` being called more than once and
/// after the remote end has already disconnected.
pub trait Channel: Send + Sync + 'static {
    /// Push one encoded chunk to the viewer.
    fn write(&self, chunk: Bytes) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Close the channel. Best effort; errors are swallowed.
    fn close(&self);
}
