//! Server-sent events transport for live text updates.
//!
//! Clients connect to `GET /api/events` and receive:
//!
//! 1. `data: {"type":"connected"}` as soon as the stream opens
//! 2. `data: {"dynamicString":"..."}` with the current text
//! 3. one `data: {"dynamicString":"..."}` record per later update
//!
//! Each viewer owns a bounded [`mpsc`] queue. The [`SseChannel`] side
//! is handed to the registry; the receiving side becomes the response
//! body. When the viewer disconnects, Hyper drops the body and the
//! subscription is closed through [`ViewerStream`]'s `Drop`.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::Stream;
use livetext_broadcast::{Channel, ChannelError, Subscriber, event};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::AppState;

/// Minimum queue depth: the acknowledgment plus the initial snapshot
/// must always fit.
const MIN_QUEUE_DEPTH: usize = 2;

/// Registry-facing end of one viewer's SSE stream.
#[derive(Debug)]
pub struct SseChannel {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
}

impl SseChannel {
    /// Wrap the sending half of a viewer queue.
    pub const fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<Bytes>> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Channel for SseChannel {
    fn write(&self, chunk: Bytes) -> impl Future<Output = Result<(), ChannelError>> + Send {
        let tx = self.sender();
        async move {
            let Some(tx) = tx else {
                return Err(ChannelError::Closed);
            };
            match tx.send(chunk).await {
                Ok(()) => Ok(()),
                Err(_unsent) => Err(ChannelError::Closed),
            }
        }
    }

    fn close(&self) {
        // Dropping the last sender ends the response body.
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Response body for one viewer.
///
/// Yields queued chunks until the queue is closed, and closes the
/// viewer's subscription when dropped.
pub struct ViewerStream {
    rx: mpsc::Receiver<Bytes>,
    subscriber: Arc<Subscriber<SseChannel>>,
}

impl ViewerStream {
    /// Tie a queue receiver to the subscription it feeds.
    pub const fn new(rx: mpsc::Receiver<Bytes>, subscriber: Arc<Subscriber<SseChannel>>) -> Self {
        Self { rx, subscriber }
    }
}

impl Stream for ViewerStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx).map(|chunk| chunk.map(Ok))
    }
}

impl Drop for ViewerStream {
    fn drop(&mut self) {
        debug!(subscriber_id = %self.subscriber.id(), "SSE stream dropped");
        self.subscriber.close();
    }
}

/// Open an SSE stream of text updates.
///
/// # Route
///
/// `GET /api/events`
pub async fn events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let depth = state
        .registry
        .config()
        .channel_capacity
        .max(MIN_QUEUE_DEPTH);
    let (tx, rx) = mpsc::channel(depth);

    // The queue is fresh and at least two deep, so neither push should fail.
    if let Err(e) = tx.try_send(event::connected()) {
        warn!(error = %e, "Failed to queue connected ack");
    }
    let subscriber = state.registry.subscribe_with_snapshot(|text| {
        if let Err(e) = tx.try_send(event::text_changed(text)) {
            warn!(error = %e, "Failed to queue text snapshot");
        }
        SseChannel::new(tx)
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(ViewerStream::new(rx, subscriber)),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_after_close_reports_closed() {
        let (tx, mut rx) = mpsc::channel(4);
        let channel = SseChannel::new(tx);

        channel.write(Bytes::from_static(b"one")).await.unwrap();
        channel.close();
        channel.close();

        assert_eq!(
            channel.write(Bytes::from_static(b"two")).await,
            Err(ChannelError::Closed)
        );
        assert_eq!(rx.recv().await, Some(Bytes::from_static(b"one")));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn write_to_departed_viewer_fails() {
        let (tx, rx) = mpsc::channel(4);
        let channel = SseChannel::new(tx);
        drop(rx);

        assert_eq!(
            channel.write(Bytes::from_static(b"lost")).await,
            Err(ChannelError::Closed)
        );
    }
}
