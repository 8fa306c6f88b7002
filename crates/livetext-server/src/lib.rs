//! HTTP server for the `LiveText` demo.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **Server-sent events endpoint** (`/api/events`) that streams every
//!   change of the shared text to connected browsers
//! - **REST endpoints** for updating the text, reading it, and
//!   inspecting the connected viewers
//! - **Minimal HTML page** (`GET /`) that shows the text, updates it
//!   live, and offers a form to change it
//!
//! # Architecture
//!
//! All fan-out goes through a single [`Registry`](livetext_broadcast::Registry)
//! owned by [`AppState`]. Each SSE viewer gets its own bounded queue
//! ([`SseChannel`]); the response body drains that queue, and dropping
//! the body closes the viewer's subscription. The durable copy of the
//! text lives in a JSON file managed by [`TextStore`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod sse;
pub mod state;
pub mod store;

// Re-export primary types for convenience.
pub use crate::config::{LiveTextConfig, ServerConfig};
pub use router::build_router;
pub use server::{ServerError, serve, start_server};
pub use sse::SseChannel;
pub use state::AppState;
pub use store::TextStore;
