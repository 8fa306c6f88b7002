//! REST endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | HTML page with the live text and an update form |
//! | `POST` | `/api/update` | Replace the text and broadcast it |
//! | `GET` | `/api/text` | Current text |
//! | `GET` | `/api/stats` | Connected viewer diagnostics |
//!
//! The SSE stream itself lives in [`crate::sse`].

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse};
use serde_json::Value;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Body of `GET /api/text`.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextResponse {
    /// The current text.
    pub dynamic_string: String,
}

/// Body of a successful `POST /api/update`.
#[derive(Debug, serde::Serialize)]
pub struct UpdateResponse {
    /// Always `true`.
    pub success: bool,
    /// Human-readable confirmation.
    pub message: &'static str,
}

// ---------------------------------------------------------------------------
// POST /api/update
// ---------------------------------------------------------------------------

/// Replace the shared text, persist it, and push it to every viewer.
///
/// Updates are applied one at a time, so the persisted file and the
/// registry always agree on which update came last.
///
/// Expects `{"text": "<non-empty string>"}`. The body is parsed by hand
/// so malformed JSON and a bad `text` field get distinct messages.
pub async fn update_text(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<UpdateResponse>, ApiError> {
    let payload: Value = serde_json::from_slice(&body).map_err(ApiError::InvalidJson)?;
    let text = payload
        .get("text")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .ok_or(ApiError::InvalidText)?;

    let _update = state.lock_updates().await;
    state.store.save(text).await?;
    let report = state.registry.publish(text).await;
    info!(
        delivered = report.delivered,
        failed = report.failed.len(),
        "Text updated"
    );

    Ok(Json(UpdateResponse {
        success: true,
        message: "Text updated successfully",
    }))
}

// ---------------------------------------------------------------------------
// GET /api/text
// ---------------------------------------------------------------------------

/// Return the current text. Never cached.
pub async fn get_text(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Json(TextResponse {
            dynamic_string: state.registry.current_text(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /api/stats
// ---------------------------------------------------------------------------

/// Return `{"totalClients": n, "clients": [...]}` for the live set.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.stats())
}

// ---------------------------------------------------------------------------
// GET / -- live text page
// ---------------------------------------------------------------------------

/// Serve the viewer page.
///
/// The text is rendered server-side so the page is correct before the
/// event stream connects; the inline script then keeps it current.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let text = escape_html(&state.registry.current_text());
    let clients = state.registry.len();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>LiveText</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        #text {{
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            font-size: 1.5rem;
        }}
        input {{ background: #161b22; color: #c9d1d9; border: 1px solid #30363d; padding: 0.5rem; width: 60%; }}
        button {{ background: #238636; color: #fff; border: none; padding: 0.5rem 1rem; border-radius: 6px; }}
        .status {{ color: #3fb950; font-weight: bold; }}
    </style>
</head>
<body>
    <h1>LiveText</h1>
    <p class="subtitle">Viewers connected at render time: {clients}</p>

    <p>Stream: <span class="status" id="status">connecting</span></p>
    <div id="text">{text}</div>

    <form id="update">
        <input id="input" name="text" placeholder="New text" autocomplete="off">
        <button type="submit">Update</button>
    </form>

    <script>
        const textEl = document.getElementById('text');
        const statusEl = document.getElementById('status');
        const source = new EventSource('/api/events');
        source.onmessage = (event) => {{
            const data = JSON.parse(event.data);
            if (data.type === 'connected') {{
                statusEl.textContent = 'live';
            }} else if (typeof data.dynamicString === 'string') {{
                textEl.textContent = data.dynamicString;
            }}
        }};
        source.onerror = () => {{ statusEl.textContent = 'reconnecting'; }};

        document.getElementById('update').addEventListener('submit', async (event) => {{
            event.preventDefault();
            const input = document.getElementById('input');
            await fetch('/api/update', {{
                method: 'POST',
                headers: {{ 'Content-Type': 'application/json' }},
                body: JSON.stringify({{ text: input.value }}),
            }});
            input.value = '';
        }});
    </script>
</body>
</html>"#
    ))
}

/// Minimal HTML escaping for text placed in element content.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
