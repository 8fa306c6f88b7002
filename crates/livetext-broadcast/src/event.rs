//! Wire framing for events pushed to viewers.
//!
//! Every event is a single server-sent-events record: a `data:` line
//! carrying a compact JSON object, terminated by a blank line. The
//! browser-side consumer parses exactly this shape.

use bytes::Bytes;
use serde::Serialize;

/// Payload announcing a new value of the shared text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChanged<'a> {
    /// The new text.
    pub dynamic_string: &'a str,
}

/// Payload acknowledging a freshly opened stream.
#[derive(Debug, Clone, Serialize)]
pub struct Connected {
    /// Always `"connected"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Frame an arbitrary serializable payload as one SSE `data:` record.
///
/// # Errors
///
/// Returns an error only if the payload's `Serialize` impl fails.
pub fn frame<T: Serialize>(payload: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(payload)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// Encode a text change: `data: {"dynamicString":"..."}\n\n`.
pub fn text_changed(text: &str) -> Bytes {
    // A struct holding a single &str always serializes.
    frame(&TextChanged {
        dynamic_string: text,
    })
    .unwrap_or_else(|_| Bytes::new())
}

/// Encode the stream-opened acknowledgment: `data: {"type":"connected"}\n\n`.
pub fn connected() -> Bytes {
    frame(&Connected { kind: "connected" }).unwrap_or_else(|_| Bytes::new())
}
