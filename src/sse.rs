//! Server-Sent-Events framing for the streaming response path.

use serde::Serialize;

/// Terminal marker closing every stream, on the success and error paths
/// alike. Emitted exactly once, always last.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Frame one JSON-serializable event as an SSE data line.
pub fn encode<T: Serialize>(event: &T) -> String {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("data: {json}\n\n")
}
