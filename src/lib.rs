#![forbid(unsafe_code)]
#![doc = r#"
Chat2Gemini

Translate OpenAI Chat Completions requests into Gemini `generateContent`
calls and re-encode the reply (single message or token stream) back into
OpenAI-compatible JSON or Server-Sent-Events.

Crate highlights
- Library: pure translation via `to_generate_request(...)` plus the
  `GenerationBackend` client seam and the response re-encoders.
- HTTP server (in `server`): `/chat/completions`, `/v1/chat/completions`
  (stream and non-stream) and `/health`.
- Models: request/response models for both the Chat Completions wire format
  and the Gemini native format.

Modules
- `models`: Data structures for the Chat and Gemini wire formats.
- `content`: Multimodal source resolution (object-store URIs, http(s) URLs,
  data URIs, local paths, raw base64).
- `conversion`: Mapping logic from Chat requests to native requests.
- `backend`: The Gemini REST client behind the `GenerationBackend` trait.
- `response`: Native responses back to Chat completions and chunk streams.
- `sse`: Server-Sent-Events framing.
- `server`: Axum router/handlers (the binary uses this).
- `util`: Shared helpers (tracing, env, state, CORS).
"#]

pub mod backend;
pub mod content;
pub mod conversion;
pub mod error;
pub mod models;
pub mod response;
pub mod server;
pub mod sse;
pub mod util;

// Re-export the primary entry points for ergonomic library use.
pub use crate::backend::{GeminiClient, GenerationBackend};
pub use crate::content::{ContentResolver, ResolvedPart, ResolverConfig, SourceKind};
pub use crate::conversion::{to_generate_request, TranslatedRequest, TranslationPolicy};
pub use crate::error::{BackendError, ContentError, ProxyError};

// Re-export model namespaces for convenience (downstream users can do
// `use chat2gemini::chat`).
pub use crate::models::{chat, gemini};
