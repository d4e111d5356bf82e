//! Data models for the two wire formats this proxy bridges.
//!
//! This module groups two submodules:
//! - `chat`: Types representing the OpenAI Chat Completions request/response
//!   subset the proxy accepts and emits.
//! - `gemini`: Types representing the Gemini `generateContent` request and
//!   response surface.
//!
//! The mapping logic that converts `chat` requests into `gemini` requests is
//! implemented in `crate::conversion`; the reverse direction lives in
//! `crate::response`.

pub mod chat;
pub mod gemini;

// Optional convenience re-exports for downstream users.
pub use chat::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentPart,
    MessageContent, Role,
};
pub use gemini::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, GeminiRole, Part,
};
