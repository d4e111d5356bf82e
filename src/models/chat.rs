use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Model used when the request does not name one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Chat Completions role enumeration.
///
/// Uses lowercase serialization to match the OpenAI Chat API:
/// "system" | "user" | "assistant" | "tool"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Tool outputs have no native counterpart; like every non-system role
    /// other than `assistant`, they are forwarded as `user` turns.
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Message content: either a plain string or an array of multimodal parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

/// One multimodal fragment, tagged by `type` as in the Chat API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image reference wrapper: `{ "image_url": { "url": "..." } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Chat message as accepted on the inbound request.
///
/// `content` is optional: messages with absent or empty content are skipped
/// during translation rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}

/// Chat Completions request (the subset this proxy understands).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default = "default_model")]
    pub model: String,
    pub messages: Vec<ChatMessage>,

    // Sampling / decoding: forwarded verbatim when present, otherwise the
    // backend's own defaults apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Accepts the Chat API's `max_tokens` spelling as an alias.
    #[serde(default, alias = "max_tokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(default)]
    pub stream: bool,
}

// ============================================================================
// Chat Completions Response Models
// ============================================================================

/// Message in a Chat Completions response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseMessage {
    pub role: String, // "assistant"
    pub content: String,
}

/// Choice in a Chat Completions response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatResponseMessage,
    pub finish_reason: String, // "stop", "length", "content_filter"
}

/// Usage statistics mapped from the backend's token accounting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Complete Chat Completions API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String, // "chat.completion"
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: ChatUsage,
}

// ============================================================================
// Chat Completions Streaming Response Models
// ============================================================================

/// Delta in a streaming chunk. Absent fields are omitted from the wire form;
/// the trailing finish chunk carries an empty object here.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Choice in a streaming chunk.
///
/// `finish_reason` is serialized even when `null` so clients see the field on
/// every chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChoice {
    pub index: u32,
    pub delta: ChatDelta,
    pub finish_reason: Option<String>,
}

/// Streaming chunk response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String, // "chat.completion.chunk"
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatStreamChoice>,
}
