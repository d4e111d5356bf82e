use crate::error::BackendError;
use crate::models::chat::{
    ChatChoice, ChatCompletionChunk, ChatCompletionResponse, ChatDelta, ChatResponseMessage,
    ChatStreamChoice, ChatUsage,
};
use crate::models::gemini::{FinishReason, GenerateContentResponse};
use crate::sse;
use futures_util::{Stream, StreamExt};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

/// Identity shared by every event of one completion.
///
/// `id` and `created` are fixed once at request start and identical across
/// all chunks of a streamed response.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub id: String,
    pub created: u64,
    pub model: String,
}

impl ResponseMeta {
    pub fn new(model: &str) -> Self {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            created,
            model: model.to_string(),
        }
    }
}

/// Map a native finish reason onto the OpenAI enumeration. Unrecognized
/// reasons terminate as a plain "stop" rather than leaving the field unset.
pub fn map_finish_reason(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::MaxTokens => "length",
        FinishReason::Safety => "content_filter",
        FinishReason::Other => "stop",
    }
}

/// Build the non-streaming completion object from one native response.
pub fn to_completion(
    native: &GenerateContentResponse,
    meta: &ResponseMeta,
) -> ChatCompletionResponse {
    let usage = native.usage_metadata.unwrap_or_default();
    ChatCompletionResponse {
        id: meta.id.clone(),
        object: "chat.completion".to_string(),
        created: meta.created,
        model: meta.model.clone(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatResponseMessage {
                role: "assistant".to_string(),
                content: native.text().unwrap_or_default(),
            },
            finish_reason: native
                .finish_reason()
                .map(map_finish_reason)
                .unwrap_or("stop")
                .to_string(),
        }],
        usage: ChatUsage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        },
    }
}

fn chunk(meta: &ResponseMeta, delta: ChatDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: meta.id.clone(),
        object: "chat.completion.chunk".to_string(),
        created: meta.created,
        model: meta.model.clone(),
        choices: vec![ChatStreamChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    }
}

/// Leading chunk announcing the assistant role, sent before any backend data
/// so clients can render immediately.
pub fn role_chunk(meta: &ResponseMeta) -> ChatCompletionChunk {
    chunk(
        meta,
        ChatDelta {
            role: Some("assistant".to_string()),
            content: Some(String::new()),
        },
        None,
    )
}

pub fn content_chunk(meta: &ResponseMeta, text: String) -> ChatCompletionChunk {
    chunk(
        meta,
        ChatDelta {
            role: None,
            content: Some(text),
        },
        None,
    )
}

/// Trailing chunk: empty delta, the mapped finish reason. Exactly one per
/// stream; no content chunk may follow it.
pub fn finish_chunk(meta: &ResponseMeta, reason: &str) -> ChatCompletionChunk {
    chunk(meta, ChatDelta::default(), Some(reason.to_string()))
}

/// In-band record for a backend failure after the response has started.
/// Distinguishable from content chunks by its `error` field.
pub fn error_event(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message, "type": "error" })
}

/// Re-encode a native partial-response stream as OpenAI SSE frames.
///
/// Frame order: role announcement, one content chunk per non-empty text
/// delta, a single finish chunk (reason observed on the native stream,
/// defaulting to "stop"), then the `[DONE]` sentinel. A mid-stream backend
/// failure is surfaced as an in-band error record, still followed by the
/// sentinel. When the receiver is dropped (the client disconnected), the
/// pump stops pulling and the backend stream is released.
pub fn completion_events<S>(native: S, meta: ResponseMeta) -> ReceiverStream<String>
where
    S: Stream<Item = Result<GenerateContentResponse, BackendError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(pump(native, meta, tx));
    ReceiverStream::new(rx)
}

async fn pump<S>(native: S, meta: ResponseMeta, tx: mpsc::Sender<String>)
where
    S: Stream<Item = Result<GenerateContentResponse, BackendError>> + Send + 'static,
{
    futures_util::pin_mut!(native);

    if tx.send(sse::encode(&role_chunk(&meta))).await.is_err() {
        return;
    }

    let mut finish: Option<&'static str> = None;
    while let Some(item) = native.next().await {
        match item {
            Ok(partial) => {
                if let Some(reason) = partial.finish_reason() {
                    finish = Some(map_finish_reason(reason));
                }
                // Empty deltas contribute nothing and are not forwarded.
                if let Some(text) = partial.text().filter(|t| !t.is_empty()) {
                    if tx
                        .send(sse::encode(&content_chunk(&meta, text)))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "backend stream failed mid-response");
                let _ = tx.send(sse::encode(&error_event(&err.message))).await;
                let _ = tx.send(sse::DONE_FRAME.to_string()).await;
                return;
            }
        }
    }

    let _ = tx
        .send(sse::encode(&finish_chunk(&meta, finish.unwrap_or("stop"))))
        .await;
    let _ = tx.send(sse::DONE_FRAME.to_string()).await;
}
