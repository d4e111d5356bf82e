use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use http::{header, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::conversion::to_generate_request;
use crate::models::chat::{ChatCompletionRequest, DEFAULT_MODEL};
use crate::response::{completion_events, to_completion, ResponseMeta};
use crate::util::{cors_layer_from_env, error_response, AppState};

/// Build the Axum router with the chat-completions and health endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat/completions", post(chat_completions))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
        .layer(cors_layer_from_env())
        .layer(TraceLayer::new_for_http())
}

/// Liveness endpoint; never touches the backend.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "chat2gemini",
        "model": DEFAULT_MODEL,
    }))
}

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    handle_chat_completion(&state, request).await
}

/// Translate one chat request, invoke the backend, and re-encode the reply:
/// JSON for single-shot requests, an SSE body for streaming ones.
pub async fn handle_chat_completion(state: &AppState, request: ChatCompletionRequest) -> Response {
    // Response identity is fixed here, before the backend is consulted, and
    // reused across every chunk of a streamed reply.
    let meta = ResponseMeta::new(&request.model);

    let translated = match to_generate_request(&request, &state.resolver, &state.policy).await {
        Ok(translated) => translated,
        Err(e) => return error_response(e.status_code(), &e.to_string()),
    };
    let native_request = translated.into_native();

    if request.stream {
        let native_stream = match state
            .backend
            .generate_streaming(&request.model, &native_request)
            .await
        {
            Ok(stream) => stream,
            Err(e) => return error_response(StatusCode::BAD_GATEWAY, &e.to_string()),
        };

        let frames = completion_events(native_stream, meta)
            .map(|frame| Ok::<_, Infallible>(Bytes::from(frame)));

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::from_stream(frames))
            .unwrap_or_else(|_| {
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to build stream response",
                )
            })
    } else {
        match state.backend.generate(&request.model, &native_request).await {
            Ok(native) => Json(to_completion(&native, &meta)).into_response(),
            Err(e) => error_response(StatusCode::BAD_GATEWAY, &e.to_string()),
        }
    }
}
