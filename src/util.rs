use crate::backend::{GeminiClient, GenerationBackend};
use crate::content::{ContentResolver, ImageUrlMode, ResolverConfig};
use crate::conversion::{GenerationDefaults, TranslationPolicy};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize dotenv and structured tracing based on RUST_LOG.
///
/// Environment files are looked up in order: an explicit path in ENV_FILE,
/// then the conventional `.env` in the working directory. Missing files are
/// not an error.
pub fn init_tracing() {
    let mut env_source: String = "none".into();
    if let Ok(p) = std::env::var("ENV_FILE") {
        let p = p.trim();
        if !p.is_empty() && std::path::Path::new(p).is_file() && dotenvy::from_filename(p).is_ok() {
            env_source = p.to_string();
        }
    }
    if env_source == "none" && dotenvy::dotenv().is_ok() {
        env_source = ".env".into();
    }

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=info".into());
    let subscriber = fmt().with_env_filter(EnvFilter::new(filter)).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    tracing::info!("Environment loaded from: {}", env_source);
}

/// Get the bind address for the HTTP server from env or default to 0.0.0.0:8080.
pub fn env_bind_addr() -> String {
    std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Read a boolean flag from the environment. `None` when unset.
pub fn truthy_env(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| is_truthy(&v))
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Build an HTTP client honoring proxy and timeout environment variables.
///
/// Environment:
/// - CHAT2GEMINI_NO_PROXY = 1|true|yes|on     -> disable all proxies
/// - CHAT2GEMINI_PROXY_URL = <url>            -> proxy for all schemes
/// - HTTP_PROXY / HTTPS_PROXY                 -> scheme-specific proxies
/// - CHAT2GEMINI_HTTP_TIMEOUT_SECONDS         -> overall request timeout (u64)
pub fn build_http_client_from_env() -> reqwest::Client {
    let mut builder = reqwest::Client::builder();

    if let Some(secs) = parse_env::<u64>("CHAT2GEMINI_HTTP_TIMEOUT_SECONDS") {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    if truthy_env("CHAT2GEMINI_NO_PROXY").unwrap_or(false) {
        builder = builder.no_proxy();
    } else {
        if let Ok(url) = std::env::var("CHAT2GEMINI_PROXY_URL") {
            if let Ok(proxy) = reqwest::Proxy::all(url.trim()) {
                builder = builder.proxy(proxy);
            }
        }
        if let Ok(url) = std::env::var("HTTP_PROXY").or_else(|_| std::env::var("http_proxy")) {
            if let Ok(proxy) = reqwest::Proxy::http(url.trim()) {
                builder = builder.proxy(proxy);
            }
        }
        if let Ok(url) = std::env::var("HTTPS_PROXY").or_else(|_| std::env::var("https_proxy")) {
            if let Ok(proxy) = reqwest::Proxy::https(url.trim()) {
                builder = builder.proxy(proxy);
            }
        }
    }

    builder = builder.user_agent(format!("chat2gemini/{}", env!("CARGO_PKG_VERSION")));
    builder.build().unwrap_or_else(|_| reqwest::Client::new())
}

/// Resolver behavior from the environment.
///
/// - CHAT2GEMINI_FETCH_IMAGE_URLS: fetch http(s) images into inline blobs
///   instead of passing the URL through to the backend.
/// - CHAT2GEMINI_IMAGE_FETCH_TIMEOUT_SECONDS: bound on each inline fetch.
pub fn resolver_config_from_env() -> ResolverConfig {
    let mut config = ResolverConfig::default();
    if truthy_env("CHAT2GEMINI_FETCH_IMAGE_URLS").unwrap_or(false) {
        config.image_url_mode = ImageUrlMode::Fetch;
    }
    if let Some(secs) = parse_env::<u64>("CHAT2GEMINI_IMAGE_FETCH_TIMEOUT_SECONDS") {
        config.fetch_timeout = Duration::from_secs(secs);
    }
    config
}

/// Translation policy from the environment.
///
/// - CHAT2GEMINI_STRICT_ROLES (default on): reject image content on
///   non-user roles instead of dropping it.
/// - CHAT2GEMINI_DEFAULT_TEMPERATURE / _TOP_P / _MAX_OUTPUT_TOKENS: opt-in
///   request-independent generation defaults. Unset means the backend's own
///   defaults apply.
pub fn translation_policy_from_env() -> TranslationPolicy {
    let defaults = GenerationDefaults {
        temperature: parse_env("CHAT2GEMINI_DEFAULT_TEMPERATURE"),
        top_p: parse_env("CHAT2GEMINI_DEFAULT_TOP_P"),
        max_output_tokens: parse_env("CHAT2GEMINI_DEFAULT_MAX_OUTPUT_TOKENS"),
    };
    let configured = defaults.temperature.is_some()
        || defaults.top_p.is_some()
        || defaults.max_output_tokens.is_some();

    TranslationPolicy {
        strict_multimodal_roles: truthy_env("CHAT2GEMINI_STRICT_ROLES").unwrap_or(true),
        defaults: configured.then_some(defaults),
    }
}

/// Shared application state used by the HTTP server and handlers.
///
/// Constructed once at process start; shared read-only afterwards. Nothing in
/// here mutates per request.
pub struct AppState {
    pub backend: Arc<dyn GenerationBackend>,
    pub resolver: ContentResolver,
    pub policy: TranslationPolicy,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        resolver: ContentResolver,
        policy: TranslationPolicy,
    ) -> Self {
        Self {
            backend,
            resolver,
            policy,
        }
    }

    /// Assemble state from the environment: one shared HTTP client feeding
    /// both the backend client and the content resolver.
    ///
    /// - GEMINI_API_KEY: backend credential (requests fail upstream without it)
    /// - GEMINI_BASE_URL: endpoint override for self-hosted gateways
    pub fn from_env() -> Self {
        let http = build_http_client_from_env();

        let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("GEMINI_API_KEY is not set; backend calls will be rejected upstream");
        }
        let mut client = GeminiClient::new(http.clone(), api_key);
        if let Ok(base) = std::env::var("GEMINI_BASE_URL") {
            let base = base.trim().trim_end_matches('/');
            if !base.is_empty() {
                client = client.with_base_url(base);
            }
        }

        Self::new(
            Arc::new(client),
            ContentResolver::new(http, resolver_config_from_env()),
            translation_policy_from_env(),
        )
    }
}

/// Build a JSON error response with the given HTTP status and message.
pub fn error_response(status: StatusCode, msg: &str) -> Response {
    let body = serde_json::json!({ "error": { "message": msg } });
    (status, axum::Json(body)).into_response()
}

/// Build a CORS layer from environment variables.
///
/// CORS_ALLOWED_ORIGINS: "*" (default) or a comma-separated origin list.
/// Methods and request headers stay permissive; this service fronts browser
/// clients that send POST + JSON only.
pub fn cors_layer_from_env() -> tower_http::cors::CorsLayer {
    let mut layer = tower_http::cors::CorsLayer::new()
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    match std::env::var("CORS_ALLOWED_ORIGINS") {
        Ok(origins) if origins.trim() != "*" => {
            let values: Vec<http::HeaderValue> = origins
                .split(',')
                .filter_map(|part| http::HeaderValue::from_str(part.trim()).ok())
                .collect();
            if values.is_empty() {
                layer = layer.allow_origin(tower_http::cors::Any);
            } else {
                layer = layer.allow_origin(tower_http::cors::AllowOrigin::list(values));
            }
        }
        _ => {
            layer = layer.allow_origin(tower_http::cors::Any);
        }
    }

    layer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values_parse() {
        for v in ["1", "true", "YES", " on "] {
            assert!(is_truthy(v), "{v:?} should be truthy");
        }
        for v in ["0", "false", "off", "", "nope"] {
            assert!(!is_truthy(v), "{v:?} should be falsy");
        }
    }
}
