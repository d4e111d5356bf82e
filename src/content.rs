use crate::error::ContentError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::path::Path;
use std::time::Duration;

/// How http(s) image URLs are handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageUrlMode {
    /// Forward the URL as a file reference and let the backend fetch it.
    #[default]
    Passthrough,
    /// Fetch the image here and inline it as base64 data.
    Fetch,
}

/// Resolver configuration, fixed at startup.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub image_url_mode: ImageUrlMode,
    /// Bound on inline image fetches; a hanging remote source must not stall
    /// the request indefinitely.
    pub fetch_timeout: Duration,
    /// MIME type assumed for raw base64 payloads that carry no metadata.
    pub fallback_image_mime: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            image_url_mode: ImageUrlMode::Passthrough,
            fetch_timeout: Duration::from_secs(20),
            fallback_image_mime: "image/png".to_string(),
        }
    }
}

/// A normalized content fragment, ready to become a native request part.
/// Request-scoped; discarded once the backend call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPart {
    Text(String),
    Blob { bytes: Vec<u8>, mime_type: String },
    Uri { uri: String, mime_type: Option<String> },
}

/// The source encodings an image reference may arrive in, in match order.
///
/// Structured schemes are checked before the filesystem and base64 fallbacks
/// so an ambiguous string (say, a relative path containing a colon) is never
/// misclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    ObjectStoreUri,
    HttpUrl,
    DataUri,
    LocalPath,
    RawBase64,
}

impl SourceKind {
    pub fn detect(source: &str) -> SourceKind {
        if source.starts_with("gs://") {
            SourceKind::ObjectStoreUri
        } else if source.starts_with("http://") || source.starts_with("https://") {
            SourceKind::HttpUrl
        } else if source.starts_with("data:") {
            SourceKind::DataUri
        } else if Path::new(source).is_file() {
            SourceKind::LocalPath
        } else {
            SourceKind::RawBase64
        }
    }
}

/// Resolves one multimodal source string into a [`ResolvedPart`].
pub struct ContentResolver {
    http: reqwest::Client,
    config: ResolverConfig,
}

impl ContentResolver {
    pub fn new(http: reqwest::Client, config: ResolverConfig) -> Self {
        Self { http, config }
    }

    /// Resolve a single image source according to the precedence order in
    /// [`SourceKind::detect`].
    pub async fn resolve(&self, source: &str) -> Result<ResolvedPart, ContentError> {
        match SourceKind::detect(source) {
            SourceKind::ObjectStoreUri => Ok(ResolvedPart::Uri {
                uri: source.to_string(),
                mime_type: guess_mime(source),
            }),
            SourceKind::HttpUrl => self.resolve_http(source).await,
            SourceKind::DataUri => decode_data_uri(source),
            SourceKind::LocalPath => self.resolve_local(source).await,
            SourceKind::RawBase64 => decode_raw_base64(source, &self.config.fallback_image_mime),
        }
    }

    async fn resolve_http(&self, url: &str) -> Result<ResolvedPart, ContentError> {
        match self.config.image_url_mode {
            ImageUrlMode::Passthrough => Ok(ResolvedPart::Uri {
                uri: url.to_string(),
                mime_type: guess_mime(url),
            }),
            ImageUrlMode::Fetch => self.fetch_into_blob(url).await,
        }
    }

    async fn fetch_into_blob(&self, url: &str) -> Result<ResolvedPart, ContentError> {
        let response = self
            .http
            .get(url)
            .timeout(self.config.fetch_timeout)
            .send()
            .await
            .map_err(|e| ContentError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::Fetch {
                url: url.to_string(),
                reason: format!("status {status}"),
            });
        }

        let mime_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .or_else(|| guess_mime(url))
            .unwrap_or_else(|| self.config.fallback_image_mime.clone());

        let bytes = response.bytes().await.map_err(|e| ContentError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(ResolvedPart::Blob {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }

    async fn resolve_local(&self, path: &str) -> Result<ResolvedPart, ContentError> {
        let mime_type = guess_mime(path)
            .ok_or_else(|| ContentError::Unresolved(format!("no known MIME type for {path}")))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ContentError::Unresolved(format!("{path}: {e}")))?;
        Ok(ResolvedPart::Blob { bytes, mime_type })
    }
}

fn guess_mime(path: &str) -> Option<String> {
    mime_guess::from_path(path).first_raw().map(str::to_string)
}

/// Strict `data:<mime>;base64,<payload>` parse. The MIME type and payload are
/// captured separately; anything else is malformed.
fn decode_data_uri(uri: &str) -> Result<ResolvedPart, ContentError> {
    let rest = uri.strip_prefix("data:").unwrap_or(uri);
    let (mime_type, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| ContentError::InvalidDataUri(offending_prefix(uri)))?;

    if mime_type.is_empty()
        || !mime_type.contains('/')
        || mime_type.chars().any(char::is_whitespace)
    {
        return Err(ContentError::InvalidDataUri(offending_prefix(uri)));
    }

    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| ContentError::InvalidDataUri(format!("{}: {e}", offending_prefix(uri))))?;

    Ok(ResolvedPart::Blob {
        bytes,
        mime_type: mime_type.to_string(),
    })
}

/// Last-resort matcher: a bare base64 payload with no scheme at all.
fn decode_raw_base64(source: &str, fallback_mime: &str) -> Result<ResolvedPart, ContentError> {
    let bytes = BASE64.decode(source.trim()).map_err(|e| {
        ContentError::Unresolved(format!("not a recognized scheme or base64 payload: {e}"))
    })?;
    Ok(ResolvedPart::Blob {
        bytes,
        mime_type: fallback_mime.to_string(),
    })
}

/// Diagnostic prefix naming the offending input without dumping a whole
/// payload into the logs.
fn offending_prefix(source: &str) -> String {
    const LIMIT: usize = 48;
    if source.len() <= LIMIT {
        source.to_string()
    } else {
        let cut = (1..=LIMIT)
            .rev()
            .find(|i| source.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}…", &source[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(config: ResolverConfig) -> ContentResolver {
        ContentResolver::new(reqwest::Client::new(), config)
    }

    #[test]
    fn detection_precedence() {
        assert_eq!(
            SourceKind::detect("gs://bucket/cat.png"),
            SourceKind::ObjectStoreUri
        );
        assert_eq!(
            SourceKind::detect("https://example.com/cat.png"),
            SourceKind::HttpUrl
        );
        assert_eq!(
            SourceKind::detect("http://example.com/cat.png"),
            SourceKind::HttpUrl
        );
        assert_eq!(
            SourceKind::detect("data:image/png;base64,aGk="),
            SourceKind::DataUri
        );
        assert_eq!(SourceKind::detect("aGVsbG8="), SourceKind::RawBase64);
        assert_eq!(
            SourceKind::detect("/definitely/not/a/real/file.png"),
            SourceKind::RawBase64
        );
    }

    #[test]
    fn existing_file_detected_as_local_path() {
        let mut file = tempfile::NamedTempFile::with_suffix(".png").unwrap();
        file.write_all(b"not really a png").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert_eq!(SourceKind::detect(&path), SourceKind::LocalPath);
    }

    #[tokio::test]
    async fn data_uri_round_trips_payload_and_mime() {
        let payload = BASE64.encode(b"pixel data");
        let uri = format!("data:image/png;base64,{payload}");

        let part = resolver(ResolverConfig::default())
            .resolve(&uri)
            .await
            .unwrap();
        assert_eq!(
            part,
            ResolvedPart::Blob {
                bytes: b"pixel data".to_vec(),
                mime_type: "image/png".into(),
            }
        );
    }

    #[tokio::test]
    async fn malformed_data_uri_is_rejected() {
        // Missing the base64 marker entirely.
        let err = resolver(ResolverConfig::default())
            .resolve("data:image/png;base,XYZ")
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::InvalidDataUri(_)));
        assert!(err.to_string().contains("data:image/png;base,XYZ"));

        // Garbage MIME segment.
        let err = resolver(ResolverConfig::default())
            .resolve("data:notamime;base64,aGk=")
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::InvalidDataUri(_)));
    }

    #[tokio::test]
    async fn object_store_uri_passes_through_with_guessed_mime() {
        let part = resolver(ResolverConfig::default())
            .resolve("gs://bucket/images/cat.jpg")
            .await
            .unwrap();
        assert_eq!(
            part,
            ResolvedPart::Uri {
                uri: "gs://bucket/images/cat.jpg".into(),
                mime_type: Some("image/jpeg".into()),
            }
        );
    }

    #[tokio::test]
    async fn http_url_passes_through_by_default() {
        let part = resolver(ResolverConfig::default())
            .resolve("https://example.com/img/dog.webp")
            .await
            .unwrap();
        assert!(matches!(part, ResolvedPart::Uri { ref uri, .. } if uri.contains("dog.webp")));
    }

    #[tokio::test]
    async fn http_url_fetches_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"binary image".to_vec())
                    .insert_header("content-type", "image/png"),
            )
            .mount(&server)
            .await;

        let config = ResolverConfig {
            image_url_mode: ImageUrlMode::Fetch,
            ..ResolverConfig::default()
        };
        let part = resolver(config)
            .resolve(&format!("{}/cat.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(
            part,
            ResolvedPart::Blob {
                bytes: b"binary image".to_vec(),
                mime_type: "image/png".into(),
            }
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_a_recoverable_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = ResolverConfig {
            image_url_mode: ImageUrlMode::Fetch,
            ..ResolverConfig::default()
        };
        let err = resolver(config)
            .resolve(&format!("{}/gone.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Fetch { .. }));
    }

    #[tokio::test]
    async fn local_file_is_read_with_guessed_mime() {
        let mut file = tempfile::NamedTempFile::with_suffix(".gif").unwrap();
        file.write_all(b"GIF89a").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let part = resolver(ResolverConfig::default())
            .resolve(&path)
            .await
            .unwrap();
        assert_eq!(
            part,
            ResolvedPart::Blob {
                bytes: b"GIF89a".to_vec(),
                mime_type: "image/gif".into(),
            }
        );
    }

    #[tokio::test]
    async fn local_file_without_known_mime_is_unresolved() {
        let mut file = tempfile::NamedTempFile::with_suffix(".zzz-unknown").unwrap();
        file.write_all(b"???").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let err = resolver(ResolverConfig::default())
            .resolve(&path)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Unresolved(_)));
    }

    #[tokio::test]
    async fn raw_base64_decodes_with_fallback_mime() {
        let part = resolver(ResolverConfig::default())
            .resolve(&BASE64.encode(b"raw bytes"))
            .await
            .unwrap();
        assert_eq!(
            part,
            ResolvedPart::Blob {
                bytes: b"raw bytes".to_vec(),
                mime_type: "image/png".into(),
            }
        );
    }

    #[tokio::test]
    async fn undecodable_fallback_is_unresolved() {
        let err = resolver(ResolverConfig::default())
            .resolve("certainly not base64!!")
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Unresolved(_)));
    }
}
