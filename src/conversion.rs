use crate::content::{ContentResolver, ResolvedPart};
use crate::error::ProxyError;
use crate::models::chat::{ChatCompletionRequest, ContentPart, MessageContent, Role};
use crate::models::gemini::{
    Blob, Content, FileData, GenerateContentRequest, GenerationConfig, GeminiRole, Part,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Deployment policy for request translation, fixed at startup.
#[derive(Debug, Clone)]
pub struct TranslationPolicy {
    /// Reject image content on non-user roles instead of silently dropping
    /// the image parts. On unless the deployment opts out.
    pub strict_multimodal_roles: bool,
    /// Request-independent generation defaults. `None` means the backend's
    /// own defaults apply; nothing is invented locally.
    pub defaults: Option<GenerationDefaults>,
}

impl Default for TranslationPolicy {
    fn default() -> Self {
        Self {
            strict_multimodal_roles: true,
            defaults: None,
        }
    }
}

/// Optional request-independent generation defaults, applied only where the
/// request leaves a field unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationDefaults {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_output_tokens: Option<u32>,
}

/// Everything the backend call needs, produced from one chat request.
#[derive(Debug, Clone)]
pub struct TranslatedRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub generation_config: Option<GenerationConfig>,
}

impl TranslatedRequest {
    /// Assemble the native request envelope.
    pub fn into_native(self) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: self.system_instruction.map(|text| Content {
                role: None,
                parts: vec![Part::Text { text }],
            }),
            contents: self.contents,
            generation_config: self.generation_config,
        }
    }
}

/// Convert an OpenAI Chat Completions request into the native call shape.
///
/// Mapping highlights:
/// - `system` messages become the system instruction (last occurrence wins)
///   and are never emitted as turns.
/// - `assistant` maps to the native `model` role; every other non-system
///   role maps to `user`.
/// - String content becomes a single text part; part lists are resolved item
///   by item, with unresolvable image parts dropped rather than failing the
///   request.
/// - Messages with empty/absent content, and turns left with zero parts, are
///   omitted entirely.
/// - Sampling parameters are forwarded only when present; configured
///   defaults fill the gaps, request values always win.
pub async fn to_generate_request(
    src: &ChatCompletionRequest,
    resolver: &ContentResolver,
    policy: &TranslationPolicy,
) -> Result<TranslatedRequest, ProxyError> {
    if src.messages.is_empty() {
        return Err(ProxyError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }

    let mut system_instruction: Option<String> = None;
    let mut contents: Vec<Content> = Vec::new();

    for message in &src.messages {
        let content = match &message.content {
            Some(content) if !content.is_empty() => content,
            _ => continue,
        };

        if message.role == Role::System {
            system_instruction = Some(system_text(content));
            continue;
        }

        let role = native_role(message.role);
        let parts = match content {
            MessageContent::Text(text) => vec![Part::Text { text: text.clone() }],
            MessageContent::Parts(items) => {
                if role != GeminiRole::User {
                    non_user_parts(message.role, items, policy)?
                } else {
                    resolve_parts(items, resolver).await
                }
            }
        };

        if parts.is_empty() {
            tracing::debug!(role = message.role.as_str(), "omitting turn with no parts");
            continue;
        }
        contents.push(Content {
            role: Some(role),
            parts,
        });
    }

    if contents.is_empty() {
        return Err(ProxyError::EmptyConversation);
    }

    Ok(TranslatedRequest {
        system_instruction,
        contents,
        generation_config: generation_config(src, policy.defaults),
    })
}

fn native_role(role: Role) -> GeminiRole {
    match role {
        Role::Assistant => GeminiRole::Model,
        // The native surface only has user/model; everything else is user.
        _ => GeminiRole::User,
    }
}

/// System content may arrive as a string or a part list; only its text
/// contributes to the instruction.
fn system_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(items) => {
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| match item {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect();
            texts.join("\n")
        }
    }
}

/// Image parts are only legal on user turns. Strict policy rejects them
/// elsewhere; lenient policy keeps the text and drops the images.
fn non_user_parts(
    role: Role,
    items: &[ContentPart],
    policy: &TranslationPolicy,
) -> Result<Vec<Part>, ProxyError> {
    let has_images = items
        .iter()
        .any(|item| matches!(item, ContentPart::ImageUrl { .. }));
    if has_images && policy.strict_multimodal_roles {
        return Err(ProxyError::InvalidRoleContent(role.as_str()));
    }

    let mut parts = Vec::new();
    for item in items {
        match item {
            ContentPart::Text { text } if !text.is_empty() => {
                parts.push(Part::Text { text: text.clone() });
            }
            ContentPart::Text { .. } => {}
            ContentPart::ImageUrl { image_url } => {
                tracing::warn!(
                    role = role.as_str(),
                    url = %image_url.url,
                    "dropping image part on non-user role"
                );
            }
        }
    }
    Ok(parts)
}

async fn resolve_parts(items: &[ContentPart], resolver: &ContentResolver) -> Vec<Part> {
    let mut parts = Vec::new();
    for item in items {
        match item {
            ContentPart::Text { text } if !text.is_empty() => {
                parts.push(Part::Text { text: text.clone() });
            }
            ContentPart::Text { .. } => {}
            ContentPart::ImageUrl { image_url } => {
                match resolver.resolve(&image_url.url).await {
                    Ok(resolved) => parts.push(native_part(resolved)),
                    // Partial-failure policy: one bad image never aborts the
                    // sibling items in the same message.
                    Err(err) => {
                        tracing::warn!(error = %err, "dropping unresolvable image part");
                    }
                }
            }
        }
    }
    parts
}

fn native_part(resolved: ResolvedPart) -> Part {
    match resolved {
        ResolvedPart::Text(text) => Part::Text { text },
        ResolvedPart::Blob { bytes, mime_type } => Part::InlineData {
            inline_data: Blob {
                mime_type,
                data: BASE64.encode(bytes),
            },
        },
        ResolvedPart::Uri { uri, mime_type } => Part::FileData {
            file_data: FileData {
                mime_type,
                file_uri: uri,
            },
        },
    }
}

fn generation_config(
    src: &ChatCompletionRequest,
    defaults: Option<GenerationDefaults>,
) -> Option<GenerationConfig> {
    let defaults = defaults.unwrap_or_default();
    let config = GenerationConfig {
        temperature: src.temperature.or(defaults.temperature),
        top_p: src.top_p.or(defaults.top_p),
        max_output_tokens: src.max_output_tokens.or(defaults.max_output_tokens),
    };
    if config.is_empty() {
        None
    } else {
        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ResolverConfig;
    use crate::models::chat::{ChatMessage, ImageUrl};

    fn resolver() -> ContentResolver {
        ContentResolver::new(reqwest::Client::new(), ResolverConfig::default())
    }

    fn text_message(role: Role, text: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: Some(MessageContent::Text(text.to_string())),
        }
    }

    fn request(messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gemini-2.5-pro".into(),
            messages,
            temperature: None,
            top_p: None,
            max_output_tokens: None,
            stream: false,
        }
    }

    #[tokio::test]
    async fn maps_roles_and_captures_system_instruction() {
        let req = request(vec![
            text_message(Role::System, "Be terse."),
            text_message(Role::User, "Hello"),
            text_message(Role::Assistant, "Hi!"),
            text_message(Role::Tool, "lookup result"),
        ]);

        let out = to_generate_request(&req, &resolver(), &TranslationPolicy::default())
            .await
            .unwrap();

        assert_eq!(out.system_instruction.as_deref(), Some("Be terse."));
        let roles: Vec<_> = out.contents.iter().map(|c| c.role).collect();
        assert_eq!(
            roles,
            vec![
                Some(GeminiRole::User),
                Some(GeminiRole::Model),
                Some(GeminiRole::User)
            ]
        );
        // The system message never shows up as a turn, so no model turn can
        // precede the first user turn here.
        assert_eq!(out.contents[0].parts, vec![Part::Text {
            text: "Hello".into()
        }]);
    }

    #[tokio::test]
    async fn last_system_message_wins() {
        let req = request(vec![
            text_message(Role::System, "First instruction"),
            text_message(Role::User, "Hello"),
            text_message(Role::System, "Second instruction"),
        ]);

        let out = to_generate_request(&req, &resolver(), &TranslationPolicy::default())
            .await
            .unwrap();
        assert_eq!(out.system_instruction.as_deref(), Some("Second instruction"));
        assert_eq!(out.contents.len(), 1);
    }

    #[tokio::test]
    async fn empty_and_absent_content_is_skipped() {
        let req = request(vec![
            ChatMessage {
                role: Role::User,
                content: None,
            },
            text_message(Role::User, ""),
            text_message(Role::User, "real message"),
        ]);

        let out = to_generate_request(&req, &resolver(), &TranslationPolicy::default())
            .await
            .unwrap();
        assert_eq!(out.contents.len(), 1);
    }

    #[tokio::test]
    async fn zero_messages_is_invalid_request() {
        let req = request(vec![]);
        let err = to_generate_request(&req, &resolver(), &TranslationPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn system_only_conversation_is_empty() {
        let req = request(vec![text_message(Role::System, "Be helpful.")]);
        let err = to_generate_request(&req, &resolver(), &TranslationPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::EmptyConversation));
    }

    #[tokio::test]
    async fn resolves_data_uri_into_inline_data() {
        let payload = BASE64.encode(b"tiny png");
        let req = request(vec![ChatMessage {
            role: Role::User,
            content: Some(MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "what is this?".into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{payload}"),
                    },
                },
            ])),
        }]);

        let out = to_generate_request(&req, &resolver(), &TranslationPolicy::default())
            .await
            .unwrap();
        assert_eq!(out.contents.len(), 1);
        assert_eq!(out.contents[0].parts.len(), 2);
        match &out.contents[0].parts[1] {
            Part::InlineData { inline_data } => {
                assert_eq!(inline_data.mime_type, "image/png");
                assert_eq!(inline_data.data, payload);
            }
            other => panic!("expected inline data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_image_part_is_dropped_but_message_survives() {
        let req = request(vec![ChatMessage {
            role: Role::User,
            content: Some(MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "still here".into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "data:image/png;base,broken".into(),
                    },
                },
            ])),
        }]);

        let out = to_generate_request(&req, &resolver(), &TranslationPolicy::default())
            .await
            .unwrap();
        assert_eq!(out.contents[0].parts, vec![Part::Text {
            text: "still here".into()
        }]);
    }

    #[tokio::test]
    async fn message_with_only_a_bad_image_is_omitted() {
        let req = request(vec![
            ChatMessage {
                role: Role::User,
                content: Some(MessageContent::Parts(vec![ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "data:image/png;base,broken".into(),
                    },
                }])),
            },
            text_message(Role::User, "valid turn"),
        ]);

        let out = to_generate_request(&req, &resolver(), &TranslationPolicy::default())
            .await
            .unwrap();
        assert_eq!(out.contents.len(), 1);
        assert_eq!(out.contents[0].parts, vec![Part::Text {
            text: "valid turn".into()
        }]);
    }

    #[tokio::test]
    async fn strict_policy_rejects_assistant_image_content() {
        let policy = TranslationPolicy::default();
        let req = request(vec![
            text_message(Role::User, "look"),
            ChatMessage {
                role: Role::Assistant,
                content: Some(MessageContent::Parts(vec![ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "gs://bucket/cat.png".into(),
                    },
                }])),
            },
        ]);

        let err = to_generate_request(&req, &resolver(), &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRoleContent("assistant")));
    }

    #[tokio::test]
    async fn lenient_policy_keeps_text_and_drops_images() {
        let policy = TranslationPolicy {
            strict_multimodal_roles: false,
            defaults: None,
        };
        let req = request(vec![ChatMessage {
            role: Role::Assistant,
            content: Some(MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "caption".into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "gs://bucket/cat.png".into(),
                    },
                },
            ])),
        }]);

        let out = to_generate_request(&req, &resolver(), &policy).await.unwrap();
        assert_eq!(out.contents[0].role, Some(GeminiRole::Model));
        assert_eq!(out.contents[0].parts, vec![Part::Text {
            text: "caption".into()
        }]);
    }

    #[tokio::test]
    async fn generation_parameters_forward_verbatim() {
        let mut req = request(vec![text_message(Role::User, "hi")]);
        req.temperature = Some(0.2);
        req.max_output_tokens = Some(1024);

        let out = to_generate_request(&req, &resolver(), &TranslationPolicy::default())
            .await
            .unwrap();
        let config = out.generation_config.unwrap();
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.top_p, None);
        assert_eq!(config.max_output_tokens, Some(1024));
    }

    #[tokio::test]
    async fn absent_parameters_yield_no_config() {
        let req = request(vec![text_message(Role::User, "hi")]);
        let out = to_generate_request(&req, &resolver(), &TranslationPolicy::default())
            .await
            .unwrap();
        assert!(out.generation_config.is_none());
    }

    #[tokio::test]
    async fn configured_defaults_fill_gaps_but_never_override() {
        let policy = TranslationPolicy {
            strict_multimodal_roles: true,
            defaults: Some(GenerationDefaults {
                temperature: Some(1.0),
                top_p: Some(0.95),
                max_output_tokens: Some(8192),
            }),
        };
        let mut req = request(vec![text_message(Role::User, "hi")]);
        req.temperature = Some(0.3);

        let out = to_generate_request(&req, &resolver(), &policy).await.unwrap();
        let config = out.generation_config.unwrap();
        assert_eq!(config.temperature, Some(0.3));
        assert_eq!(config.top_p, Some(0.95));
        assert_eq!(config.max_output_tokens, Some(8192));
    }

    #[test]
    fn into_native_wraps_system_instruction() {
        let translated = TranslatedRequest {
            system_instruction: Some("Be brief.".into()),
            contents: vec![Content {
                role: Some(GeminiRole::User),
                parts: vec![Part::Text { text: "hi".into() }],
            }],
            generation_config: None,
        };

        let native = translated.into_native();
        let instruction = native.system_instruction.unwrap();
        assert_eq!(instruction.role, None);
        assert_eq!(instruction.parts, vec![Part::Text {
            text: "Be brief.".into()
        }]);
    }
}
