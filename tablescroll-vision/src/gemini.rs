use crate::message::{Part, Role, VisionReply, VisionRequest};
use crate::traits::{VisionClient, VisionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tablescroll_common::{Result, ScrollError, ServiceFailure};
use tablescroll_http::{Auth, HttpClient, RequestOpts};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'static str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    total_token_count: Option<u32>,
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    client: HttpClient,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(api_key, model, GEMINI_BASE_URL)
    }

    pub fn with_base_url(api_key: String, model: String, base_url: &str) -> Result<Self> {
        let client = HttpClient::new(base_url).map_err(VisionError::from)?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

#[async_trait]
impl VisionClient for GeminiClient {
    async fn complete(&self, request: &VisionRequest) -> Result<VisionReply> {
        let contents = request
            .turns
            .iter()
            .map(|turn| GeminiContent {
                role: Some(role_name(turn.role)),
                parts: turn
                    .parts
                    .iter()
                    .map(|part| match part {
                        Part::Text(text) => GeminiPart::Text { text },
                        Part::Image(img) => GeminiPart::Inline {
                            inline_data: InlineData {
                                mime_type: img.media_type.as_mime(),
                                data: &img.base64,
                            },
                        },
                    })
                    .collect(),
            })
            .collect();

        let body = GeminiRequest {
            contents,
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
            system_instruction: request.system.as_deref().map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart::Text { text }],
            }),
        };

        let path = format!("models/{}:generateContent", self.model);
        let opts = RequestOpts {
            auth: Some(Auth::Query {
                name: "key",
                value: Cow::Borrowed(self.api_key.as_str()),
            }),
            ..Default::default()
        };

        tracing::debug!(
            model = %self.model,
            turns = request.turns.len(),
            images = request.image_count(),
            "gemini.generate.request"
        );
        let resp: GeminiResponse = self
            .client
            .post_json(&path, &body, opts)
            .await
            .map_err(VisionError::from)?;

        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or(VisionError::EmptyResponse)?;
        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(ScrollError::Service {
                kind: ServiceFailure::BadRequest,
                message: "content blocked by Gemini safety filters".into(),
            });
        }
        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|t| !t.trim().is_empty())
            .ok_or(VisionError::EmptyResponse)?;

        Ok(VisionReply {
            text,
            model: Some(self.model.clone()),
            tokens_used: resp.usage_metadata.and_then(|u| u.total_token_count),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
