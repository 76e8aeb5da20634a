use crate::message::{Part, VisionReply, VisionRequest};
use crate::traits::{VisionClient, VisionError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tablescroll_common::Result;
use tablescroll_http::{Auth, HttpClient, RequestOpts};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1/";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: HttpClient,
    api_key: HeaderValue,
    model: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: String) -> Result<Self> {
        Self::with_base_url(api_key, model, ANTHROPIC_API_BASE)
    }

    /// Point the client at a proxy or test server.
    pub fn with_base_url(api_key: &str, model: String, base_url: &str) -> Result<Self> {
        let client = HttpClient::new(base_url).map_err(VisionError::from)?;
        let api_key = HeaderValue::from_str(api_key.trim())
            .map_err(|e| VisionError::Init(format!("invalid Anthropic API key: {e}")))?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl VisionClient for AnthropicClient {
    async fn complete(&self, request: &VisionRequest) -> Result<VisionReply> {
        let messages = request
            .turns
            .iter()
            .map(|turn| Message {
                role: turn.role.as_str(),
                content: turn
                    .parts
                    .iter()
                    .map(|part| match part {
                        Part::Text(text) => ContentBlock::Text { text },
                        Part::Image(img) => ContentBlock::Image {
                            source: ImageSource {
                                kind: "base64",
                                media_type: img.media_type.as_mime(),
                                data: &img.base64,
                            },
                        },
                    })
                    .collect(),
            })
            .collect();

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.as_deref(),
            messages,
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        let opts = RequestOpts {
            auth: Some(Auth::Header {
                name: HeaderName::from_static("x-api-key"),
                value: self.api_key.clone(),
            }),
            headers: Some(headers),
            ..Default::default()
        };

        tracing::debug!(
            model = %self.model,
            turns = request.turns.len(),
            images = request.image_count(),
            "anthropic.messages.request"
        );
        let resp: MessagesResponse = self
            .client
            .post_json("messages", &body, opts)
            .await
            .map_err(VisionError::from)?;

        let text = resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Err(VisionError::EmptyResponse.into());
        }

        Ok(VisionReply {
            text,
            model: resp.model,
            tokens_used: resp.usage.map(|u| u.input_tokens + u.output_tokens),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
