use crate::message::{Part, Role, VisionReply, VisionRequest};
use crate::traits::{VisionClient, VisionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tablescroll_common::Result;
use tablescroll_http::{Auth, HttpClient, RequestOpts};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1/";

pub struct OpenAiClient {
    client: HttpClient,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: ChatContent<'a>,
}

/// Assistant and system turns take plain strings; user turns take parts.
#[derive(Serialize)]
#[serde(untagged)]
enum ChatContent<'a> {
    Plain(String),
    Parts(Vec<ChatPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(api_key, model, OPENAI_API_BASE)
    }

    /// Azure/OpenAI-compatible gateways or a test server.
    pub fn with_base_url(api_key: String, model: String, base_url: &str) -> Result<Self> {
        let client = HttpClient::new(base_url).map_err(VisionError::from)?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl VisionClient for OpenAiClient {
    async fn complete(&self, request: &VisionRequest) -> Result<VisionReply> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: ChatContent::Plain(system.clone()),
            });
        }
        for turn in &request.turns {
            let content = match turn.role {
                Role::Assistant => ChatContent::Plain(turn.text()),
                Role::User => ChatContent::Parts(
                    turn.parts
                        .iter()
                        .map(|part| match part {
                            Part::Text(text) => ChatPart::Text { text },
                            Part::Image(img) => ChatPart::ImageUrl {
                                image_url: ImageUrl {
                                    url: img.data_url(),
                                },
                            },
                        })
                        .collect(),
                ),
            };
            messages.push(ChatMessage {
                role: turn.role.as_str(),
                content,
            });
        }

        let body = ChatRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages,
        };
        let opts = RequestOpts {
            auth: Some(Auth::Bearer(&self.api_key)),
            ..Default::default()
        };

        tracing::debug!(
            model = %self.model,
            turns = request.turns.len(),
            images = request.image_count(),
            "openai.chat.request"
        );
        let resp: ChatResponse = self
            .client
            .post_json("chat/completions", &body, opts)
            .await
            .map_err(VisionError::from)?;

        let text = resp
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(VisionError::EmptyResponse)?;

        Ok(VisionReply {
            text,
            model: resp.model,
            tokens_used: resp.usage.map(|u| u.total_tokens),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
