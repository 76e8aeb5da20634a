//! Multimodal judgment/extraction backends.
//!
//! A [`traits::VisionClient`] takes a [`message::VisionRequest`] made of
//! text and base64 image parts and returns the model's text. Provider
//! failures surface as [`tablescroll_common::ScrollError::Service`] so the
//! driving loop can decide retry versus abort.
//!
//! ```no_run
//! use tablescroll_common::{Result, VisionConfig};
//! use tablescroll_vision::connect;
//!
//! # fn main() -> Result<()> {
//! let client = connect(&VisionConfig::default())?;
//! assert!(!client.model_name().is_empty());
//! # Ok(())
//! # }
//! ```
pub mod anthropic;
pub mod gemini;
pub mod message;
pub mod openai;
pub mod traits;

use anthropic::AnthropicClient;
use gemini::GeminiClient;
use openai::OpenAiClient;
use std::sync::Arc;
use tablescroll_common::{Result, VisionConfig};
use traits::VisionClient;

pub use message::{ImageData, MediaType, Part, Role, Turn, VisionReply, VisionRequest};
pub use traits::VisionError;

/// Build the configured provider client.
///
/// Fails with a configuration error when the selected provider has no usable
/// API key.
pub fn connect(config: &VisionConfig) -> Result<Arc<dyn VisionClient>> {
    let api_key = config.require_api_key()?;
    let model = config.model().to_string();
    let base_url = config.base_url();
    let client: Arc<dyn VisionClient> = match config {
        VisionConfig::Anthropic { .. } => Arc::new(match base_url {
            Some(url) => AnthropicClient::with_base_url(api_key, model, url)?,
            None => AnthropicClient::new(api_key, model)?,
        }),
        VisionConfig::OpenAi { .. } => Arc::new(match base_url {
            Some(url) => OpenAiClient::with_base_url(api_key.to_string(), model, url)?,
            None => OpenAiClient::new(api_key.to_string(), model)?,
        }),
        VisionConfig::Gemini { .. } => Arc::new(match base_url {
            Some(url) => GeminiClient::with_base_url(api_key.to_string(), model, url)?,
            None => GeminiClient::new(api_key.to_string(), model)?,
        }),
    };
    tracing::info!(
        provider = config.provider(),
        model = client.model_name(),
        "vision.client.ready"
    );
    Ok(client)
}
