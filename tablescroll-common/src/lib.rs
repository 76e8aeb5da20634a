//! Common types shared across the tablescroll crates.
//!
//! This crate holds the error taxonomy every layer reports into, the
//! provider-agnostic vision service configuration, and the logging
//! initialiser. It stays dependency-light so the driver, vision, and core
//! crates can all depend on it.
//!
//! # Overview
//!
//! - [`ScrollError`] and [`Result`]: the error taxonomy surfaced to the
//!   driving loop
//! - [`ServiceFailure`]: classification of judgment/extraction service failures
//! - [`VisionConfig`]: which vision-capable model backend to talk to
//! - [`StealthLevel`]: how aggressively the browser hides automation signals
//! - [`observability`]: centralised tracing/logging initialisation
//!
//! # Examples
//!
//! ```rust
//! use tablescroll_common::{ScrollError, ServiceFailure};
//!
//! let err = ScrollError::Service {
//!     kind: ServiceFailure::RateLimit,
//!     message: "slow down".into(),
//! };
//! assert!(err.is_retryable());
//! assert!(!ScrollError::Config("no api key".into()).is_retryable());
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub mod observability;

/// Configuration for the vision-capable model used as stop oracle and
/// extraction service.
///
/// The tag is `provider`; see the `tablescroll-vision` crate for the clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum VisionConfig {
    Anthropic {
        model: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    #[serde(rename = "openai")]
    OpenAi {
        model: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    Gemini {
        model: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self::Anthropic {
            model: "claude-3-7-sonnet-20250219".to_string(),
            api_key: None,
            base_url: None,
        }
    }
}

impl VisionConfig {
    /// Provider name as used in logs and config files.
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Anthropic { .. } => "anthropic",
            Self::OpenAi { .. } => "openai",
            Self::Gemini { .. } => "gemini",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Anthropic { model, .. }
            | Self::OpenAi { model, .. }
            | Self::Gemini { model, .. } => model,
        }
    }

    /// Return the API key, or a configuration error naming the provider.
    pub fn require_api_key(&self) -> Result<&str> {
        let key = match self {
            Self::Anthropic { api_key, .. }
            | Self::OpenAi { api_key, .. }
            | Self::Gemini { api_key, .. } => api_key.as_deref(),
        };
        match key.map(str::trim) {
            Some(k) if !k.is_empty() && !k.starts_with("${") => Ok(k),
            _ => Err(ScrollError::Config(format!(
                "no API key configured for vision provider `{}`",
                self.provider()
            ))),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        match self {
            Self::Anthropic { base_url, .. }
            | Self::OpenAi { base_url, .. }
            | Self::Gemini { base_url, .. } => base_url.as_deref(),
        }
    }
}

/// Browser automation stealth level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StealthLevel {
    Lightweight,
    #[default]
    Balanced,
    Maximum,
}

/// Why a call to the judgment/extraction service failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceFailure {
    /// Credentials rejected (401/403).
    Auth,
    /// Throttled by the provider (429).
    RateLimit,
    /// The provider rejected the request shape (4xx).
    BadRequest,
    /// Provider-side failure (5xx) or an unusable upstream answer.
    Upstream,
    /// Transport failure before a response arrived.
    Network,
    /// The response envelope could not be decoded.
    Decode,
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::BadRequest => "bad_request",
            Self::Upstream => "upstream",
            Self::Network => "network",
            Self::Decode => "decode",
        };
        f.write_str(s)
    }
}

/// Error taxonomy surfaced to the driving loop.
///
/// The loop decides retry versus abort using [`ScrollError::is_retryable`].
#[derive(thiserror::Error, Debug)]
pub enum ScrollError {
    /// Wheel, pointer, or screenshot dispatch failed at the control layer.
    #[error("device error: {0}")]
    Device(String),

    /// The judgment response lacked the required tagged structure.
    #[error("oracle response could not be parsed: {0}")]
    OracleParse(String),

    /// The judgment or extraction service failed (auth, rate limit, upstream).
    #[error("vision service error ({kind}): {message}")]
    Service {
        kind: ServiceFailure,
        message: String,
    },

    /// The structured payload in an extraction response was missing or malformed.
    #[error("extraction payload could not be parsed: {0}")]
    ExtractionParse(String),

    /// A pre-existing result store could not be read back.
    #[error("result store {} is corrupt: {reason}", path.display())]
    StoreCorruption { path: PathBuf, reason: String },

    /// Persisting the result store failed; the previous file is untouched.
    #[error("result store write failed: {0}")]
    Store(String),

    /// Credentials, paths, or other settings are missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ScrollError {
    /// Whether the driving loop may retry the cycle (from a fresh frame).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Device(_) | Self::OracleParse(_) | Self::ExtractionParse(_) => true,
            Self::Service { kind, .. } => matches!(
                kind,
                ServiceFailure::RateLimit | ServiceFailure::Upstream | ServiceFailure::Network
            ),
            Self::StoreCorruption { .. } | Self::Store(_) | Self::Config(_) => false,
        }
    }

    /// Shorthand for a device failure with a formatted message.
    pub fn device(msg: impl fmt::Display) -> Self {
        Self::Device(msg.to_string())
    }
}

/// Convenient alias for results that use [`ScrollError`].
pub type Result<T> = std::result::Result<T, ScrollError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_config_reads_provider_tag() {
        let cfg: VisionConfig = serde_json::from_value(serde_json::json!({
            "provider": "openai",
            "model": "gpt-4o",
            "api_key": "sk-test"
        }))
        .unwrap();
        assert_eq!(cfg.provider(), "openai");
        assert_eq!(cfg.model(), "gpt-4o");
        assert_eq!(cfg.require_api_key().unwrap(), "sk-test");
        assert!(cfg.base_url().is_none());
    }

    #[test]
    fn missing_or_unexpanded_key_is_a_config_error() {
        let missing = VisionConfig::default();
        assert!(matches!(
            missing.require_api_key(),
            Err(ScrollError::Config(_))
        ));

        let unexpanded = VisionConfig::Gemini {
            model: "gemini-1.5-flash".into(),
            api_key: Some("${GEMINI_API_KEY}".into()),
            base_url: None,
        };
        assert!(matches!(
            unexpanded.require_api_key(),
            Err(ScrollError::Config(_))
        ));
    }

    #[test]
    fn retry_classification() {
        assert!(ScrollError::device("wheel lost").is_retryable());
        assert!(ScrollError::OracleParse("no tags".into()).is_retryable());
        assert!(!ScrollError::Service {
            kind: ServiceFailure::Auth,
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!ScrollError::StoreCorruption {
            path: PathBuf::from("x.json"),
            reason: "eof".into()
        }
        .is_retryable());
    }
}
