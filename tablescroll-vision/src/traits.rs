use crate::message::{Turn, VisionReply, VisionRequest};
use async_trait::async_trait;
use reqwest::StatusCode;
use tablescroll_common::{Result, ScrollError, ServiceFailure};
use tablescroll_http::HttpError;

/// Provider-level failures, translated into [`ScrollError::Service`] at the
/// trait boundary.
#[derive(thiserror::Error, Debug)]
pub enum VisionError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("response contained no text content")]
    EmptyResponse,

    #[error("client init failed: {0}")]
    Init(String),
}

impl VisionError {
    pub fn failure_kind(&self) -> ServiceFailure {
        match self {
            VisionError::Http(HttpError::Api { status, .. }) => classify_status(*status),
            VisionError::Http(HttpError::Network(_)) => ServiceFailure::Network,
            VisionError::Http(HttpError::Decode(..)) | VisionError::EmptyResponse => {
                ServiceFailure::Decode
            }
            VisionError::Http(HttpError::Url(_) | HttpError::Build(_)) | VisionError::Init(_) => {
                ServiceFailure::BadRequest
            }
        }
    }
}

fn classify_status(status: StatusCode) -> ServiceFailure {
    match status.as_u16() {
        401 | 403 => ServiceFailure::Auth,
        429 => ServiceFailure::RateLimit,
        500..=599 => ServiceFailure::Upstream,
        _ => ServiceFailure::BadRequest,
    }
}

impl From<VisionError> for ScrollError {
    fn from(err: VisionError) -> Self {
        ScrollError::Service {
            kind: err.failure_kind(),
            message: err.to_string(),
        }
    }
}

/// A multimodal completion backend: text and images in, text out.
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn complete(&self, request: &VisionRequest) -> Result<VisionReply>;

    fn model_name(&self) -> &str;

    /// Minimal text round-trip. Failures are reported as `Ok(false)`.
    async fn health_check(&self) -> Result<bool> {
        let req = VisionRequest::new(vec![Turn::user_text("Respond with just 'OK'")])
            .with_max_tokens(5)
            .with_temperature(0.0);
        match self.complete(&req).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(model = self.model_name(), error = %e, "vision.health_check.failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> VisionError {
        VisionError::Http(HttpError::Api {
            status: StatusCode::from_u16(status).unwrap(),
            message: "x".into(),
            request_id: "-".into(),
        })
    }

    #[test]
    fn statuses_map_onto_service_failures() {
        assert_eq!(api(401).failure_kind(), ServiceFailure::Auth);
        assert_eq!(api(403).failure_kind(), ServiceFailure::Auth);
        assert_eq!(api(429).failure_kind(), ServiceFailure::RateLimit);
        assert_eq!(api(400).failure_kind(), ServiceFailure::BadRequest);
        assert_eq!(api(529).failure_kind(), ServiceFailure::Upstream);
    }

    #[test]
    fn translated_errors_keep_retry_semantics() {
        let auth: ScrollError = api(401).into();
        assert!(!auth.is_retryable());
        let overloaded: ScrollError = api(503).into();
        assert!(overloaded.is_retryable());
        let net: ScrollError = VisionError::Http(HttpError::Network("reset".into())).into();
        assert!(net.is_retryable());
    }
}
