#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};
use tablescroll_common::observability::{LogConfig, LogFormat};
use tablescroll_common::{Result, ScrollError, ServiceFailure};
use tablescroll_vision::traits::VisionClient;
use tablescroll_vision::{VisionReply, VisionRequest};

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let log_dir = std::env::temp_dir().join("tablescroll-core-tests");
        let config = LogConfig {
            app_name: "tablescroll-core-tests",
            log_dir: Some(log_dir),
            emit_stderr: false,
            format: LogFormat::Text,
            default_filter: "debug".to_string(),
        };
        tablescroll_common::observability::init_logging(config).unwrap_or_default()
    });
}

pub const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub const CONTINUE_600: &str = "<reasoning>\nAbout 8 rows remain below the scroll bar.\n</reasoning>\n\n<decision>\nCONTINUE\n600px\n</decision>";
pub const CONTINUE_100: &str = "<reasoning>\nAbout 2 rows remain.\n</reasoning>\n<decision>\nCONTINUE\n100px\n</decision>";
pub const STOP: &str = "<reasoning>\nThe scroll bar touches the bottom border.\n</reasoning>\n<decision>\nSTOP\nNONE\n</decision>";

pub fn rows(ids: &[&str]) -> String {
    let body: Vec<String> = ids
        .iter()
        .map(|id| format!("{{\"name\": \"row {id}\", \"audience_id\": \"{id}\"}}"))
        .collect();
    format!("```json\n[{}]\n```", body.join(", "))
}

pub fn service_error(kind: ServiceFailure) -> ScrollError {
    ScrollError::Service {
        kind,
        message: format!("scripted {kind}"),
    }
}

/// Vision double that replays scripted replies in order and keeps every request.
#[derive(Default)]
pub struct ScriptedVision {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<VisionRequest>>,
}

impl ScriptedVision {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| Ok(t.into())))
    }

    pub fn requests(&self) -> Vec<VisionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl VisionClient for ScriptedVision {
    async fn complete(&self, request: &VisionRequest) -> Result<VisionReply> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(service_error(ServiceFailure::Upstream)));
        next.map(|text| VisionReply {
            text,
            model: Some("scripted".into()),
            tokens_used: None,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
