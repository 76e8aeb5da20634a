use std::sync::OnceLock;

use tablescroll_common::observability::{LogConfig, LogFormat};

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let log_dir = std::env::temp_dir().join("tablescroll-tests");
        let config = LogConfig {
            app_name: "tablescroll-tests",
            log_dir: Some(log_dir),
            emit_stderr: true,
            format: LogFormat::Text,
            default_filter: "debug".to_string(),
        };
        tablescroll_common::observability::init_logging(config).unwrap_or_default()
    });
}

/// Smallest base64 payload that sniffs as PNG.
pub const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";
