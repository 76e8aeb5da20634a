//! Loader for `tablescroll.yaml` with environment overlays.
//!
//! Precedence, lowest first: built-in defaults, the YAML file (or inline
//! snippets), then `TABLESCROLL__SECTION__KEY` environment variables. String
//! values may reference `${VAR}`; references are expanded recursively.
//!
//! When `vision.api_key` is still unset after expansion, the provider's
//! conventional variable (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`,
//! `GEMINI_API_KEY`) is consulted.
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tablescroll_common::observability::LogFormat;
use tablescroll_common::{StealthLevel, VisionConfig};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const CONFIG_FILE_NAME: &str = "tablescroll.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablescrollConfig {
    pub vision: VisionConfig,
    pub browser: BrowserSettings,
    pub scroll: ScrollSettings,
    pub oracle: OracleSettings,
    pub extraction: ExtractionSettings,
    pub store: StoreSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    pub stealth: StealthLevel,
    /// Page to open before the run; unset means "use the page already open".
    pub start_url: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: false,
            stealth: StealthLevel::Balanced,
            start_url: None,
        }
    }
}

/// Viewport coordinate in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollSettings {
    /// Upper bound on the post-scroll settle wait.
    pub settle_timeout_ms: u64,
    /// Where to park the pointer so wheel events land on the table.
    pub anchor: Option<Point>,
    /// Waypoints for the pointer glide onto the anchor.
    pub glide_steps: u32,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            settle_timeout_ms: 5_000,
            anchor: None,
            glide_steps: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// Directory of exemplar screenshots (`*.png`, optional `calibration.json`).
    pub calibration_dir: Option<PathBuf>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Pixel amount used when a CONTINUE verdict carries no usable number.
    pub default_continue_px: u32,
    pub max_exemplars: usize,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            calibration_dir: None,
            temperature: 0.5,
            max_tokens: 1024,
            default_continue_px: 100,
            max_exemplars: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Where fresh timestamp-named store files are created.
    pub dir: PathBuf,
    /// Existing store to continue; overrides `dir`.
    pub path: Option<PathBuf>,
    /// Archive every observation frame here when set.
    pub archive_dir: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            path: None,
            archive_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_cycles: u32,
    /// Attempts per cycle before a retryable error aborts the run.
    pub retry_attempts: u32,
    /// Base backoff, multiplied by the attempt number.
    pub retry_backoff_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_cycles: 200,
            retry_attempts: 3,
            retry_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub stderr: bool,
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: None,
            format: LogFormat::Text,
            stderr: true,
            filter: "info".into(),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

fn default_model(provider: &str) -> &'static str {
    match provider {
        "openai" => "gpt-4o",
        "gemini" => "gemini-1.5-pro",
        _ => "claude-3-7-sonnet-20250219",
    }
}

fn provider_key_var(provider: &str) -> &'static str {
    match provider {
        "openai" => "OPENAI_API_KEY",
        "gemini" => "GEMINI_API_KEY",
        _ => "ANTHROPIC_API_KEY",
    }
}

/// Let a partial `vision` section (e.g. only an env-supplied key) resolve to
/// the default provider, and fall back to the provider's usual key variable.
fn fill_vision_defaults(root: &mut Value) {
    let Some(obj) = root.as_object_mut() else {
        return;
    };
    let vision = obj
        .entry("vision")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(vision) = vision.as_object_mut() else {
        return;
    };
    let provider = vision
        .entry("provider")
        .or_insert_with(|| Value::String("anthropic".into()))
        .as_str()
        .unwrap_or("anthropic")
        .to_ascii_lowercase();
    vision
        .entry("model")
        .or_insert_with(|| Value::String(default_model(&provider).into()));

    let missing_key = match vision.get("api_key") {
        Some(Value::String(k)) => k.trim().is_empty() || k.starts_with("${"),
        Some(Value::Null) | None => true,
        Some(_) => false,
    };
    if missing_key {
        if let Ok(key) = std::env::var(provider_key_var(&provider)) {
            vision.insert("api_key".into(), Value::String(key));
        }
    }
}

/// Default config file location: `./tablescroll.yaml`, then
/// `<config dir>/tablescroll/tablescroll.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|d| d.join("tablescroll").join(CONFIG_FILE_NAME))
        .filter(|p| p.is_file())
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct TablescrollConfigLoader {
    files: Vec<(PathBuf, bool)>,
    snippets: Vec<String>,
    env_prefix: String,
}

impl Default for TablescrollConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TablescrollConfigLoader {
    /// Defaults plus `TABLESCROLL__*` environment overrides.
    ///
    /// ```
    /// use tablescroll_config::TablescrollConfigLoader;
    ///
    /// let cfg = TablescrollConfigLoader::new()
    ///     .with_yaml_str("session:\n  max_cycles: 12\n")
    ///     .load()
    ///     .expect("valid config");
    /// assert_eq!(cfg.session.max_cycles, 12);
    /// assert_eq!(cfg.oracle.default_continue_px, 100);
    /// ```
    pub fn new() -> Self {
        Self::with_env_prefix("TABLESCROLL")
    }

    /// Use a different environment prefix; isolates tests from the real one.
    pub fn with_env_prefix(prefix: &str) -> Self {
        Self {
            files: Vec::new(),
            snippets: Vec::new(),
            env_prefix: prefix.to_string(),
        }
    }

    /// Attach a required YAML file.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files.push((path.as_ref().to_path_buf(), true));
        self
    }

    /// Attach a YAML file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files.push((path.as_ref().to_path_buf(), false));
        self
    }

    /// Merge an inline YAML snippet.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.snippets.push(yaml.to_string());
        self
    }

    /// Merge sources, expand `${VAR}` placeholders, and deserialize.
    pub fn load(self) -> Result<TablescrollConfig, ConfigError> {
        let mut builder = Config::builder();
        for (path, required) in &self.files {
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Yaml)
                    .required(*required),
            );
        }
        for snippet in &self.snippets {
            builder = builder.add_source(File::from_str(snippet, FileFormat::Yaml));
        }
        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );
        let cfg = builder.build()?;

        let mut v: Value = cfg.try_deserialize()?;
        if v.is_null() {
            v = Value::Object(Map::new());
        }
        expand_env_in_value(&mut v);
        fill_vision_defaults(&mut v);

        serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("TS_FOO", Some("bar"), || {
            let mut v = json!("prefix-${TS_FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("TS_BAZ", Some("qux")),
                ("TS_BAR", Some("mid-${TS_BAZ}")),
                ("TS_FOO", Some("start-${TS_BAR}-end")),
            ],
            || {
                let mut v = json!({"k": ["X=${TS_FOO}", 3]});
                expand_env_in_value(&mut v);
                assert_eq!(v, json!({"k": ["X=start-mid-qux-end", 3]}));
            },
        );
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("TS_A", Some("${TS_B}")), ("TS_B", Some("${TS_A}"))], || {
            let mut v = json!("x=${TS_A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${TS_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${TS_DOES_NOT_EXIST}"));
    }

    #[test]
    fn partial_vision_section_gets_provider_defaults() {
        temp_env::with_var("OPENAI_API_KEY", Some("sk-env"), || {
            let mut v = json!({"vision": {"provider": "openai"}});
            fill_vision_defaults(&mut v);
            assert_eq!(v["vision"]["model"], "gpt-4o");
            assert_eq!(v["vision"]["api_key"], "sk-env");
        });
    }

    #[test]
    fn explicit_key_is_not_replaced() {
        temp_env::with_var("ANTHROPIC_API_KEY", Some("from-env"), || {
            let mut v = json!({"vision": {"api_key": "from-file"}});
            fill_vision_defaults(&mut v);
            assert_eq!(v["vision"]["provider"], "anthropic");
            assert_eq!(v["vision"]["api_key"], "from-file");
        });
    }
}
