//! Stop/continue verdicts and the tagged answer grammar.
//!
//! ```text
//! <reasoning>free text</reasoning>
//! <decision>
//! CONTINUE | STOP
//! <n>px | NONE
//! </decision>
//! ```

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::OnceLock;
use tablescroll_common::ScrollError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Continue,
    Stop,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Continue => "CONTINUE",
            Decision::Stop => "STOP",
        })
    }
}

/// A judgment about whether the end of the table has been reached.
///
/// `scroll_px` is `Some(n > 0)` exactly when the decision is CONTINUE; the
/// constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopVerdict {
    decision: Decision,
    scroll_px: Option<NonZeroU32>,
    rationale: String,
}

impl StopVerdict {
    pub fn cont(scroll_px: NonZeroU32, rationale: impl Into<String>) -> Self {
        Self {
            decision: Decision::Continue,
            scroll_px: Some(scroll_px),
            rationale: rationale.into(),
        }
    }

    pub fn stop(rationale: impl Into<String>) -> Self {
        Self {
            decision: Decision::Stop,
            scroll_px: None,
            rationale: rationale.into(),
        }
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn scroll_px(&self) -> Option<u32> {
        self.scroll_px.map(NonZeroU32::get)
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn is_stop(&self) -> bool {
        self.decision == Decision::Stop
    }

    /// Render in the tagged grammar, as used for calibration answers.
    pub fn to_tagged(&self) -> String {
        let value = match self.scroll_px {
            Some(px) => format!("{px}px"),
            None => "NONE".to_string(),
        };
        format!(
            "<reasoning>\n{}\n</reasoning>\n\n<decision>\n{}\n{}\n</decision>",
            self.rationale.trim(),
            self.decision,
            value
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerdictParseError {
    #[error("response has no <reasoning> section")]
    MissingReasoning,
    #[error("response has no <decision> section")]
    MissingDecision,
    #[error("<decision> section is empty")]
    EmptyDecision,
    #[error("unknown decision token `{0}`")]
    UnknownDecision(String),
}

impl From<VerdictParseError> for ScrollError {
    fn from(err: VerdictParseError) -> Self {
        ScrollError::OracleParse(err.to_string())
    }
}

/// Tolerated deviations, reported alongside the verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictAnomaly {
    /// CONTINUE without a usable pixel amount; the default was substituted.
    DefaultedScroll { raw: Option<String>, used: u32 },
    /// STOP with something other than NONE on the value line.
    StopWithValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVerdict {
    pub verdict: StopVerdict,
    pub anomalies: Vec<VerdictAnomaly>,
}

pub trait VerdictParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<ParsedVerdict, VerdictParseError>;
}

fn section(name: &'static str) -> &'static Regex {
    static REASONING: OnceLock<Regex> = OnceLock::new();
    static DECISION: OnceLock<Regex> = OnceLock::new();
    let cell = if name == "reasoning" { &REASONING } else { &DECISION };
    cell.get_or_init(|| {
        Regex::new(&format!(r"(?s)<{name}>(.*?)</{name}>"))
            .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

fn pixel_value() -> &'static Regex {
    static PX: OnceLock<Regex> = OnceLock::new();
    PX.get_or_init(|| {
        Regex::new(r"(\d+)\s*px").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

/// Parser for the `<reasoning>`/`<decision>` grammar.
#[derive(Debug, Clone)]
pub struct TaggedVerdictParser {
    default_continue_px: NonZeroU32,
}

impl TaggedVerdictParser {
    pub const DEFAULT_CONTINUE_PX: u32 = 100;

    pub fn new(default_continue_px: u32) -> Self {
        let fallback = NonZeroU32::MIN.saturating_add(Self::DEFAULT_CONTINUE_PX - 1);
        Self {
            default_continue_px: NonZeroU32::new(default_continue_px).unwrap_or(fallback),
        }
    }
}

impl Default for TaggedVerdictParser {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CONTINUE_PX)
    }
}

impl VerdictParser for TaggedVerdictParser {
    fn parse(&self, text: &str) -> Result<ParsedVerdict, VerdictParseError> {
        let reasoning = section("reasoning")
            .captures(text)
            .and_then(|c| c.get(1))
            .ok_or(VerdictParseError::MissingReasoning)?
            .as_str()
            .trim();
        let decision_body = section("decision")
            .captures(text)
            .and_then(|c| c.get(1))
            .ok_or(VerdictParseError::MissingDecision)?
            .as_str();

        let mut lines = decision_body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty());
        let token = lines.next().ok_or(VerdictParseError::EmptyDecision)?;
        let value = lines.next();

        let mut anomalies = Vec::new();
        let verdict = match token {
            "CONTINUE" => {
                let parsed = value
                    .and_then(|v| pixel_value().captures(v))
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .and_then(NonZeroU32::new);
                let px = match parsed {
                    Some(px) => px,
                    None => {
                        anomalies.push(VerdictAnomaly::DefaultedScroll {
                            raw: value.map(str::to_string),
                            used: self.default_continue_px.get(),
                        });
                        self.default_continue_px
                    }
                };
                StopVerdict::cont(px, reasoning)
            }
            "STOP" => {
                if let Some(v) = value.filter(|v| *v != "NONE") {
                    anomalies.push(VerdictAnomaly::StopWithValue(v.to_string()));
                }
                StopVerdict::stop(reasoning)
            }
            other => return Err(VerdictParseError::UnknownDecision(other.to_string())),
        };

        Ok(ParsedVerdict { verdict, anomalies })
    }
}
