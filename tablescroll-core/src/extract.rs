//! Extraction of visible table rows and their merge into the result store.

use crate::frame::ObservationFrame;
use crate::store::{MergeReport, ResultStore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tablescroll_common::{Result, ScrollError};
use tablescroll_config::ExtractionSettings;
use tablescroll_vision::traits::VisionClient;
use tablescroll_vision::{Part, Turn, VisionRequest};
use tracing::{debug, info};

/// Object fields that may wrap the record list.
const LIST_FIELDS: &[&str] = &["audience_data", "records", "rows", "data"];

const EXTRACTION_PROMPT: &str = "\
Transcribe every row of the table in this screenshot. For each row return the \
columns Name, Type, Availability, Date created and Audience ID exactly as displayed.

Return only a JSON array of objects inside a ```json fenced block, for example:
```json
[{\"Name\": \"Example audience\", \"Type\": \"Custom\", \"Availability\": \"Ready\", \
\"Date created\": \"Jan 5, 2024\", \"Audience ID\": \"23851234567890\"}]
```
Use an empty string for any cell you cannot read. Do not add commentary.";

/// A table row in canonical form. `audience_id` is the dedup key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(rename = "Availability", default)]
    pub availability: String,
    #[serde(rename = "Date created", default)]
    pub date_created: String,
    #[serde(rename = "Audience ID", default)]
    pub audience_id: String,
    /// Fields of previously stored records that are not part of the canonical set.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ExtractedRecord {
    /// Map canonical or snake_case keys onto the canonical fields.
    ///
    /// Missing fields become empty strings; unknown keys are dropped.
    pub fn normalize(raw: &Map<String, Value>) -> Self {
        let mut record = Self::default();
        for (key, value) in raw {
            let slot = match canonical_key(key).as_str() {
                "name" => &mut record.name,
                "type" => &mut record.kind,
                "availability" => &mut record.availability,
                "date_created" => &mut record.date_created,
                "audience_id" => &mut record.audience_id,
                _ => continue,
            };
            *slot = stringify(value);
        }
        record
    }

    /// Rebuild a record read back from the store.
    ///
    /// Canonical columns may hold nulls or numbers in files written by older
    /// tools or edited by hand; those are kept as their text form. Any other
    /// key is carried along untouched.
    pub fn from_stored(raw: Map<String, Value>) -> Self {
        let mut record = Self::default();
        for (key, value) in raw {
            let slot = match key.as_str() {
                "Name" => &mut record.name,
                "Type" => &mut record.kind,
                "Availability" => &mut record.availability,
                "Date created" => &mut record.date_created,
                "Audience ID" => &mut record.audience_id,
                _ => {
                    record.extra.insert(key, value);
                    continue;
                }
            };
            *slot = match value {
                Value::Null => String::new(),
                Value::String(s) => s,
                other => other.to_string(),
            };
        }
        record
    }
}

fn canonical_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn fenced_block() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?[ \t]*\r?\n(.*?)\r?\n?```")
            .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

/// The structured payload: the first fenced block, else the whole text.
pub fn locate_payload(text: &str) -> &str {
    fenced_block()
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str())
        .trim()
}

/// Parse a bare list of records or an object wrapping one.
pub fn parse_records(text: &str) -> Result<Vec<ExtractedRecord>> {
    let payload = locate_payload(text);
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| ScrollError::ExtractionParse(format!("payload is not JSON: {e}")))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => LIST_FIELDS
            .iter()
            .find_map(|field| match obj.remove(*field) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| {
                ScrollError::ExtractionParse(format!(
                    "object payload has no list field (expected one of {})",
                    LIST_FIELDS.join(", ")
                ))
            })?,
        other => {
            return Err(ScrollError::ExtractionParse(format!(
                "payload must be a list or an object, got {}",
                json_kind(&other)
            )))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(raw) => Ok(ExtractedRecord::normalize(raw)),
            other => Err(ScrollError::ExtractionParse(format!(
                "record {i} is {}, not an object",
                json_kind(other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

pub struct Extractor {
    client: Arc<dyn VisionClient>,
    settings: ExtractionSettings,
}

impl Extractor {
    pub fn new(client: Arc<dyn VisionClient>, settings: ExtractionSettings) -> Self {
        Self { client, settings }
    }

    pub fn build_request(&self, frame: &ObservationFrame) -> VisionRequest {
        VisionRequest::new(vec![Turn::user(vec![
            Part::Text(EXTRACTION_PROMPT.to_string()),
            Part::Image(frame.image.clone()),
        ])])
        .with_temperature(self.settings.temperature)
        .with_max_tokens(self.settings.max_tokens)
    }

    /// Transcribe the rows visible in `frame`.
    pub async fn extract(&self, frame: &ObservationFrame) -> Result<Vec<ExtractedRecord>> {
        let reply = self.client.complete(&self.build_request(frame)).await?;
        debug!(frame = %frame.id, response = %reply.text, "extract.response");
        let records = parse_records(&reply.text)?;
        debug!(frame = %frame.id, rows = records.len(), "extract.parsed");
        Ok(records)
    }

    /// Extract, then load, merge and save the store at `store_path`.
    ///
    /// Nothing is written unless extraction and the store load both succeed.
    pub async fn extract_and_merge(
        &self,
        frame: &ObservationFrame,
        store_path: &Path,
    ) -> Result<MergeReport> {
        let records = self.extract(frame).await?;
        let mut store = ResultStore::load_or_new(store_path)?;
        let report = store.merge(records);
        if report.written > 0 || !store_path.exists() {
            store.save()?;
        }
        info!(
            frame = %frame.id,
            path = %store_path.display(),
            written = report.written,
            skipped_duplicate = report.skipped_duplicate,
            total = store.len(),
            "store.merge"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_fenced_block() {
        let text = "Here you go:\n```json\n[{\"name\": \"A\"}]\n```\nanything else";
        assert_eq!(locate_payload(text), "[{\"name\": \"A\"}]");
        assert_eq!(locate_payload("  [1]  "), "[1]");
        assert_eq!(locate_payload("```\n{\"rows\": []}\n```"), "{\"rows\": []}");
    }

    #[test]
    fn snake_case_and_canonical_keys_normalize() {
        let records = parse_records(
            r#"[{"name": "A", "audience_id": "123"},
                {"Name": "B", "Type": "Lookalike", "Date created": "2024-01-02", "Audience ID": 456, "Extra": true}]"#,
        )
        .unwrap();
        assert_eq!(records[0].name, "A");
        assert_eq!(records[0].audience_id, "123");
        assert_eq!(records[0].kind, "");
        assert_eq!(records[1].kind, "Lookalike");
        assert_eq!(records[1].date_created, "2024-01-02");
        assert_eq!(records[1].audience_id, "456");
        assert!(records[1].extra.is_empty());
    }

    #[test]
    fn wrapped_list_is_accepted() {
        let records = parse_records(r#"{"audience_data": [{"name": "A"}]}"#).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn other_shapes_are_errors() {
        for bad in ["\"rows\"", "{\"items\": 3}", "[1, 2]", "not json", ""] {
            assert!(
                matches!(parse_records(bad), Err(ScrollError::ExtractionParse(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn canonical_serialization_order() {
        let record = ExtractedRecord::normalize(json!({"audience_id": "1", "name": "A"}).as_object().unwrap());
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"Name":"A","Type":"","Availability":"","Date created":"","Audience ID":"1"}"#
        );
    }

    #[test]
    fn stored_extras_survive_a_round_trip() {
        let raw = r#"{"Name":"A","Type":"","Availability":"","Date created":"","Audience ID":"1","Owner":"ops"}"#;
        let record: ExtractedRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.extra["Owner"], json!("ops"));
        assert_eq!(serde_json::to_string(&record).unwrap(), raw);
    }
}
