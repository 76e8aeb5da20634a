use serde::{Deserialize, Serialize};

const PNG_BASE64_MAGIC: &str = "iVBORw0KGgo";

/// Image encodings the vision providers accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
}

impl MediaType {
    pub fn as_mime(&self) -> &'static str {
        match self {
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaType::Png => "png",
            MediaType::Jpeg => "jpg",
        }
    }

    /// Classify a base64 image (optionally carrying a data-URL prefix).
    ///
    /// Anything that is not recognisably PNG is treated as JPEG.
    pub fn sniff(encoded: &str) -> Self {
        let trimmed = encoded.trim_start();
        if trimmed.starts_with("data:image/png") || trimmed.starts_with(PNG_BASE64_MAGIC) {
            MediaType::Png
        } else {
            MediaType::Jpeg
        }
    }
}

/// Drop a `data:<mime>;base64,` prefix if present.
pub fn strip_data_url(encoded: &str) -> &str {
    let trimmed = encoded.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, payload)) = trimmed.split_once(";base64,") {
            return payload;
        }
    }
    trimmed
}

/// A base64 image ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub media_type: MediaType,
    pub base64: String,
}

impl ImageData {
    /// Sniff the media type and strip any data-URL prefix.
    pub fn from_base64(encoded: &str) -> Self {
        Self {
            media_type: MediaType::sniff(encoded),
            base64: strip_data_url(encoded).to_string(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type.as_mime(), self.base64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Image(ImageData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One conversational turn made of text and image parts.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![Part::Text(text.into())])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, used by providers that only take text for a role.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisionRequest {
    pub system: Option<String>,
    pub turns: Vec<Turn>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl VisionRequest {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            system: None,
            turns,
            max_tokens: 1024,
            temperature: 0.5,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn image_count(&self) -> usize {
        self.turns
            .iter()
            .flat_map(|t| &t.parts)
            .filter(|p| matches!(p, Part::Image(_)))
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionReply {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}
