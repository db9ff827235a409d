//! Inbound chat request types and upstream wire bodies.

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ApiKey;
use crate::pool::SelectedMode;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_openai(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn as_gemini(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "model",
        }
    }
}

/// A chat message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Body of `POST /api/chat` as sent by the frontend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Number or numeric string; zero and garbage mean "use the default"
    #[serde(default, deserialize_with = "lenient_max_tokens")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub user_api_key: Option<ApiKey>,
    #[serde(default)]
    pub selected_mode: Option<SelectedMode>,
}

impl ChatRequest {
    /// Caller's key, if it is not blank.
    pub fn user_key(&self) -> Option<&str> {
        self.user_api_key
            .as_ref()
            .map(|k| k.expose_secret().trim())
            .filter(|k| !k.is_empty())
    }

    pub fn mode(&self) -> SelectedMode {
        self.selected_mode.unwrap_or_default()
    }
}

fn lenient_max_tokens<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Float(f64),
        Text(String),
    }

    let tokens = match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Int(n)) => Some(n),
        Some(Raw::Float(f)) if f.is_finite() && f >= 1.0 => Some(f as u64),
        Some(Raw::Float(_)) => None,
        Some(Raw::Text(s)) => leading_integer(&s),
    };

    Ok(tokens
        .filter(|n| *n > 0)
        .map(|n| n.min(u64::from(u32::MAX)) as u32))
}

/// Parse the leading run of ASCII digits, ignoring surrounding whitespace.
fn leading_integer(s: &str) -> Option<u64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().ok()
}

/// OpenAI-compatible `/chat/completions` request body.
#[derive(Debug, Serialize)]
pub struct OpenAiChatBody<'a> {
    pub model: &'a str,
    pub messages: Vec<OpenAiMessage<'a>>,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct OpenAiMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Gemini `streamGenerateContent` request body.
#[derive(Debug, Serialize)]
pub struct GeminiBody<'a> {
    pub contents: Vec<GeminiContent<'a>>,
    pub system_instruction: GeminiInstruction<'a>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct GeminiContent<'a> {
    pub role: &'a str,
    pub parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
pub struct GeminiInstruction<'a> {
    pub parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
pub struct GeminiPart<'a> {
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: u32,
}

/// One `data:` event of an OpenAI-compatible stream.
///
/// Only the fields the relay reads; everything else is ignored.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamChunk {
    /// Incremental text of the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .filter(|c| !c.is_empty())
    }
}
