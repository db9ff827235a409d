//! Provider-specific upstream requests.
//!
//! One builder per [`ProviderKind`] variant; the relay never inspects the
//! provider name to decide how to talk to it.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};

use super::prompt::compose_system_prompt;
use super::types::{
    ChatRequest, GeminiBody, GeminiContent, GeminiInstruction, GeminiPart, GenerationConfig,
    OpenAiChatBody, OpenAiMessage,
};
use crate::config::RelayConfig;
use crate::pool::{Credential, ProviderKind};

/// Header carrying the key for Gemini endpoints.
pub const GEMINI_KEY_HEADER: &str = "x-goog-api-key";

/// Per-request generation settings shared by every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationParams {
    pub fn for_request(chat: &ChatRequest, settings: &RelayConfig) -> Self {
        Self {
            system_prompt: compose_system_prompt(chat.system_prompt.as_deref(), settings),
            temperature: settings.temperature,
            max_tokens: chat.max_tokens.unwrap_or(settings.default_max_tokens),
        }
    }
}

/// Build the outbound call for one credential.
pub fn build_request(
    client: &Client,
    credential: &Credential,
    chat: &ChatRequest,
    params: &GenerationParams,
) -> RequestBuilder {
    let request = client
        .post(credential.kind.url())
        .header(CONTENT_TYPE, "application/json");

    match &credential.kind {
        ProviderKind::OpenAiCompatible { model, .. } => request
            .header(
                AUTHORIZATION,
                format!("Bearer {}", credential.key.expose_secret()),
            )
            .json(&openai_body(model, chat, params)),
        ProviderKind::Gemini { .. } => request
            .header(GEMINI_KEY_HEADER, credential.key.expose_secret())
            .json(&gemini_body(chat, params)),
    }
}

/// System message first, then the conversation as-is.
pub fn openai_body<'a>(
    model: &'a str,
    chat: &'a ChatRequest,
    params: &'a GenerationParams,
) -> OpenAiChatBody<'a> {
    let mut messages = Vec::with_capacity(chat.messages.len() + 1);
    messages.push(OpenAiMessage {
        role: "system",
        content: &params.system_prompt,
    });
    messages.extend(chat.messages.iter().map(|m| OpenAiMessage {
        role: m.role.as_openai(),
        content: &m.content,
    }));

    OpenAiChatBody {
        model,
        messages,
        stream: true,
        temperature: params.temperature,
        max_tokens: params.max_tokens,
    }
}

/// One turn per message; the prompt travels in `system_instruction`.
pub fn gemini_body<'a>(chat: &'a ChatRequest, params: &'a GenerationParams) -> GeminiBody<'a> {
    GeminiBody {
        contents: chat
            .messages
            .iter()
            .map(|m| GeminiContent {
                role: m.role.as_gemini(),
                parts: vec![GeminiPart { text: &m.content }],
            })
            .collect(),
        system_instruction: GeminiInstruction {
            parts: vec![GeminiPart {
                text: &params.system_prompt,
            }],
        },
        generation_config: GenerationConfig {
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
        },
    }
}
