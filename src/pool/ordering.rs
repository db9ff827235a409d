//! Attempt ordering.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

use super::credential::CredentialPool;
use crate::config::ApiFormat;

/// Caller's restriction on which API family may serve the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectedMode {
    #[default]
    Auto,
    Gemini,
    /// OpenAI-compatible Llama hosts (Groq, SambaNova, ...)
    Llama,
}

impl SelectedMode {
    pub fn admits(&self, format: ApiFormat) -> bool {
        match self {
            SelectedMode::Auto => true,
            SelectedMode::Gemini => format == ApiFormat::Gemini,
            SelectedMode::Llama => format == ApiFormat::Openai,
        }
    }
}

impl CredentialPool {
    /// Filter by `mode`, then shuffle uniformly.
    ///
    /// Spreads load across equivalent keys; nothing depends on the order.
    pub fn ordered<R: Rng + ?Sized>(self, mode: SelectedMode, rng: &mut R) -> CredentialPool {
        let mut credentials: Vec<_> = self
            .into_iter()
            .filter(|c| mode.admits(c.kind.format()))
            .collect();
        // Fisher-Yates
        credentials.shuffle(rng);
        credentials.into()
    }
}
