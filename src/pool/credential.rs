//! Credential and provider kind types.

use crate::config::{ApiFormat, ApiKey, KeySource, ProviderConfig};

/// Upstream API family a credential is spoken to with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAiCompatible { endpoint: String, model: String },
    Gemini { endpoint: String, model: String },
}

impl ProviderKind {
    pub fn from_config(config: &ProviderConfig) -> Self {
        let endpoint = config.endpoint.clone();
        let model = config.model.clone();
        match config.format {
            ApiFormat::Openai => ProviderKind::OpenAiCompatible { endpoint, model },
            ApiFormat::Gemini => ProviderKind::Gemini { endpoint, model },
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ProviderKind::OpenAiCompatible { model, .. } | ProviderKind::Gemini { model, .. } => {
                model
            }
        }
    }

    /// Request URL with any `{model}` placeholder filled in.
    pub fn url(&self) -> String {
        match self {
            ProviderKind::OpenAiCompatible { endpoint, .. } => endpoint.clone(),
            ProviderKind::Gemini { endpoint, model } => endpoint.replace("{model}", model),
        }
    }

    pub fn format(&self) -> ApiFormat {
        match self {
            ProviderKind::OpenAiCompatible { .. } => ApiFormat::Openai,
            ProviderKind::Gemini { .. } => ApiFormat::Gemini,
        }
    }
}

/// One upstream API key, tagged with where and how to use it.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Provider name from config, e.g. "groq"
    pub provider: String,
    pub kind: ProviderKind,
    pub key: ApiKey,
    pub source: KeySource,
}

impl Credential {
    pub fn new(config: &ProviderConfig, key: ApiKey, source: KeySource) -> Self {
        Self {
            provider: config.name.clone(),
            kind: ProviderKind::from_config(config),
            key,
            source,
        }
    }
}

/// Ordered credentials available to a single request.
#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn as_slice(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn into_vec(self) -> Vec<Credential> {
        self.credentials
    }
}

impl From<Vec<Credential>> for CredentialPool {
    fn from(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }
}

impl IntoIterator for CredentialPool {
    type Item = Credential;
    type IntoIter = std::vec::IntoIter<Credential>;

    fn into_iter(self) -> Self::IntoIter {
        self.credentials.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_providers;

    #[test]
    fn test_gemini_url_substitutes_model() {
        let gemini = builtin_providers()
            .into_iter()
            .find(|p| p.name == "gemini")
            .unwrap();
        let kind = ProviderKind::from_config(&gemini);
        assert_eq!(
            kind.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:streamGenerateContent"
        );
        assert_eq!(kind.format(), ApiFormat::Gemini);
    }

    #[test]
    fn test_openai_url_is_endpoint_verbatim() {
        let kind = ProviderKind::OpenAiCompatible {
            endpoint: "http://127.0.0.1:9/{model}".to_string(),
            model: "llama".to_string(),
        };
        assert_eq!(kind.url(), "http://127.0.0.1:9/{model}");
        assert_eq!(kind.model(), "llama");
    }

    #[test]
    fn test_credential_debug_redacts_key() {
        let config = &builtin_providers()[0];
        let credential = Credential::new(config, ApiKey::from("gsk_secret"), KeySource::Literal);
        let debug = format!("{:?}", credential);
        assert!(debug.contains("groq"));
        assert!(!debug.contains("gsk_secret"));
    }
}
