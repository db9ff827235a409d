//! System prompt composition.

use crate::config::RelayConfig;

/// Join the caller's persona (or the configured default) and the hidden policy.
///
/// The persona comes first, separated from the policy by a blank line. A blank
/// persona counts as absent; the text is passed through untouched otherwise.
pub fn compose_system_prompt(persona: Option<&str>, settings: &RelayConfig) -> String {
    let persona = persona
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(settings.default_system_prompt.as_str());

    if settings.hidden_policy.is_empty() {
        return persona.to_string();
    }

    format!("{}\n\n{}", persona, settings.hidden_policy)
}
