//! Credential discovery.

use std::collections::HashSet;

use super::credential::{Credential, CredentialPool};
use super::ordering::SelectedMode;
use crate::config::{
    convention_env_var_name, expand_env_vars_with, ApiFormat, ApiKey, ConfigError, EnvSnapshot,
    KeySource, ProviderConfig,
};

/// Gather every configured credential across all providers.
///
/// Per provider, in order: `api_keys` from config (with `${VAR}` expansion),
/// the exact `<NAME>_API_KEY` variable, then any other variable whose name
/// contains `<NAME>_API_KEY` in lexical order. Blank values and repeats of a
/// key already seen for the provider are skipped.
pub fn load_credential_pool(
    providers: &[ProviderConfig],
    env: &EnvSnapshot,
) -> Result<CredentialPool, ConfigError> {
    let mut credentials = Vec::new();

    for provider in providers {
        let found = provider_credentials(provider, env)?;
        tracing::debug!(
            provider = %provider.name,
            count = found.len(),
            "Discovered credentials"
        );
        credentials.extend(found);
    }

    Ok(credentials.into())
}

fn provider_credentials(
    provider: &ProviderConfig,
    env: &EnvSnapshot,
) -> Result<Vec<Credential>, ConfigError> {
    let mut found: Vec<(String, KeySource)> = Vec::new();

    for raw in &provider.api_keys {
        let raw = raw.expose_secret();
        if raw.contains("${") {
            let expanded = expand_env_vars_with(raw, &provider.name, |var| {
                env.get(var).map(str::to_string)
            })?;
            found.push((expanded, KeySource::EnvExpanded));
        } else {
            found.push((raw.to_string(), KeySource::Literal));
        }
    }

    let marker = convention_env_var_name(&provider.name);
    if let Some(value) = env.get(&marker) {
        found.push((value.to_string(), KeySource::Convention(marker.clone())));
    }

    if provider.env_scan {
        for (name, value) in env.iter() {
            if name != marker && name.contains(&marker) {
                found.push((value.to_string(), KeySource::Convention(name.to_string())));
            }
        }
    }

    let mut seen = HashSet::new();
    let credentials = found
        .into_iter()
        .filter_map(|(value, source)| {
            let value = value.trim().to_string();
            if value.is_empty() || !seen.insert(value.clone()) {
                return None;
            }
            Some(Credential::new(provider, ApiKey::from(value), source))
        })
        .collect();

    Ok(credentials)
}

/// Pick the provider a caller-supplied key belongs to.
///
/// A matching `key_prefix` wins. Otherwise a mode naming one API family picks
/// the first provider of that family, and failing that the first
/// OpenAI-compatible provider without a prefix is assumed. Returns `None` only
/// when no providers are configured.
pub fn infer_user_credential(
    providers: &[ProviderConfig],
    key: &str,
    mode: SelectedMode,
) -> Option<Credential> {
    let by_prefix = providers.iter().find(|p| {
        p.key_prefix
            .as_deref()
            .is_some_and(|prefix| !prefix.is_empty() && key.starts_with(prefix))
    });

    let by_mode = || {
        if mode == SelectedMode::Auto {
            return None;
        }
        providers.iter().find(|p| mode.admits(p.format))
    };

    let provider = by_prefix
        .or_else(by_mode)
        .or_else(|| {
            providers
                .iter()
                .find(|p| p.format == ApiFormat::Openai && p.key_prefix.is_none())
        })
        .or_else(|| providers.first())?;

    Some(Credential::new(
        provider,
        ApiKey::from(key),
        KeySource::UserSupplied,
    ))
}
