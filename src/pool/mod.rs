//! Credential pool for the relay.
//!
//! This module decides which upstream keys a request may use and in which
//! order they are tried:
//! - Discovery from config and the environment snapshot
//! - Collapsing to a single caller-supplied key
//! - Mode filtering and per-request shuffling

mod builder;
mod credential;
mod ordering;

pub use builder::{infer_user_credential, load_credential_pool};
pub use credential::{Credential, CredentialPool, ProviderKind};
pub use ordering::SelectedMode;

use crate::config::{ConfigError, EnvSnapshot, ProviderConfig};

/// Build the attempt order for one request.
///
/// A non-blank `user_api_key` yields exactly that key and nothing else.
/// Otherwise every configured credential admitted by `mode` is returned in
/// shuffled order. An empty result is left for the caller to reject.
pub fn attempt_order<R: rand::Rng + ?Sized>(
    providers: &[ProviderConfig],
    env: &EnvSnapshot,
    user_api_key: Option<&str>,
    mode: SelectedMode,
    rng: &mut R,
) -> Result<CredentialPool, ConfigError> {
    if let Some(key) = user_api_key.map(str::trim).filter(|k| !k.is_empty()) {
        let pool = infer_user_credential(providers, key, mode)
            .map(|credential| CredentialPool::from(vec![credential]))
            .unwrap_or_default();
        return Ok(pool);
    }

    let pool = load_credential_pool(providers, env)?;
    Ok(pool.ordered(mode, rng))
}
