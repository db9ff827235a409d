//! The provider relay: ordered attempts, first success wins.

use std::time::Duration;

use reqwest::Client;
use tokio::time::Instant;

use super::failover::{first_success, AttemptFailure, Attempted, FailureKind};
use super::stream::{normalize, TextDecoder, TextStream};
use super::types::ChatRequest;
use super::upstream::{build_request, GenerationParams};
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::pool::{Credential, CredentialPool};

/// Live output of the first upstream that accepted the request.
pub struct RelayStream {
    /// Provider name of the serving credential
    pub provider: String,
    /// Attempts that failed before this one
    pub failures: Vec<AttemptFailure>,
    pub chunks: TextStream,
}

impl std::fmt::Debug for RelayStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayStream")
            .field("provider", &self.provider)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

/// Sends a chat request through a credential pool.
#[derive(Debug, Clone)]
pub struct Relay {
    http: Client,
    settings: RelayConfig,
}

impl Relay {
    pub fn new(http: Client, settings: RelayConfig) -> Self {
        Self { http, settings }
    }

    /// Try each credential in order and stream the first success.
    ///
    /// Attempts are strictly sequential. An empty pool fails before any
    /// network call; a pool where every attempt fails yields
    /// [`Error::Exhausted`] carrying all failure records.
    pub async fn open(&self, chat: &ChatRequest, pool: CredentialPool) -> Result<RelayStream> {
        if pool.is_empty() {
            return Err(Error::NoCredentials);
        }

        let params = GenerationParams::for_request(chat, &self.settings);
        let candidates = pool.into_vec();
        let timeout = self.settings.attempt_timeout();

        let params = &params;
        let outcome = first_success(&candidates, move |credential: &Credential| {
            let credential = credential.clone();
            async move { self.attempt(&credential, chat, params, timeout).await }
        })
        .await;

        match outcome {
            Ok(Attempted {
                index,
                value: response,
                failures,
            }) => {
                let credential = &candidates[index];
                tracing::info!(
                    provider = %credential.provider,
                    model = %credential.kind.model(),
                    key_source = %credential.source,
                    failed_before = failures.len(),
                    "Upstream accepted request, streaming"
                );
                let decoder = TextDecoder::for_format(credential.kind.format());
                Ok(RelayStream {
                    provider: credential.provider.clone(),
                    failures,
                    chunks: normalize(response.bytes_stream(), decoder),
                })
            }
            Err(failures) => {
                tracing::error!(attempts = failures.len(), "All upstream attempts failed");
                Err(Error::Exhausted { failures })
            }
        }
    }

    /// One bounded attempt. A single deadline covers connect, response headers
    /// and, on rejection, reading the error body. A rejection whose body cannot
    /// be read in time is still recorded with its status.
    async fn attempt(
        &self,
        credential: &Credential,
        chat: &ChatRequest,
        params: &GenerationParams,
        timeout: Duration,
    ) -> std::result::Result<reqwest::Response, FailureKind> {
        tracing::debug!(
            provider = %credential.provider,
            url = %credential.kind.url(),
            "Attempting upstream"
        );

        let deadline = Instant::now() + timeout;
        let send = build_request(&self.http, credential, chat, params).send();
        let response = match tokio::time::timeout_at(deadline, send).await {
            Ok(result) => result.map_err(classify_transport_error)?,
            Err(_) => return Err(FailureKind::Timeout),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match tokio::time::timeout_at(deadline, response.text()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                tracing::debug!(status = status.as_u16(), error = %e, "Failed to read error body");
                String::new()
            }
            Err(_) => {
                tracing::debug!(status = status.as_u16(), "Timed out reading error body");
                String::new()
            }
        };
        Err(FailureKind::rejected(status.as_u16(), &body))
    }
}

fn classify_transport_error(e: reqwest::Error) -> FailureKind {
    if e.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Network(e.to_string())
    }
}
