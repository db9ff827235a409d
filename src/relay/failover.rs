//! Sequential first-success failover across a credential pool.
//!
//! - Candidates are tried strictly one at a time, in the given order
//! - Every failure (rejection, timeout, transport error) advances to the next
//! - The first success stops the loop; nothing after it is attempted
//! - Header formatting for `x-relay-attempts`

use std::fmt;
use std::future::Future;

use crate::pool::Credential;

/// Upper bound on the upstream error body kept in a failure record.
pub const MAX_FAILURE_BODY_CHARS: usize = 512;

/// Anything the loop can attribute a failure to.
pub trait Candidate {
    fn label(&self) -> &str;
}

impl Candidate for Credential {
    fn label(&self) -> &str {
        &self.provider
    }
}

/// Why a single attempt did not produce a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Upstream answered with a non-2xx status
    Rejected { status: u16, body: String },
    /// No response headers within the attempt timeout
    Timeout,
    /// DNS, connect, TLS or reset
    Network(String),
}

impl FailureKind {
    /// Build a rejection, truncating the body on a char boundary.
    pub fn rejected(status: u16, body: &str) -> Self {
        let body = match body.char_indices().nth(MAX_FAILURE_BODY_CHARS) {
            Some((cut, _)) => format!("{}...", &body[..cut]),
            None => body.to_string(),
        };
        FailureKind::Rejected {
            status,
            body: body.trim().to_string(),
        }
    }
}

/// Record of one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub provider: String,
    pub kind: FailureKind,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Rejected { status, body } if body.is_empty() => {
                write!(f, "{}: HTTP {}", self.provider, status)
            }
            FailureKind::Rejected { status, body } => {
                write!(f, "{}: HTTP {}: {}", self.provider, status, body)
            }
            FailureKind::Timeout => write!(f, "{}: timed out", self.provider),
            FailureKind::Network(message) => {
                write!(f, "{}: network error: {}", self.provider, message)
            }
        }
    }
}

/// A successful attempt plus the failures that preceded it.
#[derive(Debug)]
pub struct Attempted<T> {
    /// Position of the winning candidate in the input slice
    pub index: usize,
    pub value: T,
    pub failures: Vec<AttemptFailure>,
}

/// Try `candidates` in order until `attempt` succeeds.
///
/// Returns every failure record when all candidates fail. An empty slice
/// yields `Err` with no records; callers reject empty pools before this.
pub async fn first_success<C, T, F, Fut>(
    candidates: &[C],
    mut attempt: F,
) -> Result<Attempted<T>, Vec<AttemptFailure>>
where
    C: Candidate,
    F: FnMut(&C) -> Fut,
    Fut: Future<Output = Result<T, FailureKind>>,
{
    let mut failures = Vec::new();

    for (index, candidate) in candidates.iter().enumerate() {
        match attempt(candidate).await {
            Ok(value) => {
                return Ok(Attempted {
                    index,
                    value,
                    failures,
                });
            }
            Err(kind) => {
                tracing::warn!(
                    provider = %candidate.label(),
                    attempt = index + 1,
                    of = candidates.len(),
                    failure = ?kind,
                    "Upstream attempt failed, moving to next credential"
                );
                failures.push(AttemptFailure {
                    provider: candidate.label().to_string(),
                    kind,
                });
            }
        }
    }

    Err(failures)
}

/// Format failure records into the `x-relay-attempts` header value.
///
/// Failed attempts per provider, in first-appearance order: `"2/groq, 1/gemini"`.
pub fn format_attempts_header(failures: &[AttemptFailure]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    let mut counts: Vec<(&str, u32)> = Vec::new();
    for failure in failures {
        if let Some(entry) = counts.iter_mut().find(|(name, _)| *name == failure.provider) {
            entry.1 += 1;
        } else {
            counts.push((failure.provider.as_str(), 1));
        }
    }
    Some(
        counts
            .iter()
            .map(|(name, count)| format!("{}/{}", count, name))
            .collect::<Vec<_>>()
            .join(", "),
    )
}
