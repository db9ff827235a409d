//! HTTP request handlers.

use axum::{
    body::{Body, Bytes},
    extract::{Extension, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;

use super::dispatch::RelayStream;
use super::failover::format_attempts_header;
use super::server::{AppState, RequestId};
use super::types::ChatRequest;
use crate::error::Error;
use crate::pool;

/// Response header: correlation ID (UUID v4).
pub const RELAY_REQUEST_ID_HEADER: &str = "x-relay-request-id";
/// Response header: provider name that served the stream.
pub const RELAY_PROVIDER_HEADER: &str = "x-relay-provider";
/// Response header: failed attempts per provider, e.g. "2/groq, 1/gemini".
pub const RELAY_ATTEMPTS_HEADER: &str = "x-relay-attempts";

/// Out-of-band chunk naming the serving provider; the frontend strips it.
pub fn provider_marker(provider: &str) -> String {
    format!("[provider:{}]", provider)
}

/// Handle POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Response, Error> {
    let request: ChatRequest =
        serde_json::from_slice(&body).map_err(|e| Error::BadRequest(e.to_string()))?;

    tracing::info!(
        request_id = %request_id.0,
        messages = request.messages.len(),
        mode = ?request.mode(),
        user_key = request.user_key().is_some(),
        "Received chat request"
    );

    let pool = {
        let mut rng = rand::rng();
        pool::attempt_order(
            &state.config.providers,
            &state.env,
            request.user_key(),
            request.mode(),
            &mut rng,
        )?
    };

    tracing::debug!(request_id = %request_id.0, credentials = pool.len(), "Built credential pool");

    match state.relay.open(&request, pool).await {
        Ok(stream) => Ok(stream_response(
            stream,
            state.config.relay.provider_marker,
        )),
        Err(err) => {
            let attempts = match &err {
                Error::Exhausted { failures } => format_attempts_header(failures),
                _ => None,
            };
            tracing::warn!(request_id = %request_id.0, error = %err, "Chat request failed");

            let mut response = err.into_response();
            if let Some(value) = attempts.and_then(|a| HeaderValue::from_str(&a).ok()) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(RELAY_ATTEMPTS_HEADER), value);
            }
            Ok(response)
        }
    }
}

/// Build the streaming response for a successful relay.
fn stream_response(stream: RelayStream, with_marker: bool) -> Response {
    let marker = with_marker.then(|| provider_marker(&stream.provider));
    let body = tokio_stream::iter(marker.map(Ok::<_, std::io::Error>)).chain(stream.chunks);

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&stream.provider) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(RELAY_PROVIDER_HEADER), value);
    }

    response
}

/// Any method other than POST on the chat route.
pub async fn method_not_allowed() -> Error {
    Error::MethodNotAllowed
}

/// Handle GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-relay"
    }))
}
