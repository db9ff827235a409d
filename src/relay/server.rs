//! HTTP server setup and configuration.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::dispatch::Relay;
use super::handlers;
use crate::config::{Config, EnvSnapshot};

/// Shared application state.
///
/// Everything here is read-only; requests share no mutable state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub config: Arc<Config>,
    pub env: Arc<EnvSnapshot>,
}

impl AppState {
    pub fn new(config: Config, env: EnvSnapshot, http_client: Client) -> Self {
        let relay = Relay::new(http_client, config.relay.clone());
        Self {
            relay: Arc::new(relay),
            config: Arc::new(config),
            env: Arc::new(env),
        }
    }
}

/// Correlation id assigned to every inbound request.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        response.headers_mut().insert(
            HeaderName::from_static(handlers::RELAY_REQUEST_ID_HEADER),
            value,
        );
    }
    response
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/chat",
            post(handlers::chat).fallback(handlers::method_not_allowed),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(assign_request_id)),
        )
}

/// Run the HTTP server.
pub async fn run_server(config: Config, env: EnvSnapshot) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    // No overall timeout: streamed bodies may legitimately run for minutes.
    let http_client = Client::builder()
        .connect_timeout(config.relay.attempt_timeout())
        .build()?;

    let state = AppState::new(config, env, http_client);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting chat relay server");

    axum::serve(listener, app).await?;

    Ok(())
}
