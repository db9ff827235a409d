//! HTTP relay module.
//!
//! This module provides the chat endpoint that accepts frontend requests,
//! tries upstream providers in turn, and streams back plain text.

mod dispatch;
pub mod failover;
mod handlers;
pub mod prompt;
mod server;
pub mod stream;
pub mod types;
pub mod upstream;

pub use dispatch::{Relay, RelayStream};
pub use handlers::{
    RELAY_ATTEMPTS_HEADER, RELAY_PROVIDER_HEADER, RELAY_REQUEST_ID_HEADER,
};
pub use server::{create_router, run_server, AppState, RequestId};
pub use types::{ChatMessage, ChatRequest, Role};
