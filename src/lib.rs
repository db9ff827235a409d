//! chat-relay - Multi-provider failover relay for streaming chat completions
//!
//! This library provides the core functionality for the relay, including
//! configuration, credential pool management, and the streaming relay itself.

pub mod config;
pub mod error;
pub mod pool;
pub mod relay;

pub use config::Config;
pub use error::{Error, Result};
