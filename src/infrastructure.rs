//! Infrastructure layer for backend access, configuration, and logging
//!
//! This module provides the HTTP/SSE client for the translation backend,
//! the event stream decoder, configuration management, and logging setup.

pub mod api_client;
pub mod config;
pub mod logging;
pub mod sse;

// Re-export commonly used items
pub use api_client::{ApiError, Bucket, WorkbenchApi};
pub use config::{AppConfig, BackendConfig, ConfigManager};
pub use sse::SseDecoder;
