//! Seam between the progress controller and the translation backend
//!
//! The controller only ever sees this trait, so the state machine can be
//! driven by stub backends in tests without a live network.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use super::events::TranslationStreamEvent;

/// Failure modes of the translation event stream
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream could not be opened
    #[error("failed to reach the translation backend: {0}")]
    Connect(String),
    /// The connection dropped or reported an error mid-stream
    #[error("translation stream failed: {0}")]
    Transport(String),
    /// The stream delivered a payload the decoder could not understand
    #[error("malformed stream payload: {0}")]
    Payload(String),
}

/// Decoded server-push event stream for one translation job
pub type EventStream = BoxStream<'static, Result<TranslationStreamEvent, StreamError>>;

/// Remote operations the controller needs from the translation backend
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Starts a translation job for `file_name` and opens its event stream.
    async fn translate_stream(&self, file_name: &str) -> Result<EventStream, StreamError>;

    /// Best-effort stop notification for an abandoned job.
    ///
    /// Callers treat delivery failure as non-fatal; local state has already
    /// moved on by the time this is sent.
    async fn stop_translation(&self, file_name: &str) -> anyhow::Result<()>;
}
