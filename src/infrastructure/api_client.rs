//! HTTP client for the translation backend
//!
//! Thin wrapper over the backend's REST surface plus the streaming
//! translation endpoint. Request shapes follow the backend contract: script
//! CRUD is plain JSON, upload is a multipart form, translation is a POST
//! that answers with a server-sent-events body.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::multipart;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::domain::backend::{EventStream, StreamError, TranslationBackend};
use crate::domain::events::TranslationStreamEvent;
use crate::infrastructure::config::BackendConfig;
use crate::infrastructure::sse::SseDecoder;

/// Server-side storage bucket a script lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Uploaded legacy sources
    Untranslated,
    /// Translation results
    Translated,
}

impl Bucket {
    /// Bucket name as the backend knows it.
    pub fn bucket_name(self) -> &'static str {
        match self {
            Bucket::Untranslated => "scripts-untranslated",
            Bucket::Translated => "scripts-translated",
        }
    }

    /// Parses a CLI-friendly bucket name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "untranslated" | "scripts-untranslated" => Some(Bucket::Untranslated),
            "translated" | "scripts-translated" => Some(Bucket::Translated),
            _ => None,
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.bucket_name())
    }
}

/// Failures talking to the backend's REST surface
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to translation backend failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("translation backend returned HTTP {0}")]
    Status(StatusCode),
    #[error("invalid backend base url `{url}`: {message}")]
    BaseUrl { url: String, message: String },
    #[error("cannot read upload source {path}: {message}")]
    UploadSource { path: String, message: String },
}

#[derive(Debug, Deserialize)]
struct ListFilesResponse {
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScriptContentResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: String,
}

/// Client for one backend instance, cheap to clone
#[derive(Debug, Clone)]
pub struct WorkbenchApi {
    client: Client,
    base: Url,
    request_timeout: Duration,
}

impl WorkbenchApi {
    /// Builds a client from the backend section of the app config.
    ///
    /// Only the connect timeout is set on the underlying client; a whole
    /// request timeout would cut translation streams short, so the REST
    /// calls apply their own per-request timeout instead.
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()?;

        let mut base = Url::parse(&config.base_url).map_err(|e| ApiError::BaseUrl {
            url: config.base_url.clone(),
            message: e.to_string(),
        })?;
        // Url::join replaces the last path segment unless the base ends
        // with a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client,
            base,
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        })
    }

    fn endpoint(&self, name: &str) -> Url {
        self.base.join(name).expect("endpoint names are valid url segments")
    }

    /// Lists the file names stored in `bucket`.
    pub async fn list_files(&self, bucket: Bucket) -> Result<Vec<String>, ApiError> {
        let mut url = self.endpoint("list_files");
        url.query_pairs_mut().append_pair("bucket_name", bucket.bucket_name());

        let response =
            self.client.get(url).timeout(self.request_timeout).send().await?;
        let body: ListFilesResponse = Self::expect_ok(response)?.json().await?;
        Ok(body.files)
    }

    /// Uploads a local script into the untranslated bucket.
    pub async fn upload_script(&self, path: &Path) -> Result<String, ApiError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| ApiError::UploadSource {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.txt".to_string());

        let form = multipart::Form::new()
            .part("file", multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(self.endpoint("upload_script"))
            .multipart(form)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let body: MessageResponse = Self::expect_ok(response)?.json().await?;
        Ok(body.message)
    }

    /// Fetches a script's content from `bucket`.
    pub async fn fetch_script(&self, bucket: Bucket, file_name: &str) -> Result<String, ApiError> {
        let endpoint = match bucket {
            Bucket::Untranslated => "get_untranslated_script_content",
            Bucket::Translated => "get_translated_script_content",
        };
        let mut url = self.endpoint(endpoint);
        url.query_pairs_mut().append_pair("file_name", file_name);

        let response =
            self.client.get(url).timeout(self.request_timeout).send().await?;
        let body: ScriptContentResponse = Self::expect_ok(response)?.json().await?;
        Ok(body.content)
    }

    /// Saves a script's content into `bucket` under `file_name`.
    pub async fn save_script(
        &self,
        bucket: Bucket,
        file_name: &str,
        content: &str,
    ) -> Result<String, ApiError> {
        // The backend takes the body under a different key per bucket.
        let (endpoint, payload) = match bucket {
            Bucket::Untranslated => (
                "update_untranslated_script",
                serde_json::json!({ "file_name": file_name, "content": content }),
            ),
            Bucket::Translated => (
                "update_translated_script",
                serde_json::json!({ "file_name": file_name, "code": content }),
            ),
        };

        let response = self
            .client
            .post(self.endpoint(endpoint))
            .json(&payload)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let body: MessageResponse = Self::expect_ok(response)?.json().await?;
        Ok(body.message)
    }

    fn expect_ok(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ApiError::Status(response.status()))
        }
    }
}

#[async_trait]
impl TranslationBackend for WorkbenchApi {
    async fn translate_stream(&self, file_name: &str) -> Result<EventStream, StreamError> {
        let mut url = self.endpoint("translate_code_file");
        url.query_pairs_mut().append_pair("file_name", file_name);

        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StreamError::Connect(format!("HTTP {}", response.status())));
        }
        debug!(file = %file_name, "translation stream opened");

        Ok(decode_event_stream(response.bytes_stream().boxed()))
    }

    async fn stop_translation(&self, file_name: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(self.endpoint("stop_translation"))
            .json(&serde_json::json!({ "file_name": file_name }))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let _ = Self::expect_ok(response)?;
        Ok(())
    }
}

struct DecodeState<B> {
    chunks: BoxStream<'static, reqwest::Result<B>>,
    decoder: SseDecoder,
    ready: VecDeque<TranslationStreamEvent>,
    finished: bool,
}

/// Lifts the raw byte stream into decoded translation events.
///
/// Ends after the first transport or payload error; an incomplete frame at
/// end of stream is dropped, the consumer treats early termination as an
/// error on its own.
fn decode_event_stream<B>(chunks: BoxStream<'static, reqwest::Result<B>>) -> EventStream
where
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DecodeState {
        chunks,
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }

            match state.chunks.next().await {
                Some(Ok(chunk)) => match state.decoder.feed(chunk.as_ref()) {
                    Ok(events) => state.ready.extend(events),
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(StreamError::Payload(e.to_string())), state));
                    }
                },
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(StreamError::Transport(e.to_string())), state));
                }
                None => {
                    if state.decoder.pending_bytes() > 0 {
                        debug!(
                            pending = state.decoder.pending_bytes(),
                            "stream ended inside an event frame"
                        );
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
