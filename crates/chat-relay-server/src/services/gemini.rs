use crate::config::GeminiConfig;
use crate::models::gemini::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
    ReferenceHandle, SessionConfig, UploadFileMetadata, UploadResponse, UploadStartRequest,
};
use crate::utils::error::ApiError;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::{Client, Response};
use serde::Serialize;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Lazy, finite, non-restartable sequence of reply fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>;

/// Upstream generative service: file store + chat session factory
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerativeService: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<ReferenceHandle, ApiError>;

    fn create_session(&self, config: &SessionConfig) -> Arc<dyn ChatSession>;
}

/// One conversation held by the upstream service
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Send a full message and wait for the complete reply.
    async fn send_message(&self, parts: Vec<Part>) -> Result<String, ApiError>;

    /// Send a text message and receive the reply as it is generated.
    async fn send_message_stream(&self, text: &str) -> Result<FragmentStream, ApiError>;
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ApiError> {
        if config.api_key.trim().is_empty() {
            return Err(ApiError::Unavailable("GEMINI_API_KEY is not set".to_string()));
        }

        // No overall timeout: a streamed reply may legitimately run for minutes
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| ApiError::InternalError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Response, ApiError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::LlmError(format!("Gemini network error: {}", e)))?;

        ensure_success(response, "Gemini request")
            .await
            .map_err(ApiError::LlmError)
    }
}

#[async_trait]
impl GenerativeService for GeminiClient {
    /// Resumable upload: open an upload session, then send the bytes and finalize.
    async fn upload(&self, path: &Path) -> Result<ReferenceHandle, ApiError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Upload(format!("Failed to read {}: {}", path.display(), e)))?;

        let mime_type = mime_guess::from_path(path).first_or_octet_stream().to_string();
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();

        debug!("Opening upload session for {} ({} bytes, {})", display_name, data.len(), mime_type);

        let start = self
            .client
            .post(self.url("upload/v1beta/files"))
            .header("x-goog-api-key", &self.config.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", &mime_type)
            .json(&UploadStartRequest {
                file: UploadFileMetadata { display_name },
            })
            .send()
            .await
            .map_err(|e| ApiError::Upload(format!("Gemini network error: {}", e)))?;

        let start = ensure_success(start, "Upload start").await.map_err(ApiError::Upload)?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Upload("Gemini did not return an upload URL".to_string()))?
            .to_string();

        let finished = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await
            .map_err(|e| ApiError::Upload(format!("Gemini network error: {}", e)))?;

        let finished = ensure_success(finished, "Upload finalize")
            .await
            .map_err(ApiError::Upload)?;

        let body: UploadResponse = finished
            .json()
            .await
            .map_err(|e| ApiError::Upload(format!("Failed to parse upload response: {}", e)))?;

        Ok(ReferenceHandle {
            name: body.file.name,
            uri: body.file.uri,
            mime_type: body.file.mime_type.unwrap_or(mime_type),
        })
    }

    fn create_session(&self, config: &SessionConfig) -> Arc<dyn ChatSession> {
        Arc::new(GeminiChat::new(self.clone(), config.clone()))
    }
}

/// Chat session over the stateless REST API. The turn history lives here and
/// is replayed with every request, a turn is recorded only once it completed.
pub struct GeminiChat {
    client: GeminiClient,
    config: SessionConfig,
    history: Arc<Mutex<Vec<Content>>>,
}

impl GeminiChat {
    pub fn new(client: GeminiClient, config: SessionConfig) -> Self {
        Self {
            client,
            config,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    fn request<'a>(&self, contents: &'a [Content]) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            contents,
            system_instruction: Content::system(self.config.system_instruction.clone()),
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                stop_sequences: self.config.stop_sequences.clone(),
            },
        }
    }

    fn with_history(&self, user: &Content) -> Vec<Content> {
        let mut contents = self.history.lock().clone();
        contents.push(user.clone());
        contents
    }
}

#[async_trait]
impl ChatSession for GeminiChat {
    async fn send_message(&self, parts: Vec<Part>) -> Result<String, ApiError> {
        let user = Content::user(parts);
        let contents = self.with_history(&user);

        let url = self
            .client
            .url(&format!("v1beta/models/{}:generateContent", self.config.model));
        let response = self.client.post_json(&url, &self.request(&contents)).await?;

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to parse Gemini response: {}", e)))?;

        if let Some(err) = &body.error {
            return Err(ApiError::LlmError(format!("Gemini error {}: {}", err.code.unwrap_or_default(), err.message)));
        }

        let reply = body.text();
        self.history.lock().extend([user, Content::model(reply.clone())]);
        Ok(reply)
    }

    async fn send_message_stream(&self, text: &str) -> Result<FragmentStream, ApiError> {
        let user = Content::user(vec![Part::text(text)]);
        let contents = self.with_history(&user);

        let url = self.client.url(&format!(
            "v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.model
        ));
        let response = self.client.post_json(&url, &self.request(&contents)).await?;

        let history = self.history.clone();
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut parser = SseParser::default();
            let mut reply = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(ApiError::LlmError(format!("Stream error: {}", e)));
                        return;
                    }
                };

                for event in parser.feed(&chunk) {
                    match event_text(&event) {
                        Ok(fragment) => {
                            reply.push_str(&fragment);
                            yield Ok(fragment);
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if let Some(event) = parser.finish() {
                match event_text(&event) {
                    Ok(fragment) => {
                        reply.push_str(&fragment);
                        yield Ok(fragment);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            history.lock().extend([user, Content::model(reply)]);
        };

        info!("Gemini stream opened ({} turns of history)", contents.len() - 1);
        Ok(Box::pin(stream))
    }
}

async fn ensure_success(response: Response, context: &str) -> Result<Response, String> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(format!("{} failed ({}): {}", context, status, body))
}

/// Text carried by one SSE `data:` payload.
fn event_text(data: &str) -> Result<String, ApiError> {
    let event: GenerateContentResponse = serde_json::from_str(data)
        .map_err(|e| ApiError::LlmError(format!("Malformed stream event: {}", e)))?;

    if let Some(err) = &event.error {
        return Err(ApiError::LlmError(format!("Gemini error {}: {}", err.code.unwrap_or_default(), err.message)));
    }

    Ok(event.text())
}

/// Incremental `text/event-stream` reader. Network chunks may end anywhere,
/// including inside a UTF-8 sequence, so bytes are buffered up to each newline.
#[derive(Default)]
struct SseParser {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseParser {
    /// Feed raw bytes, returns the data of every event completed by them.
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.push_line(line.trim_end_matches(|c: char| c == '\n' || c == '\r')) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever is left once the body ended without a trailing blank line.
    fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).to_string();
            if let Some(event) = self.push_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.take_event()
    }

    fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.take_event();
        }

        // comments, `event:` and `id:` fields carry nothing for us
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if value != "[DONE]" {
                self.data.push(value.to_string());
            }
        }
        None
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}
