//! In-memory doubles for the upstream service and the client transport.

use crate::models::{Part, ReferenceHandle, SessionConfig, StreamFrame};
use crate::services::gemini::{ChatSession, FragmentStream, GenerativeService};
use crate::services::relay::{ClientChannel, Inbound};
use crate::utils::error::ApiError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted outcome of one streamed turn.
pub enum Turn {
    /// Opening the stream fails.
    Refused(ApiError),
    /// Items yielded in order.
    Items(Vec<Result<String, ApiError>>),
}

#[derive(Default)]
pub struct FakeState {
    pub sessions_created: AtomicUsize,
    pub primes: AtomicUsize,
    pub fail_priming: AtomicBool,
    pub prime_delay: Mutex<Option<Duration>>,
    pub primed_parts: Mutex<Vec<Vec<Part>>>,
    pub turns: Mutex<VecDeque<Turn>>,
    pub sent: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct FakeService {
    pub state: Arc<FakeState>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, turn: Turn) {
        self.state.turns.lock().push_back(turn);
    }

    pub fn sessions_created(&self) -> usize {
        self.state.sessions_created.load(Ordering::SeqCst)
    }

    pub fn primes(&self) -> usize {
        self.state.primes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeService for FakeService {
    async fn upload(&self, path: &Path) -> Result<ReferenceHandle, ApiError> {
        Ok(handle(&path.to_string_lossy()))
    }

    fn create_session(&self, _config: &SessionConfig) -> Arc<dyn ChatSession> {
        self.state.sessions_created.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeSession {
            state: self.state.clone(),
        })
    }
}

pub struct FakeSession {
    state: Arc<FakeState>,
}

#[async_trait]
impl ChatSession for FakeSession {
    async fn send_message(&self, parts: Vec<Part>) -> Result<String, ApiError> {
        let delay = *self.state.prime_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.state.primes.fetch_add(1, Ordering::SeqCst);
        self.state.primed_parts.lock().push(parts);

        if self.state.fail_priming.load(Ordering::SeqCst) {
            return Err(ApiError::LlmError("quota exceeded".to_string()));
        }
        Ok("Entendido".to_string())
    }

    async fn send_message_stream(&self, text: &str) -> Result<FragmentStream, ApiError> {
        self.state.sent.lock().push(text.to_string());

        let turn = self.state.turns.lock().pop_front();
        let items = match turn {
            Some(Turn::Refused(e)) => return Err(e),
            Some(Turn::Items(items)) => items,
            None => vec![Ok("re: ".to_string()), Ok(String::new()), Ok(text.to_string())],
        };

        Ok(Box::pin(futures::stream::iter(items)))
    }
}

pub fn handle(name: &str) -> ReferenceHandle {
    ReferenceHandle {
        name: format!("files/{}", name),
        uri: format!("https://files.test/{}", name),
        mime_type: "application/pdf".to_string(),
    }
}

/// Transport double: replays inbound events, records outbound frames.
#[derive(Default)]
pub struct ScriptedChannel {
    pub inbound: VecDeque<Result<Inbound, ApiError>>,
    pub sent: Vec<StreamFrame>,
    pub closed: bool,
    /// Sending fails once this many frames went out.
    pub fail_send_after: Option<usize>,
}

impl ScriptedChannel {
    pub fn with_messages(messages: &[&str]) -> Self {
        let mut inbound: VecDeque<_> = messages
            .iter()
            .map(|m| Ok(Inbound::Text(m.to_string())))
            .collect();
        inbound.push_back(Ok(Inbound::Closed));

        Self {
            inbound,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ClientChannel for ScriptedChannel {
    async fn recv(&mut self) -> Result<Inbound, ApiError> {
        self.inbound.pop_front().unwrap_or(Ok(Inbound::Closed))
    }

    async fn send(&mut self, frame: StreamFrame) -> Result<(), ApiError> {
        assert!(!self.closed, "frame sent after close: {:?}", frame);
        if self.fail_send_after.is_some_and(|limit| self.sent.len() >= limit) {
            return Err(ApiError::Transport("broken pipe".to_string()));
        }
        self.sent.push(frame);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
