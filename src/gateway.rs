//! Exchange lifecycle: persist the user turn, pick a backend, relay the
//! streamed reply to the caller and commit it once.

use bytes::Bytes;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::accumulator::ReplyAccumulator;
use crate::backend::ByteStream;
use crate::factory::{BackendFamily, BackendRegistry};
use crate::frame_decoder::{FrameDecoder, FrameStream, FrameStreamExt, DEFAULT_MAX_FRAME_BYTES};
use crate::store::ConversationStore;
use crate::{BackendRequest, ChatRequest, Conversation, Delta, Error, MediaRef, Message};

pub const DEFAULT_DECODE_ERROR_THRESHOLD: u32 = 3;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Item delivered to the caller: a text fragment, or a terminal error.
pub type OutputChunk = Result<Bytes, Error>;

/// Tuning for the relay loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Consecutive malformed frames (with no token in between) treated as a backend failure.
    pub decode_error_threshold: u32,
    /// Buffered fragments between the relay and the caller.
    pub channel_capacity: usize,
    pub max_frame_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            decode_error_threshold: DEFAULT_DECODE_ERROR_THRESHOLD,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Lifecycle of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    Idle,
    AwaitingUser,
    BackendSelected,
    Streaming,
    Committing,
    /// Reply (full or partial) committed, or the backend ended with nothing to commit.
    Completed,
    /// Caller left before any content arrived. Nothing committed.
    Aborted,
    /// Backend, configuration or storage failure.
    Failed,
}

impl ExchangeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExchangeState::Completed | ExchangeState::Aborted | ExchangeState::Failed
        )
    }
}

/// Why streaming stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    EndOfStream,
    ClientCanceled,
    BackendFailed(String),
}

/// Result of relaying one exchange.
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    pub conversation_id: String,
    pub state: ExchangeState,
    pub termination: Termination,
    /// The assistant message appended to the conversation, if any.
    pub committed: Option<Message>,
}

enum Stop {
    End,
    Canceled,
    Failed(Error),
}

/// Selects backends and runs exchanges against a conversation store.
///
/// Exchanges share nothing but the store and the registry, so one gateway
/// serves any number of them concurrently.
#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn ConversationStore>,
    backends: BackendRegistry,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        backends: BackendRegistry,
        config: GatewayConfig,
    ) -> Self {
        Self {
            store,
            backends,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run everything up to the open backend stream.
    ///
    /// The user message is saved before the backend is chosen, so it survives
    /// any error returned from here except a missing conversation.
    pub async fn open_exchange(&self, request: ChatRequest) -> Result<Exchange, Error> {
        debug!(model = %request.model_id, state = ?ExchangeState::AwaitingUser, "exchange received");

        let mut conversation = match request.conversation_id.as_deref() {
            Some(id) => self
                .store
                .find_by_id(id)
                .await?
                .ok_or_else(|| Error::not_found(id))?,
            None => self.store.create(&request.model_id),
        };

        let mut user_message = Message::user(request.prompt_text.clone());
        if let (Some(url), Some(kind)) = (request.media_url.as_ref(), request.media_kind) {
            user_message = user_message.with_media(MediaRef {
                url: url.clone(),
                kind,
            });
        }
        conversation.append_message(user_message);
        self.store.save(&conversation).await?;

        let route = self.backends.route(&request.model_id);
        debug!(
            conversation_id = %conversation.id,
            backend = route.family.name(),
            state = ?ExchangeState::BackendSelected,
            "backend selected"
        );

        let api_key = route
            .family
            .resolve_credential(&request.model_id, &request.credentials)
            .inspect_err(|e| {
                warn!(conversation_id = %conversation.id, error = %e, "exchange failed before streaming")
            })?;

        let backend_request = BackendRequest::build(
            request.model_id.clone(),
            conversation.messages(),
            request.inline_image(),
            route.supports_images,
        );

        let bytes = self
            .backends
            .adapter(route.family)
            .open(&backend_request, api_key)
            .await
            .inspect_err(|e| {
                warn!(conversation_id = %conversation.id, error = %e, "exchange failed before streaming")
            })?;

        let decoder =
            FrameDecoder::with_max_frame_bytes(route.family.frame_format(), self.config.max_frame_bytes);

        info!(
            conversation_id = %conversation.id,
            model = %request.model_id,
            backend = route.family.name(),
            "backend stream opened"
        );

        Ok(Exchange {
            conversation,
            model: request.model_id,
            family: route.family,
            frames: bytes.frames(decoder),
            store: Arc::clone(&self.store),
            decode_error_threshold: self.config.decode_error_threshold.max(1),
        })
    }

    /// Open an exchange and relay it to `output` until it finishes.
    pub async fn run(
        &self,
        request: ChatRequest,
        output: mpsc::Sender<OutputChunk>,
    ) -> Result<ExchangeOutcome, Error> {
        let exchange = self.open_exchange(request).await?;
        Ok(exchange.relay(output).await)
    }
}

/// An exchange whose backend stream is open.
pub struct Exchange {
    conversation: Conversation,
    model: String,
    family: BackendFamily,
    frames: FrameStream<ByteStream>,
    store: Arc<dyn ConversationStore>,
    decode_error_threshold: u32,
}

impl Exchange {
    pub fn conversation_id(&self) -> &str {
        &self.conversation.id
    }

    pub fn family(&self) -> BackendFamily {
        self.family
    }

    /// Forward the reply to `output` and commit it.
    ///
    /// Every non-empty token is sent as soon as it is decoded. Dropping the
    /// receiving side cancels the exchange and closes the backend stream; what
    /// was delivered so far is still committed. A fragment counts as delivered
    /// once `output` accepts it, so with a buffered channel the commit can
    /// include fragments still queued when the caller left. Use a capacity of
    /// 1 to keep the two within one fragment. Errors reach `output` as a final
    /// `Err` item.
    pub async fn relay(self, output: mpsc::Sender<OutputChunk>) -> ExchangeOutcome {
        let Exchange {
            mut conversation,
            model,
            family,
            mut frames,
            store,
            decode_error_threshold,
        } = self;

        let mut accumulator = ReplyAccumulator::new();

        let stop = loop {
            let next = tokio::select! {
                biased;
                _ = output.closed() => break Stop::Canceled,
                next = frames.next() => next,
            };

            match next {
                Some(Ok(delta)) => match &delta {
                    Delta::Token { text } => {
                        // Only delivered text is committed.
                        if !text.is_empty()
                            && output.send(Ok(Bytes::from(text.clone()))).await.is_err()
                        {
                            break Stop::Canceled;
                        }
                        accumulator.process_delta(&delta);
                    }
                    Delta::Error { detail } => {
                        let consecutive_errors = accumulator.process_delta(&delta);
                        warn!(
                            conversation_id = %conversation.id,
                            consecutive_errors,
                            %detail,
                            "skipping malformed frame"
                        );
                        if consecutive_errors >= decode_error_threshold {
                            break Stop::Failed(Error::unavailable(
                                family.name(),
                                format!(
                                    "{consecutive_errors} consecutive malformed frames, last: {detail}"
                                ),
                            ));
                        }
                    }
                    Delta::End => break Stop::End,
                },
                Some(Err(e)) => break Stop::Failed(e),
                None => break Stop::End,
            }
        };

        // Closes the backend connection.
        drop(frames);

        let (termination, failure) = match stop {
            Stop::End => (Termination::EndOfStream, None),
            Stop::Canceled => {
                warn!(conversation_id = %conversation.id, "caller disconnected, backend stream closed");
                (Termination::ClientCanceled, None)
            }
            Stop::Failed(e) => (Termination::BackendFailed(e.to_string()), Some(e)),
        };

        debug!(conversation_id = %conversation.id, state = ?ExchangeState::Committing, "committing reply");
        let tokens = accumulator.token_count();
        let committed = accumulator.finalize();

        let state = match &committed {
            Some(message) => {
                conversation.append_message(message.clone());
                match store.save(&conversation).await {
                    Ok(()) => {
                        if let Some(e) = failure {
                            let _ = output.send(Err(e)).await;
                        }
                        ExchangeState::Completed
                    }
                    Err(e) => {
                        error!(conversation_id = %conversation.id, error = %e, "failed to commit reply");
                        let _ = output.send(Err(e)).await;
                        ExchangeState::Failed
                    }
                }
            }
            None => match failure {
                Some(e) => {
                    let _ = output.send(Err(e)).await;
                    ExchangeState::Failed
                }
                None if termination == Termination::ClientCanceled => ExchangeState::Aborted,
                None => ExchangeState::Completed,
            },
        };

        let committed = if state == ExchangeState::Completed {
            committed
        } else {
            None
        };

        info!(
            conversation_id = %conversation.id,
            %model,
            backend = family.name(),
            ?state,
            ?termination,
            tokens,
            committed_chars = committed.as_ref().map_or(0, |m| m.content.chars().count()),
            "exchange finished"
        );

        ExchangeOutcome {
            conversation_id: conversation.id,
            state,
            termination,
            committed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert_eq!(ExchangeState::default(), ExchangeState::Idle);
        assert!(!ExchangeState::Streaming.is_terminal());
        assert!(!ExchangeState::Committing.is_terminal());
        assert!(ExchangeState::Completed.is_terminal());
        assert!(ExchangeState::Aborted.is_terminal());
        assert!(ExchangeState::Failed.is_terminal());
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: GatewayConfig = toml::from_str("decode_error_threshold = 5").unwrap();
        assert_eq!(config.decode_error_threshold, 5);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }
}
