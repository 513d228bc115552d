//! A streaming gateway in front of chat-completion backends.
//!
//! Requests name a model; the gateway routes it to a local inference server
//! (Ollama-compatible), OpenAI, or Anthropic, relays the reply fragment by
//! fragment as it arrives, and stores both sides of the exchange in a
//! conversation.

pub mod accumulator;
pub mod backend;
pub mod config;
pub mod error;
pub mod factory;
pub mod frame_decoder;
pub mod gateway;
pub mod providers;
pub mod server;
pub mod store;
pub mod types;

// Re-export core types for easy usage
pub use accumulator::ReplyAccumulator;
pub use backend::{BackendAdapter, ByteStream};
pub use config::RelayConfig;
pub use error::Error;
pub use factory::{BackendEndpoints, BackendFamily, BackendRegistry, ModelCatalog, ModelRoute};
pub use frame_decoder::{FrameDecoder, FrameFormat, FrameStreamExt};
pub use gateway::{Exchange, ExchangeOutcome, ExchangeState, Gateway, GatewayConfig, Termination};
pub use providers::*;
pub use store::{ConversationStore, JsonFileStore, MemoryStore};
pub use types::*;
