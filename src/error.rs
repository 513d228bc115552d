use thiserror::Error;

/// Errors that can occur while relaying an exchange.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Backend unavailable: {backend} - {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("Backend rejected request: {backend} returned {status}: {body}")]
    BackendRejected {
        backend: String,
        status: u16,
        body: String,
    },

    #[error("Malformed frame: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Error::ConversationNotFound(id.into())
    }

    pub fn unavailable(backend: impl Into<String>, message: impl ToString) -> Self {
        Error::BackendUnavailable {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn rejected(backend: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Error::BackendRejected {
            backend: backend.into(),
            status,
            body: body.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Error::Store(message.into())
    }

    /// Whether the error happened before any backend traffic and is never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}
