//! Types for streaming responses.

/// Backend-independent event produced by the frame decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// A fragment of assistant text.
    Token { text: String },
    /// The backend stream closed.
    End,
    /// One frame could not be decoded.
    Error { detail: String },
}

impl Delta {
    pub fn token(text: impl Into<String>) -> Self {
        Delta::Token { text: text.into() }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Delta::Error {
            detail: detail.into(),
        }
    }

    /// Get the text of a token delta.
    pub fn text(&self) -> Option<&str> {
        match self {
            Delta::Token { text } => Some(text),
            _ => None,
        }
    }
}
