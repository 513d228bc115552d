use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;

use crate::factory::BackendFamily;
use crate::{BackendRequest, Error};

/// Live response body of a backend, chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// A chat-completion backend that can open a streaming reply.
///
/// Adapters translate the uniform request into their wire shape and return the
/// response body unbuffered. Decoding is left to the frame decoder.
#[async_trait::async_trait]
pub trait BackendAdapter: Send + Sync + 'static {
    /// The family this adapter speaks for.
    fn family(&self) -> BackendFamily;

    /// Open the backend stream. Hosted families fail with a configuration error
    /// before any network call when `api_key` is absent.
    async fn open(&self, request: &BackendRequest, api_key: Option<&str>)
        -> Result<ByteStream, Error>;
}
