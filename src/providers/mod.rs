//! Adapter implementations for each backend family.

pub mod anthropic;
pub mod local;
pub mod openai;

// Re-export commonly used adapter types
pub use anthropic::AnthropicAdapter;
pub use local::LocalInferenceAdapter;
pub use openai::OpenAIAdapter;

use futures_util::StreamExt;

use crate::backend::ByteStream;
use crate::factory::BackendFamily;
use crate::Error;

/// Send a prepared request, mapping connect failures and non-2xx replies.
pub(crate) async fn send_streaming(
    family: BackendFamily,
    request: reqwest::RequestBuilder,
) -> Result<ByteStream, Error> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::unavailable(family.name(), e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::rejected(family.name(), status.as_u16(), body));
    }

    let stream = response
        .bytes_stream()
        .map(move |chunk| chunk.map_err(|e| Error::unavailable(family.name(), e)));
    Ok(Box::pin(stream))
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
