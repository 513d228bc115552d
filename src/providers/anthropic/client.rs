use reqwest::Client;
use tracing::debug;

use super::types::*;
use crate::backend::{BackendAdapter, ByteStream};
use crate::factory::BackendFamily;
use crate::providers::{endpoint, send_streaming};
use crate::{BackendRequest, Error, Role, Turns};

/// Anthropic Claude adapter (messages API).
pub struct AnthropicAdapter {
    client: Client,
    base_url: String,
    api_version: String,
    max_tokens: u32,
}

impl AnthropicAdapter {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_version: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_version: api_version.into(),
            max_tokens,
        }
    }

    /// Convert the uniform request to Anthropic format.
    fn convert_request(&self, request: &BackendRequest) -> AnthropicRequest {
        let messages = match &request.turns {
            Turns::History(turns) => turns
                .iter()
                .map(|turn| AnthropicMessage {
                    role: turn.role.as_str().to_string(),
                    content: AnthropicContent::Text(turn.content.clone()),
                })
                .collect(),
            // Anthropic expects the image block ahead of the question about it.
            Turns::Vision { prompt, image } => vec![AnthropicMessage {
                role: Role::User.as_str().to_string(),
                content: AnthropicContent::Blocks(vec![
                    AnthropicContentBlock::Image {
                        source: AnthropicImageSource {
                            source_type: "base64".to_string(),
                            media_type: image.media_type.clone(),
                            data: image.data.clone(),
                        },
                    },
                    AnthropicContentBlock::Text {
                        text: prompt.clone(),
                    },
                ]),
            }],
        };

        AnthropicRequest {
            model: request.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            stream: true,
        }
    }
}

#[async_trait::async_trait]
impl BackendAdapter for AnthropicAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::Anthropic
    }

    async fn open(
        &self,
        request: &BackendRequest,
        api_key: Option<&str>,
    ) -> Result<ByteStream, Error> {
        let api_key =
            api_key.ok_or_else(|| Error::config(format!("API key required for {}", request.model)))?;

        let body = self.convert_request(request);
        let url = endpoint(&self.base_url, "messages");
        debug!(%url, model = %body.model, messages = body.messages.len(), "opening Anthropic stream");

        let builder = self
            .client
            .post(url)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.api_version)
            .header("Content-Type", "application/json")
            .json(&body);

        send_streaming(self.family(), builder).await
    }
}
