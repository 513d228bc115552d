use super::types::{ChatCompletionsRequest, ImageUrl, OpenAIContent, OpenAIContentPart, OpenAIMessage};
use crate::backend::{BackendAdapter, ByteStream};
use crate::factory::BackendFamily;
use crate::providers::{endpoint, send_streaming};
use crate::{BackendRequest, Error, Role, Turns};
use reqwest::Client;
use tracing::debug;

/// OpenAI adapter (chat completions API).
pub struct OpenAIAdapter {
    client: Client,
    base_url: String,
}

impl OpenAIAdapter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Convert the uniform request to OpenAI chat completions format.
    fn convert_request(&self, request: &BackendRequest) -> ChatCompletionsRequest {
        let messages = match &request.turns {
            Turns::History(turns) => turns
                .iter()
                .map(|turn| OpenAIMessage {
                    role: turn.role.as_str().to_string(),
                    content: OpenAIContent::Text(turn.content.clone()),
                })
                .collect(),
            Turns::Vision { prompt, image } => vec![OpenAIMessage {
                role: Role::User.as_str().to_string(),
                content: OpenAIContent::Parts(vec![
                    OpenAIContentPart::Text {
                        text: prompt.clone(),
                    },
                    OpenAIContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.data_url(),
                        },
                    },
                ]),
            }],
        };

        ChatCompletionsRequest {
            model: request.model.clone(),
            messages,
            stream: true,
        }
    }
}

#[async_trait::async_trait]
impl BackendAdapter for OpenAIAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::OpenAi
    }

    async fn open(
        &self,
        request: &BackendRequest,
        api_key: Option<&str>,
    ) -> Result<ByteStream, Error> {
        let api_key =
            api_key.ok_or_else(|| Error::config(format!("API key required for {}", request.model)))?;

        let body = self.convert_request(request);
        let url = endpoint(&self.base_url, "chat/completions");
        debug!(%url, model = %body.model, messages = body.messages.len(), "opening OpenAI stream");

        let builder = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body);

        send_streaming(self.family(), builder).await
    }
}
