use reqwest::Client;
use tracing::debug;

use super::types::{LocalChatRequest, LocalMessage};
use crate::backend::{BackendAdapter, ByteStream};
use crate::factory::BackendFamily;
use crate::providers::{endpoint, send_streaming};
use crate::{BackendRequest, Error, Role, Turns};

/// Local inference server adapter (Ollama-compatible chat API).
pub struct LocalInferenceAdapter {
    client: Client,
    base_url: String,
}

impl LocalInferenceAdapter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Convert the uniform request to the local wire format.
    fn convert_request(&self, request: &BackendRequest) -> LocalChatRequest {
        let messages = match &request.turns {
            Turns::History(turns) => turns
                .iter()
                .map(|turn| LocalMessage {
                    role: turn.role.as_str().to_string(),
                    content: turn.content.clone(),
                    images: None,
                })
                .collect(),
            Turns::Vision { prompt, image } => vec![LocalMessage {
                role: Role::User.as_str().to_string(),
                content: prompt.clone(),
                images: Some(vec![image.data.clone()]),
            }],
        };

        LocalChatRequest {
            model: request.model.clone(),
            messages,
            stream: true,
        }
    }
}

#[async_trait::async_trait]
impl BackendAdapter for LocalInferenceAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::Local
    }

    async fn open(
        &self,
        request: &BackendRequest,
        _api_key: Option<&str>,
    ) -> Result<ByteStream, Error> {
        let body = self.convert_request(request);
        let url = endpoint(&self.base_url, "api/chat");
        debug!(%url, model = %body.model, messages = body.messages.len(), "opening local stream");

        send_streaming(self.family(), self.client.post(url).json(&body)).await
    }
}
