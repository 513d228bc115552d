use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::message::{MediaKind, Message, Role};

/// Media type assumed for inline images when the media URL does not say.
const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

/// Inbound request for one exchange.
///
/// Field names follow the JSON API (camelCase); the aliases accept the
/// payload shape of the legacy web client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(alias = "model")]
    pub model_id: String,
    #[serde(alias = "message")]
    pub prompt_text: String,
    #[serde(default, alias = "chatId")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default, alias = "mediaType")]
    pub media_kind: Option<MediaKind>,
    #[serde(default, alias = "base64Image")]
    pub inline_image_data: Option<String>,
    #[serde(default, alias = "apiKeys")]
    pub credentials: Credentials,
}

impl ChatRequest {
    /// Create a text-only request for a new conversation.
    pub fn new(model_id: impl Into<String>, prompt_text: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt_text: prompt_text.into(),
            conversation_id: None,
            media_url: None,
            media_kind: None,
            inline_image_data: None,
            credentials: Credentials::default(),
        }
    }

    pub fn in_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_credential(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        self.credentials.insert(provider, key);
        self
    }

    pub fn with_media(mut self, url: impl Into<String>, kind: MediaKind) -> Self {
        self.media_url = Some(url.into());
        self.media_kind = Some(kind);
        self
    }

    pub fn with_inline_image(mut self, base64: impl Into<String>) -> Self {
        self.inline_image_data = Some(base64.into());
        self
    }

    /// The inline image payload, if one was supplied.
    pub fn inline_image(&self) -> Option<InlineImage> {
        let data = self.inline_image_data.as_deref()?.trim();
        if data.is_empty() {
            return None;
        }
        Some(InlineImage::new(data, self.media_url.as_deref()))
    }
}

/// Per-request provider credentials, keyed by provider name.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Credentials(HashMap<String, Option<String>>);

impl Credentials {
    pub fn insert(&mut self, provider: impl Into<String>, key: impl Into<String>) {
        self.0.insert(provider.into(), Some(key.into()));
    }

    /// Get the key for a provider. Blank keys count as absent.
    pub fn get(&self, provider: &str) -> Option<&str> {
        self.0
            .get(provider)
            .and_then(|key| key.as_deref())
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<_> = self.0.keys().collect();
        providers.sort();
        f.debug_tuple("Credentials").field(&providers).finish()
    }
}

/// A base64 image sent along with the current prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub data: String,
    pub media_type: String,
}

impl InlineImage {
    /// Build from a base64 payload, taking the media type from a `data:` URL when present.
    pub fn new(data: impl Into<String>, media_url: Option<&str>) -> Self {
        let media_type = media_url
            .and_then(|url| url.strip_prefix("data:"))
            .and_then(|rest| rest.split_once(';'))
            .map(|(media_type, _)| media_type)
            .filter(|media_type| media_type.starts_with("image/"))
            .unwrap_or(DEFAULT_IMAGE_MEDIA_TYPE);

        Self {
            data: data.into(),
            media_type: media_type.to_string(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// A message reduced to what backends see.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// What an adapter sends: full history, or the current turn with an image.
#[derive(Debug, Clone, PartialEq)]
pub enum Turns {
    History(Vec<ChatTurn>),
    Vision { prompt: String, image: InlineImage },
}

/// Backend-independent request handed to an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub model: String,
    pub turns: Turns,
}

impl BackendRequest {
    /// Build the request for a model.
    ///
    /// Image-capable models given an inline image only see the current turn;
    /// everything else gets the whole history.
    pub fn build(
        model: impl Into<String>,
        history: &[Message],
        image: Option<InlineImage>,
        supports_images: bool,
    ) -> Self {
        let turns = match image {
            Some(image) if supports_images => Turns::Vision {
                prompt: history
                    .iter()
                    .rev()
                    .find(|message| message.role == Role::User)
                    .map(|message| message.content.clone())
                    .unwrap_or_default(),
                image,
            },
            _ => Turns::History(history.iter().map(ChatTurn::from).collect()),
        };

        Self {
            model: model.into(),
            turns,
        }
    }
}
