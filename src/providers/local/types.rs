use serde::Serialize;

/// Local inference `/api/chat` request.
#[derive(Debug, Clone, Serialize)]
pub struct LocalChatRequest {
    pub model: String,
    pub messages: Vec<LocalMessage>,
    pub stream: bool,
}

/// Local inference message; `images` carries base64 payloads for vision models.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}
