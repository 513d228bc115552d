pub mod anthropic;
pub mod local;
pub mod openai;

use chat_relay::ChatRequest;
use wiremock::MockServer;

/// Prompt every setup answers with its fixture reply.
pub const PROMPT: &str = "What is the capital of France?";

/// Reply text carried by every fixture.
pub const EXPECTED_REPLY: &str = "The capital of France is Paris.";

/// Base64 payload sent as the inline image in vision tests.
pub const IMAGE_DATA: &str = "iVBORw0KGgo=";

/// Backend configuration for cross-backend testing
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub name: &'static str,
    pub model: &'static str,
    pub vision_model: &'static str,
    /// Credential entry (provider, key) the family needs, if any.
    pub credential: Option<(&'static str, &'static str)>,
}

impl BackendConfig {
    /// A request for `model` carrying this backend's credential.
    pub fn request(&self, model: &str, prompt: &str) -> ChatRequest {
        let request = ChatRequest::new(model, prompt);
        match self.credential {
            Some((provider, key)) => request.with_credential(provider, key),
            None => request,
        }
    }
}

/// Load test fixture from file
pub fn load_fixture(filename: &str) -> String {
    std::fs::read_to_string(filename)
        .unwrap_or_else(|_| panic!("Failed to load test fixture: {filename}"))
}

/// Trait for backend-specific test setup
#[async_trait::async_trait]
pub trait BackendTestSetup {
    /// Get the backend configuration
    fn get_config() -> BackendConfig;

    /// Mount a mock that checks the text request shape and streams the fixture reply
    async fn mount_streaming_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Mount a mock that checks the image request shape and streams the fixture reply
    async fn mount_vision_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
