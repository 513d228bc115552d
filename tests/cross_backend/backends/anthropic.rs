use super::{load_fixture, BackendConfig, BackendTestSetup, IMAGE_DATA, PROMPT};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct AnthropicTestSetup;

#[async_trait::async_trait]
impl BackendTestSetup for AnthropicTestSetup {
    fn get_config() -> BackendConfig {
        BackendConfig {
            name: "Anthropic",
            model: "claude-3-5-sonnet-latest",
            vision_model: "claude-3-haiku-20240307",
            credential: Some(("anthropic", "test-api-key")),
        }
    }

    async fn mount_streaming_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request_payload = json!({
            "model": "claude-3-5-sonnet-latest",
            "messages": [
                {"role": "user", "content": PROMPT}
            ],
            "max_tokens": 1024,
            "stream": true
        });

        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_json(&request_payload))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(load_fixture("tests/cross_backend/fixtures/anthropic/reply.sse")),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }

    async fn mount_vision_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request_payload = json!({
            "model": "claude-3-haiku-20240307",
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": IMAGE_DATA}},
                        {"type": "text", "text": PROMPT}
                    ]
                }
            ],
            "max_tokens": 1024,
            "stream": true
        });

        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(body_json(&request_payload))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(load_fixture("tests/cross_backend/fixtures/anthropic/reply.sse")),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}
