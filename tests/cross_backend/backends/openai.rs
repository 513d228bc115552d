use super::{load_fixture, BackendConfig, BackendTestSetup, IMAGE_DATA, PROMPT};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct OpenAITestSetup;

#[async_trait::async_trait]
impl BackendTestSetup for OpenAITestSetup {
    fn get_config() -> BackendConfig {
        BackendConfig {
            name: "OpenAI",
            model: "gpt-4o-mini",
            vision_model: "gpt-4o",
            credential: Some(("openai", "test-api-key")),
        }
    }

    async fn mount_streaming_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request_payload = json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "user", "content": PROMPT}
            ],
            "stream": true
        });

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(body_json(&request_payload))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(load_fixture("tests/cross_backend/fixtures/openai/reply.sse")),
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
            "model": "gpt-4o",
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": PROMPT},
                        {"type": "image_url", "image_url": {"url": format!("data:image/png;base64,{IMAGE_DATA}")}}
                    ]
                }
            ],
            "stream": true
        });

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(body_json(&request_payload))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(load_fixture("tests/cross_backend/fixtures/openai/reply.sse")),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}
