use super::{load_fixture, BackendConfig, BackendTestSetup, IMAGE_DATA, PROMPT};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct LocalTestSetup;

#[async_trait::async_trait]
impl BackendTestSetup for LocalTestSetup {
    fn get_config() -> BackendConfig {
        BackendConfig {
            name: "Local",
            model: "llama3.2",
            vision_model: "llava:7b",
            credential: None,
        }
    }

    async fn mount_streaming_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request_payload = json!({
            "model": "llama3.2",
            "messages": [
                {"role": "user", "content": PROMPT}
            ],
            "stream": true
        });

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_json(&request_payload))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-ndjson")
                    .set_body_string(load_fixture("tests/cross_backend/fixtures/local/reply.ndjson")),
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
            "model": "llava:7b",
            "messages": [
                {"role": "user", "content": PROMPT, "images": [IMAGE_DATA]}
            ],
            "stream": true
        });

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_json(&request_payload))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-ndjson")
                    .set_body_string(load_fixture("tests/cross_backend/fixtures/local/reply.ndjson")),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}
