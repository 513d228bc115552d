use chat_relay::{
    BackendEndpoints, BackendRegistry, ConversationStore, ExchangeState, Gateway, GatewayConfig,
    MemoryStore, ModelCatalog, Role, Termination,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use wiremock::MockServer;

use super::backends::{
    anthropic::AnthropicTestSetup, local::LocalTestSetup, openai::OpenAITestSetup,
    BackendTestSetup, EXPECTED_REPLY, IMAGE_DATA, PROMPT,
};

/// Point every backend family at the mock server.
fn gateway_for(mock_server: &MockServer, store: Arc<MemoryStore>) -> Gateway {
    let endpoints = BackendEndpoints {
        local_base_url: mock_server.uri(),
        openai_base_url: mock_server.uri(),
        anthropic_base_url: mock_server.uri(),
        ..BackendEndpoints::default()
    };
    let registry = BackendRegistry::new(&endpoints, ModelCatalog::builtin())
        .expect("Failed to create backend registry");
    Gateway::new(store, registry, GatewayConfig::default())
}

/// Run the streaming e2e test for a specific backend
async fn run_streaming_test<T: BackendTestSetup>() -> Result<(), Box<dyn std::error::Error>> {
    let config = T::get_config();

    let mock_server = MockServer::start().await;
    T::mount_streaming_mocks(&mock_server).await?;

    let store = Arc::new(MemoryStore::new());
    let gateway = gateway_for(&mock_server, store.clone());

    let (tx, mut rx) = mpsc::channel(32);
    let exchange = gateway.open_exchange(config.request(config.model, PROMPT)).await?;
    let relay = tokio::spawn(exchange.relay(tx));

    // Fragments arrive one by one, in backend order.
    let mut fragments = Vec::new();
    while let Some(fragment) = rx.recv().await {
        fragments.push(String::from_utf8(fragment?.to_vec())?);
    }
    assert_eq!(
        fragments,
        vec!["The", " capital", " of France", " is Paris."],
        "{} fragments",
        config.name
    );

    let outcome = relay.await?;
    assert_eq!(outcome.state, ExchangeState::Completed);
    assert_eq!(outcome.termination, Termination::EndOfStream);

    let conversation = store
        .find_by_id(&outcome.conversation_id)
        .await?
        .expect("conversation should be stored");
    assert_eq!(conversation.model, config.model);
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[0].role, Role::User);
    assert_eq!(conversation.messages[0].content, PROMPT);
    assert_eq!(conversation.messages[1].role, Role::Assistant);
    assert_eq!(conversation.messages[1].content, EXPECTED_REPLY);

    Ok(())
}

/// Run the inline image test for a specific backend
async fn run_vision_test<T: BackendTestSetup>() -> Result<(), Box<dyn std::error::Error>> {
    let config = T::get_config();

    let mock_server = MockServer::start().await;
    T::mount_vision_mocks(&mock_server).await?;

    let store = Arc::new(MemoryStore::new());
    let gateway = gateway_for(&mock_server, store.clone());

    let request = config
        .request(config.vision_model, PROMPT)
        .with_inline_image(IMAGE_DATA);
    let (tx, mut rx) = mpsc::channel(32);
    let outcome = gateway.run(request, tx).await?;

    let mut reply = String::new();
    while let Some(fragment) = rx.recv().await {
        reply.push_str(std::str::from_utf8(&fragment?)?);
    }

    assert_eq!(reply, EXPECTED_REPLY, "{} vision reply", config.name);
    assert_eq!(outcome.state, ExchangeState::Completed);
    assert_eq!(
        outcome.committed.map(|message| message.content).as_deref(),
        Some(EXPECTED_REPLY)
    );

    Ok(())
}

#[tokio::test]
async fn test_local_streaming_e2e() {
    run_streaming_test::<LocalTestSetup>()
        .await
        .expect("Local streaming test failed");
}

#[tokio::test]
async fn test_openai_streaming_e2e() {
    run_streaming_test::<OpenAITestSetup>()
        .await
        .expect("OpenAI streaming test failed");
}

#[tokio::test]
async fn test_anthropic_streaming_e2e() {
    run_streaming_test::<AnthropicTestSetup>()
        .await
        .expect("Anthropic streaming test failed");
}

#[tokio::test]
async fn test_local_vision_e2e() {
    run_vision_test::<LocalTestSetup>()
        .await
        .expect("Local vision test failed");
}

#[tokio::test]
async fn test_openai_vision_e2e() {
    run_vision_test::<OpenAITestSetup>()
        .await
        .expect("OpenAI vision test failed");
}

#[tokio::test]
async fn test_anthropic_vision_e2e() {
    run_vision_test::<AnthropicTestSetup>()
        .await
        .expect("Anthropic vision test failed");
}
