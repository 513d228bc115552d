//! HTTP surface: the streaming chat route plus conversation CRUD.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Instrument};

use crate::config::RelayConfig;
use crate::factory::{BackendRegistry, ModelCatalog};
use crate::gateway::Gateway;
use crate::store::{ConversationStore, JsonFileStore, MemoryStore};
use crate::{ChatRequest, Conversation, Error};

pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<Gateway>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    fn store(&self) -> &Arc<dyn ConversationStore> {
        self.gateway.store()
    }
}

/// Error response body: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Configuration(_) => StatusCode::BAD_REQUEST,
            Error::ConversationNotFound(_) => StatusCode::NOT_FOUND,
            Error::BackendUnavailable { .. } | Error::BackendRejected { .. } | Error::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::Serialization(_) | Error::Store(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Build the gateway described by `config`.
pub async fn build_gateway(config: &RelayConfig) -> Result<Gateway, Error> {
    let store: Arc<dyn ConversationStore> = match &config.data_dir {
        Some(dir) => {
            info!(data_dir = %dir.display(), "using JSON file store");
            Arc::new(JsonFileStore::open(dir).await?)
        }
        None => {
            info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let backends = BackendRegistry::new(
        &config.endpoints,
        ModelCatalog::with_overrides(&config.models),
    )?;

    Ok(Gateway::new(store, backends, config.gateway.clone()))
}

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chats", get(list_conversations).post(create_conversation))
        .route(
            "/api/chats/:id",
            get(get_conversation)
                .put(update_conversation)
                .delete(delete_conversation),
        )
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(gateway))
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, gateway: Arc<Gateway>) -> std::io::Result<()> {
    axum::serve(listener, router(gateway)).await
}

async fn health_check() -> &'static str {
    "OK"
}

/// Relay one exchange as a chunked text stream.
///
/// The response is held back until the first fragment (or the end of the
/// stream) so that failures before any content keep a proper status code.
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let exchange = state.gateway.open_exchange(request).await?;
    let conversation_id = exchange.conversation_id().to_string();

    let (tx, mut rx) = mpsc::channel(state.gateway.config().channel_capacity.max(1));
    let span = info_span!("exchange", conversation_id = %conversation_id);
    tokio::spawn(exchange.relay(tx).instrument(span));

    let first = match rx.recv().await {
        Some(Ok(fragment)) => Some(Ok(fragment)),
        Some(Err(e)) => return Err(e.into()),
        None => None,
    };
    let body = stream::iter(first).chain(ReceiverStream::new(rx));

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&conversation_id) {
        response.headers_mut().insert(CONVERSATION_ID_HEADER, value);
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
struct CreateConversation {
    model: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateConversation {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    Ok(Json(state.store().list().await?))
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(body): Json<CreateConversation>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let mut conversation = state.store().create(&body.model);
    conversation.title = body.title.filter(|title| !title.trim().is_empty());
    state.store().save(&conversation).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = state
        .store()
        .find_by_id(&id)
        .await?
        .ok_or_else(|| Error::not_found(&id))?;
    Ok(Json(conversation))
}

async fn update_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateConversation>,
) -> Result<Json<Conversation>, ApiError> {
    let mut conversation = state
        .store()
        .find_by_id(&id)
        .await?
        .ok_or_else(|| Error::not_found(&id))?;

    if let Some(model) = body.model {
        conversation.model = model;
    }
    if let Some(title) = body.title {
        conversation.title = Some(title);
    }
    conversation.touch();
    state.store().save(&conversation).await?;
    Ok(Json(conversation))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store().delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found(id).into())
    }
}
