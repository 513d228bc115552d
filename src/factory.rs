use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::BackendAdapter;
use crate::frame_decoder::FrameFormat;
use crate::providers::{AnthropicAdapter, LocalInferenceAdapter, OpenAIAdapter};
use crate::{Credentials, Error};

/// Supported backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    /// Local inference server (Ollama-compatible).
    Local,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl BackendFamily {
    pub fn name(&self) -> &'static str {
        match self {
            BackendFamily::Local => "local",
            BackendFamily::OpenAi => "openai",
            BackendFamily::Anthropic => "anthropic",
        }
    }

    /// Key of this family's entry in the request credentials. `None` for families without auth.
    pub fn credential_key(&self) -> Option<&'static str> {
        match self {
            BackendFamily::Local => None,
            BackendFamily::OpenAi => Some("openai"),
            BackendFamily::Anthropic => Some("anthropic"),
        }
    }

    /// Record shape of this family's streaming frames.
    pub fn frame_format(&self) -> FrameFormat {
        match self {
            BackendFamily::Local => FrameFormat::MessageContent,
            BackendFamily::OpenAi => FrameFormat::ChoicesDelta,
            BackendFamily::Anthropic => FrameFormat::ContentBlockDelta,
        }
    }

    /// Pick this family's key out of the request credentials.
    pub fn resolve_credential<'a>(
        &self,
        model: &str,
        credentials: &'a Credentials,
    ) -> Result<Option<&'a str>, Error> {
        match self.credential_key() {
            None => Ok(None),
            Some(key) => credentials.get(key).map(Some).ok_or_else(|| {
                Error::config(format!("API key required for {model} ({key} credential missing)"))
            }),
        }
    }
}

/// Built-in model table: id, family, accepts image input.
const BUILTIN_MODELS: &[(&str, BackendFamily, bool)] = &[
    ("gpt-4", BackendFamily::OpenAi, false),
    ("gpt-4-turbo", BackendFamily::OpenAi, true),
    ("gpt-4o", BackendFamily::OpenAi, true),
    ("gpt-4o-mini", BackendFamily::OpenAi, true),
    ("gpt-3.5-turbo", BackendFamily::OpenAi, false),
    ("claude-3", BackendFamily::Anthropic, true),
    ("claude-3-5-sonnet-latest", BackendFamily::Anthropic, true),
    ("claude-3-opus-latest", BackendFamily::Anthropic, true),
    ("claude-3-haiku-20240307", BackendFamily::Anthropic, true),
    ("llava:7b", BackendFamily::Local, true),
    ("llava:13b", BackendFamily::Local, true),
    ("llama3.2-vision", BackendFamily::Local, true),
];

/// Where a model is served and what it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRoute {
    pub family: BackendFamily,
    pub supports_images: bool,
}

impl Default for ModelRoute {
    fn default() -> Self {
        Self {
            family: BackendFamily::Local,
            supports_images: false,
        }
    }
}

/// A model entry from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOverride {
    pub family: BackendFamily,
    #[serde(default)]
    pub vision: bool,
}

/// Static mapping from model identifier to backend family.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: HashMap<String, ModelRoute>,
}

impl ModelCatalog {
    /// The built-in table.
    pub fn builtin() -> Self {
        let entries = BUILTIN_MODELS
            .iter()
            .map(|(id, family, vision)| {
                (
                    id.to_string(),
                    ModelRoute {
                        family: *family,
                        supports_images: *vision,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// The built-in table with configured entries added or replaced.
    pub fn with_overrides(overrides: &HashMap<String, ModelOverride>) -> Self {
        let mut catalog = Self::builtin();
        for (id, entry) in overrides {
            catalog.insert(id.clone(), entry.family, entry.vision);
        }
        catalog
    }

    pub fn insert(&mut self, id: impl Into<String>, family: BackendFamily, supports_images: bool) {
        self.entries.insert(
            id.into(),
            ModelRoute {
                family,
                supports_images,
            },
        );
    }

    /// Resolve a model id. Unmapped ids go to the local family.
    pub fn resolve(&self, model: &str) -> ModelRoute {
        self.entries.get(model).copied().unwrap_or_default()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Base URLs and request settings for each backend family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendEndpoints {
    pub local_base_url: String,
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub anthropic_version: String,
    pub anthropic_max_tokens: u32,
    pub connect_timeout_secs: u64,
}

impl Default for BackendEndpoints {
    fn default() -> Self {
        Self {
            local_base_url: "http://localhost:11434".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            anthropic_base_url: "https://api.anthropic.com/v1".to_string(),
            anthropic_version: "2023-06-01".to_string(),
            anthropic_max_tokens: 1024,
            connect_timeout_secs: 10,
        }
    }
}

/// One adapter per backend family, plus the model catalog used to pick between them.
#[derive(Clone)]
pub struct BackendRegistry {
    local: Arc<dyn BackendAdapter>,
    openai: Arc<dyn BackendAdapter>,
    anthropic: Arc<dyn BackendAdapter>,
    catalog: ModelCatalog,
}

impl BackendRegistry {
    /// Create the HTTP adapters for the given endpoints.
    pub fn new(endpoints: &BackendEndpoints, catalog: ModelCatalog) -> Result<Self, Error> {
        // No overall timeout: replies stream for as long as the backend keeps writing.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(endpoints.connect_timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            local: Arc::new(LocalInferenceAdapter::new(
                client.clone(),
                &endpoints.local_base_url,
            )),
            openai: Arc::new(OpenAIAdapter::new(client.clone(), &endpoints.openai_base_url)),
            anthropic: Arc::new(AnthropicAdapter::new(
                client,
                &endpoints.anthropic_base_url,
                &endpoints.anthropic_version,
                endpoints.anthropic_max_tokens,
            )),
            catalog,
        })
    }

    /// Replace the adapter serving the family `adapter` reports.
    pub fn with_adapter(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        match adapter.family() {
            BackendFamily::Local => self.local = adapter,
            BackendFamily::OpenAi => self.openai = adapter,
            BackendFamily::Anthropic => self.anthropic = adapter,
        }
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn route(&self, model: &str) -> ModelRoute {
        self.catalog.resolve(model)
    }

    pub fn adapter(&self, family: BackendFamily) -> &dyn BackendAdapter {
        match family {
            BackendFamily::Local => self.local.as_ref(),
            BackendFamily::OpenAi => self.openai.as_ref(),
            BackendFamily::Anthropic => self.anthropic.as_ref(),
        }
    }
}
