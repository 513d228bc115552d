//! Conversation persistence.
//!
//! The gateway only needs load, create and save. Listing and deletion back the
//! HTTP CRUD routes. Saves replace the whole document; concurrent writers to
//! the same conversation are not coordinated and the last save wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::{Conversation, Error};

/// Document store keyed by conversation id.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync + 'static {
    async fn find_by_id(&self, id: &str) -> Result<Option<Conversation>, Error>;

    /// Insert or replace a conversation.
    async fn save(&self, conversation: &Conversation) -> Result<(), Error>;

    /// All conversations, most recently updated first.
    async fn list(&self) -> Result<Vec<Conversation>, Error>;

    /// Delete a conversation. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, Error>;

    /// Create a new conversation. Nothing is written until [`save`](Self::save).
    fn create(&self, model: &str) -> Conversation {
        Conversation::new(model)
    }
}

fn newest_first(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConversationStore for MemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Conversation>, Error> {
        Ok(self.conversations.read().await.get(id).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), Error> {
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Conversation>, Error> {
        let mut conversations: Vec<_> = self.conversations.read().await.values().cloned().collect();
        newest_first(&mut conversations);
        Ok(conversations)
    }

    async fn delete(&self, id: &str) -> Result<bool, Error> {
        Ok(self.conversations.write().await.remove(id).is_some())
    }
}

/// One JSON document per conversation in a directory.
///
/// ```text
/// data_dir/
/// ├── 6f1c...e2.json
/// └── 9a03...7b.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open the store, creating the directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, Error> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::not_found(id));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait::async_trait]
impl ConversationStore for JsonFileStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Conversation>, Error> {
        let path = match self.path_for(id) {
            Ok(path) => path,
            Err(_) => return Ok(None),
        };

        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), Error> {
        let path = self.path_for(&conversation.id)?;
        // One temp file per write; concurrent saves of an id must not share it.
        let tmp = self
            .dir
            .join(format!("{}.{}.json.tmp", conversation.id, Uuid::new_v4()));

        let bytes = serde_json::to_vec_pretty(conversation)?;
        fs::write(&tmp, &bytes).await?;
        // Atomic replace
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Conversation>, Error> {
        let mut conversations = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            // Deleted since the directory was read.
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice::<Conversation>(&bytes) {
                Ok(conversation) => conversations.push(conversation),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable conversation"),
            }
        }

        newest_first(&mut conversations);
        Ok(conversations)
    }

    async fn delete(&self, id: &str) -> Result<bool, Error> {
        let path = match self.path_for(id) {
            Ok(path) => path,
            Err(_) => return Ok(false),
        };

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
