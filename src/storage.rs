//! Conversation persistence over a key-value blob store
//!
//! The storage envelope differs from the direct (provider-facing) JSON of a
//! [`Conversation`]: every message is wrapped together with its metadata as
//! a sibling `meta` field, and the session-level `meta` sits at the top:
//!
//! ```json
//! {"id": "...", "messages": [{"role": "user", "content": "hi", "meta": {...}}],
//!  "meta": {...}, "created": "...", "last_updated": "..."}
//! ```

mod file;
mod logging;
mod memory;

pub use file::FileStore;
pub use logging::LoggingStore;
pub use memory::MemoryStore;

use crate::config::ChatConfig;
use crate::conversation::Conversation;
use crate::error::{ChatError, ChatResult};
use crate::message::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Key not found: {0}")]
    NotFound(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Byte store the conversation is persisted to
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read the blob stored under `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Write `data` under `key`, replacing any previous blob
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError>;

    /// Remove the blob under `key`
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        (**self).put(key, data).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

/// Runtime options attached to a conversation; never serialized
#[derive(Clone, Default)]
pub struct Options {
    pub store: Option<Arc<dyn BlobStore>>,
}

impl Options {
    pub fn with_store(store: Arc<dyn BlobStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::with_store(config.build_store())
    }

    fn store(&self) -> ChatResult<Arc<dyn BlobStore>> {
        self.store.clone().ok_or_else(ChatError::store_not_configured)
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("store", &self.store.as_ref().map(|_| "BlobStore"))
            .finish()
    }
}

// ============================================================
// Storage envelope
// ============================================================

/// Fields that make a stored entry a message; an entry carrying none of
/// them is a leftover wrapper and is dropped on load
const MESSAGE_FIELDS: [&str; 5] = ["role", "content", "tool_calls", "name", "tool_call_id"];

#[derive(Debug, Serialize)]
struct StoredMessage {
    #[serde(flatten)]
    message: Message,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    meta: HashMap<String, Value>,
}

impl StoredMessage {
    /// `None` when the entry has no message fields, e.g. `{"message": null}`
    fn from_entry(mut entry: Map<String, Value>) -> serde_json::Result<Option<Self>> {
        let has_message = MESSAGE_FIELDS
            .iter()
            .any(|field| entry.get(*field).is_some_and(|value| !value.is_null()));
        if !has_message {
            return Ok(None);
        }
        let meta = match entry.remove("meta") {
            Some(meta) => serde_json::from_value::<Option<HashMap<String, Value>>>(meta)?
                .unwrap_or_default(),
            None => HashMap::new(),
        };
        let message = serde_json::from_value(Value::Object(entry))?;
        Ok(Some(Self { message, meta }))
    }
}

fn deserialize_entries<'de, D>(deserializer: D) -> Result<Vec<Option<StoredMessage>>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<Option<Map<String, Value>>>>::deserialize(deserializer)?;
    entries
        .unwrap_or_default()
        .into_iter()
        .map(|entry| match entry {
            Some(entry) => StoredMessage::from_entry(entry).map_err(de::Error::custom),
            None => Ok(None),
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredConversation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    /// `null` entries and entries without message fields are dropped on load
    #[serde(default, deserialize_with = "deserialize_entries")]
    messages: Vec<Option<StoredMessage>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    meta: HashMap<String, Value>,
    /// Missing timestamps load as the Unix epoch
    #[serde(default)]
    created: DateTime<Utc>,
    #[serde(default)]
    last_updated: DateTime<Utc>,
}

fn encode(conversation: &Conversation) -> ChatResult<Vec<u8>> {
    let stored = StoredConversation {
        id: conversation.id.clone(),
        messages: conversation
            .messages()
            .iter()
            .map(|message| {
                Some(StoredMessage {
                    message: message.clone(),
                    meta: message.metadata().clone(),
                })
            })
            .collect(),
        meta: conversation.meta.clone(),
        created: conversation.created,
        last_updated: conversation.last_updated,
    };
    serde_json::to_vec(&stored).map_err(ChatError::Encoding)
}

fn decode(bytes: &[u8]) -> ChatResult<StoredConversation> {
    serde_json::from_slice(bytes).map_err(ChatError::Parse)
}

/// Overwrite the persisted fields of `conversation`. Only called once the
/// envelope has fully decoded.
fn apply(conversation: &mut Conversation, stored: StoredConversation, key: &str) -> usize {
    let total = stored.messages.len();
    let messages: Vec<Message> = stored
        .messages
        .into_iter()
        .flatten()
        .map(|StoredMessage { mut message, meta }| {
            message.set_metadata(meta);
            message
        })
        .collect();

    if messages.len() < total {
        tracing::debug!(
            key = %key,
            skipped = total - messages.len(),
            "Skipped empty message entries in stored conversation"
        );
    }

    conversation.id = stored.id;
    conversation.key = key.to_string();
    conversation.messages = messages;
    conversation.meta = stored.meta;
    conversation.created = stored.created;
    conversation.last_updated = stored.last_updated;
    conversation.count()
}

// ============================================================
// Conversation persistence
// ============================================================

impl Conversation {
    /// Persist this conversation, including all metadata, under `key`
    pub async fn save(&self, key: &str) -> ChatResult<()> {
        let store = self.options.store()?;
        save_to(store.as_ref(), self, key).await
    }

    /// Replace this conversation's contents with the one stored under `key`.
    ///
    /// On failure the conversation is left untouched.
    pub async fn load(&mut self, key: &str) -> ChatResult<()> {
        let store = self.options.store()?;
        let bytes = store.get(key).await?;
        let stored = decode(&bytes)?;
        let count = apply(self, stored, key);
        tracing::debug!(key = %key, messages = count, bytes = bytes.len(), "Loaded conversation");
        Ok(())
    }

    /// Remove whatever is stored under `key`
    pub async fn delete(&self, key: &str) -> ChatResult<()> {
        let store = self.options.store()?;
        delete_from(store.as_ref(), key).await
    }
}

async fn save_to(store: &dyn BlobStore, conversation: &Conversation, key: &str) -> ChatResult<()> {
    let data = encode(conversation)?;
    let bytes = data.len();
    store.put(key, data).await?;
    tracing::debug!(
        key = %key,
        conversation_id = %conversation.id,
        messages = conversation.count(),
        bytes,
        "Saved conversation"
    );
    Ok(())
}

async fn delete_from(store: &dyn BlobStore, key: &str) -> ChatResult<()> {
    store.delete(key).await?;
    tracing::info!(key = %key, "Deleted stored conversation");
    Ok(())
}

/// Store handle for callers that hold the backend rather than a conversation
#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn BlobStore>,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.build_store())
    }

    pub fn options(&self) -> Options {
        Options::with_store(Arc::clone(&self.store))
    }

    /// Load the conversation stored under `key`; it comes back wired to
    /// this store so it can be saved again directly.
    pub async fn load(&self, key: &str) -> ChatResult<Conversation> {
        let mut conversation = Conversation::with_options("", self.options());
        conversation.load(key).await?;
        Ok(conversation)
    }

    pub async fn save(&self, conversation: &Conversation, key: &str) -> ChatResult<()> {
        save_to(self.store.as_ref(), conversation, key).await
    }

    pub async fn delete(&self, key: &str) -> ChatResult<()> {
        delete_from(self.store.as_ref(), key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Content, Part, ROLE_TOOL};
    use crate::tools::ToolCall;
    use chrono::TimeZone;
    use serde_json::json;

    /// Store whose writes and deletes always fail
    struct FailingStore;

    #[async_trait]
    impl BlobStore for FailingStore {
        async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            Err(StoreError::NotFound(key.to_string()))
        }

        async fn put(&self, _key: &str, _data: Vec<u8>) -> Result<(), StoreError> {
            Err(StoreError::Backend("write refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("delete refused".to_string()))
        }
    }

    fn memory() -> (Arc<MemoryStore>, Options) {
        let store = Arc::new(MemoryStore::new());
        let options = Options::with_store(store.clone());
        (store, options)
    }

    fn weather_chat(options: Options) -> Conversation {
        let mut chat = Conversation::with_options("test-id", options);
        chat.meta.insert("session".to_string(), json!("abc"));
        chat.add_user_content("What is the weather like in Boston?")
            .set_meta("content_type", "text/plain");
        chat.add_assistant_tool_call(vec![ToolCall::function(
            "call_9pw1qnYScqvGrCH58HWCvFH6",
            "get_current_weather",
            r#"{"location": "Boston, MA"}"#,
        )]);
        chat.add_tool_raw_content(
            "get_current_weather",
            "call_9pw1qnYScqvGrCH58HWCvFH6",
            r#"{"temperature": "22", "unit": "celsius", "description": "Sunny"}"#,
        )
        .set_meta("latency_ms", 42);
        chat.add_user_content(vec![Part::text("and this?"), Part::image_url("https://example.com/a.png", None)]);
        chat
    }

    #[tokio::test]
    async fn test_save_load_roundtrip_preserves_metadata() {
        let (_store, options) = memory();
        let original = weather_chat(options.clone());
        original.save("chats/1").await.unwrap();

        let mut loaded = Conversation::with_options("", options);
        loaded.load("chats/1").await.unwrap();

        assert_eq!(loaded.id, "test-id");
        assert_eq!(loaded.key, "chats/1");
        assert_eq!(loaded.created, original.created);
        assert_eq!(loaded.last_updated, original.last_updated);
        assert_eq!(loaded.meta["session"], json!("abc"));
        assert_eq!(loaded.count(), original.count());

        for (got, want) in loaded.messages().iter().zip(original.messages()) {
            assert_eq!(got.role, want.role);
            assert_eq!(got.content, want.content);
            assert_eq!(got.tool_calls, want.tool_calls);
            assert_eq!(got.name, want.name);
            assert_eq!(got.tool_call_id, want.tool_call_id);
            assert_eq!(got.metadata(), want.metadata());
        }
        assert_eq!(loaded.messages()[0].meta("content_type"), Some(&json!("text/plain")));
        assert_eq!(loaded.messages()[2].meta("latency_ms"), Some(&json!(42)));
        assert!(matches!(loaded.messages()[3].content, Content::Parts(_)));

        // The direct shape of the same conversation carries no metadata.
        let direct = serde_json::to_string(&original).unwrap();
        assert!(!direct.contains("content_type"));
        assert!(!direct.contains("latency_ms"));
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let (store, options) = memory();
        let mut chat = Conversation::with_options("env", options);
        chat.created = Utc.with_ymd_and_hms(2025, 3, 29, 0, 0, 0).unwrap();
        chat.add_user_content("hi").set_meta("k", "v");
        chat.add_assistant_content("hello");
        chat.save("env").await.unwrap();

        let raw: Value = serde_json::from_slice(&store.get("env").await.unwrap()).unwrap();
        assert_eq!(raw["id"], "env");
        assert_eq!(raw["created"], "2025-03-29T00:00:00Z");
        assert_eq!(
            raw["messages"][0],
            json!({"role": "user", "content": "hi", "meta": {"k": "v"}})
        );
        assert_eq!(raw["messages"][1], json!({"role": "assistant", "content": "hello"}));
        assert!(raw.get("meta").is_none());
    }

    #[tokio::test]
    async fn test_load_skips_null_entries() {
        let (store, options) = memory();
        let raw = json!({
            "id": "x",
            "messages": [
                {"role": "user", "content": "one", "meta": {"a": 1}},
                null,
                {"role": "tool", "content": "r", "name": "f", "tool_call_id": "c1"}
            ],
            "created": "2025-03-29T00:00:00Z",
            "last_updated": "2025-03-29T12:00:00Z"
        });
        store.put("k", serde_json::to_vec(&raw).unwrap()).await.unwrap();

        let mut chat = Conversation::with_options("", options);
        chat.load("k").await.unwrap();

        assert_eq!(chat.count(), 2);
        assert_eq!(chat.messages()[0].meta("a"), Some(&json!(1)));
        assert_eq!(chat.messages()[1].role, ROLE_TOOL);
        assert!(chat.meta.is_empty());
    }

    #[tokio::test]
    async fn test_load_skips_entries_without_message_fields() {
        let (store, options) = memory();
        store
            .put(
                "nil-message",
                br#"{"id":"nil-message-id","messages":[{"role":"user","content":"Valid message"}, {"message":null}]}"#
                    .to_vec(),
            )
            .await
            .unwrap();
        let raw = json!({
            "id": "x",
            "messages": [
                {"role": "user", "content": "Valid message"},
                {"message": null},
                {"meta": {"k": 1}},
                {"role": null, "content": null}
            ],
            "created": "2025-03-29T00:00:00Z",
            "last_updated": "2025-03-29T12:00:00Z"
        });
        store.put("wrappers", serde_json::to_vec(&raw).unwrap()).await.unwrap();

        let mut chat = Conversation::with_options("", options);
        for (key, id) in [("nil-message", "nil-message-id"), ("wrappers", "x")] {
            chat.load(key).await.unwrap();
            assert_eq!(chat.id, id);
            assert_eq!(chat.count(), 1, "{key}");
            assert_eq!(chat.messages()[0].role, "user");
            assert_eq!(chat.messages()[0].content_str(), Some("Valid message"));
        }
    }

    #[tokio::test]
    async fn test_load_tolerates_null_meta_and_messages() {
        let (store, options) = memory();
        let raw = json!({
            "messages": [{"role": "assistant", "content": "hi", "meta": null}],
            "created": "2025-03-29T00:00:00Z",
            "last_updated": "2025-03-29T12:00:00Z"
        });
        store.put("null-meta", serde_json::to_vec(&raw).unwrap()).await.unwrap();
        store
            .put("null-messages", br#"{"id":"n","messages":null}"#.to_vec())
            .await
            .unwrap();

        let mut chat = Conversation::with_options("", options);
        chat.load("null-meta").await.unwrap();
        assert_eq!(chat.count(), 1);
        assert!(chat.messages()[0].metadata().is_empty());

        chat.load("null-messages").await.unwrap();
        assert_eq!(chat.id, "n");
        assert!(chat.is_empty());
    }

    #[tokio::test]
    async fn test_load_without_timestamps_uses_epoch() {
        let (store, options) = memory();
        store
            .put("no-timestamps", br#"{"id":"t","messages":[]}"#.to_vec())
            .await
            .unwrap();

        let mut chat = Conversation::with_options("", options);
        chat.load("no-timestamps").await.unwrap();
        assert_eq!(chat.id, "t");
        assert_eq!(chat.created, DateTime::<Utc>::default());
        assert_eq!(chat.last_updated, DateTime::<Utc>::default());
    }

    #[tokio::test]
    async fn test_unconfigured_store() {
        let mut chat = Conversation::new("c");
        let save = chat.save("k").await.unwrap_err();
        let delete = chat.delete("k").await.unwrap_err();
        let load = chat.load("k").await.unwrap_err();
        for err in [save, delete, load] {
            assert!(matches!(err, ChatError::Configuration(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn test_load_missing_key_is_storage_error() {
        let (_store, options) = memory();
        let mut chat = Conversation::with_options("keep", options);
        chat.add_user_content("untouched");

        let err = chat.load("missing").await.unwrap_err();
        assert!(matches!(err, ChatError::Storage(StoreError::NotFound(_))));
        assert_eq!(chat.id, "keep");
        assert_eq!(chat.count(), 1);
    }

    #[tokio::test]
    async fn test_load_invalid_envelope_leaves_conversation_untouched() {
        let (store, options) = memory();
        store.put("bad", b"{\"messages\": [".to_vec()).await.unwrap();
        store
            .put("bad-message", br#"{"messages": [{"role": 7}]}"#.to_vec())
            .await
            .unwrap();

        let mut chat = Conversation::with_options("keep", options);
        chat.add_user_content("untouched");

        for key in ["bad", "bad-message"] {
            let err = chat.load(key).await.unwrap_err();
            assert!(matches!(err, ChatError::Parse(_)), "{key}: {err}");
            assert_eq!(chat.id, "keep");
            assert_eq!(chat.key, "");
            assert_eq!(chat.count(), 1);
        }
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_blob() {
        let (store, options) = memory();
        let chat = weather_chat(options);
        chat.save("k").await.unwrap();
        let before = store.get("k").await.unwrap();

        let failing = ConversationStore::new(Arc::new(FailingStore));
        let err = failing.save(&chat, "k").await.unwrap_err();
        assert!(matches!(err, ChatError::Storage(StoreError::Backend(_))));
        assert_eq!(store.get("k").await.unwrap(), before);

        let err = failing.delete("k").await.unwrap_err();
        assert!(matches!(err, ChatError::Storage(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, options) = memory();
        let chat = weather_chat(options);
        chat.save("k").await.unwrap();
        assert!(store.contains("k"));

        chat.delete("k").await.unwrap();
        assert!(!store.contains("k"));

        let mut reloaded = Conversation::with_options("", chat.options.clone());
        assert!(matches!(
            reloaded.load("k").await.unwrap_err(),
            ChatError::Storage(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_conversation_store() {
        let store = ConversationStore::new(Arc::new(MemoryStore::new()));
        let chat = weather_chat(Options::default());
        store.save(&chat, "s/1").await.unwrap();

        let mut loaded = store.load("s/1").await.unwrap();
        assert_eq!(loaded.key, "s/1");
        assert_eq!(loaded.count(), 4);
        assert_eq!(loaded.pending_tool_calls().len(), 0);

        // Loaded conversations can be saved back through their own options.
        loaded.add_assistant_content("It is sunny.");
        loaded.save("s/1").await.unwrap();
        assert_eq!(store.load("s/1").await.unwrap().count(), 5);

        store.delete("s/1").await.unwrap();
        assert!(store.load("s/1").await.is_err());
    }

    #[test]
    fn test_options_debug_hides_store() {
        let (_store, options) = memory();
        assert_eq!(format!("{options:?}"), r#"Options { store: Some("BlobStore") }"#);
        assert_eq!(format!("{:?}", Options::default()), "Options { store: None }");
    }
}
