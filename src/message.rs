//! Message types for the conversation log
//!
//! A [`Message`] serializes to the provider-facing wire shape:
//! `{"role", "content", "tool_calls"?, "name"?, "tool_call_id"?}`.
//! Per-message metadata is deliberately absent from that shape and only
//! travels through the storage envelope (see [`crate::storage`]).

use crate::tools::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_TOOL: &str = "tool";
pub const ROLE_SYSTEM: &str = "system";

/// Message content
///
/// Decoding goes through `From<Value>`: `null` is `Absent`, a string is
/// `Text`, an array of typed parts is `Parts`, and anything else is kept
/// verbatim as `Value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged, from = "Value")]
pub enum Content {
    #[default]
    Absent,
    Text(String),
    Parts(Vec<Part>),
    /// Structured content that is none of the above. Build it with
    /// `Content::from(value)`; a null, string or parts-shaped array placed
    /// here directly decodes back as `Absent`, `Text` or `Parts`.
    Value(Value),
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Absent | Self::Parts(_) | Self::Value(_) => None,
        }
    }

    pub fn as_parts(&self) -> Option<&[Part]> {
        match self {
            Self::Parts(parts) => Some(parts),
            Self::Absent | Self::Text(_) | Self::Value(_) => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Whether structured content carries the given `type` discriminator.
    ///
    /// Parts match when any part has that type; a structured value matches
    /// when it is an object whose `type` field equals `kind`.
    pub fn has_type(&self, kind: &str) -> bool {
        match self {
            Self::Parts(parts) => parts.iter().any(|part| part.kind == kind),
            Self::Value(Value::Object(map)) => {
                map.get("type").and_then(Value::as_str) == Some(kind)
            }
            Self::Absent | Self::Text(_) | Self::Value(_) => false,
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<Part>> for Content {
    fn from(parts: Vec<Part>) -> Self {
        Self::Parts(parts)
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Absent,
            Value::String(text) => Self::Text(text),
            Value::Array(items) => {
                let array = Value::Array(items);
                match serde_json::from_value::<Vec<Part>>(array.clone()) {
                    Ok(parts) => Self::Parts(parts),
                    Err(_) => Self::Value(array),
                }
            }
            other => Self::Value(other),
        }
    }
}

/// One segment of multimodal content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<ImageUrl>,
    /// Provider-specific fields this crate does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            image_url: None,
            extra: Map::new(),
        }
    }

    pub fn image_url(url: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind: "image_url".to_string(),
            text: None,
            image_url: Some(ImageUrl {
                url: url.into(),
                detail,
            }),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A single turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Function name, tool responses only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Call being answered, tool responses only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(skip)]
    metadata: HashMap<String, Value>,
    /// Identity token; clones share it, fresh and deserialized messages don't
    #[serde(skip, default = "Uuid::new_v4")]
    identity: Uuid,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<Content>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: Vec::new(),
            name: None,
            tool_call_id: None,
            metadata: HashMap::new(),
            identity: Uuid::new_v4(),
        }
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(ROLE_USER, content)
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(ROLE_ASSISTANT, content)
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Self::new(ROLE_SYSTEM, content)
    }

    /// Assistant turn that only requests tool execution
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        let mut message = Self::new(ROLE_ASSISTANT, Content::Absent);
        message.tool_calls = tool_calls;
        message
    }

    /// Tool response answering `tool_call_id`
    pub fn tool(
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<Content>,
    ) -> Self {
        let mut message = Self::new(ROLE_TOOL, content);
        message.name = Some(name.into());
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    /// Text content, or `None` for absent or structured content
    pub fn content_str(&self) -> Option<&str> {
        self.content.as_text()
    }

    pub fn content_parts(&self) -> Option<&[Part]> {
        self.content.as_parts()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    // ==================== Metadata ====================

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn remove_meta(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    pub fn meta_keys(&self) -> Vec<&str> {
        self.metadata.keys().map(String::as_str).collect()
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub(crate) fn set_metadata(&mut self, metadata: HashMap<String, Value>) {
        self.metadata = metadata;
    }
}
