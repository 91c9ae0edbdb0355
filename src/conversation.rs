//! Conversation aggregate
//!
//! Owns the ordered message log. Every structural change to the log bumps
//! `last_updated`; queries never do.

#[cfg(test)]
mod proptests;

use crate::error::{ChatError, ChatResult};
use crate::message::{Content, Message, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_TOOL, ROLE_USER};
use crate::storage::Options;
use crate::tools::ToolCall;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// An ordered, mutable log of messages plus session metadata.
///
/// Direct serialization produces the shape handed to provider adapters:
/// per-message metadata is dropped, and `key`/`options` never appear.
/// Use [`Conversation::save`] to persist metadata as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub id: String,
    /// Storage locator, independent of `id`
    #[serde(skip)]
    pub key: String,
    #[serde(default)]
    pub(crate) messages: Vec<Message>,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    /// Session-level metadata, never part of a provider request
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, Value>,
    #[serde(skip)]
    pub options: Options,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new("")
    }
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_options(id, Options::default())
    }

    pub fn with_options(id: impl Into<String>, options: Options) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            key: String::new(),
            messages: Vec::new(),
            created: now,
            last_updated: now,
            meta: HashMap::new(),
            options,
        }
    }

    /// The message sequence as sent to a provider
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    // ==================== Appending ====================

    /// Append and return a handle to the stored message
    pub fn push(&mut self, message: Message) -> &mut Message {
        self.messages.push(message);
        self.touch();
        let last = self.messages.len() - 1;
        &mut self.messages[last]
    }

    /// Append a message; `None` is ignored
    pub fn append(&mut self, message: impl Into<Option<Message>>) {
        if let Some(message) = message.into() {
            self.push(message);
        }
    }

    /// Append unless this very message (or a clone of it) is already in the
    /// log. Returns whether it was appended.
    pub fn append_once(&mut self, message: Message) -> bool {
        let identity = message.identity();
        if self.messages.iter().any(|m| m.identity() == identity) {
            return false;
        }
        self.push(message);
        true
    }

    /// Insert at the front of the log
    pub fn prepend(&mut self, message: Message) {
        self.messages.insert(0, message);
        self.touch();
    }

    pub fn add_role_content(
        &mut self,
        role: impl Into<String>,
        content: impl Into<Content>,
    ) -> &mut Message {
        self.push(Message::new(role, content))
    }

    pub fn add_user_content(&mut self, content: impl Into<Content>) -> &mut Message {
        self.add_role_content(ROLE_USER, content)
    }

    pub fn add_assistant_content(&mut self, content: impl Into<Content>) -> &mut Message {
        self.add_role_content(ROLE_ASSISTANT, content)
    }

    pub fn add_assistant_tool_call(&mut self, tool_calls: Vec<ToolCall>) -> &mut Message {
        self.push(Message::assistant_tool_calls(tool_calls))
    }

    /// Append a tool response. Strings are stored as-is; any other value is
    /// stored as its JSON encoding.
    pub fn add_tool_content<T: Serialize + ?Sized>(
        &mut self,
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: &T,
    ) -> ChatResult<&mut Message> {
        let content = match serde_json::to_value(content).map_err(ChatError::Encoding)? {
            Value::String(text) => text,
            _ => serde_json::to_string(content).map_err(ChatError::Encoding)?,
        };
        Ok(self.push(Message::tool(name, tool_call_id, content)))
    }

    pub fn add_tool_raw_content(
        &mut self,
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> &mut Message {
        self.push(Message::tool(name, tool_call_id, content.into()))
    }

    /// Append a tool response from raw bytes. Invalid UTF-8 sequences are
    /// replaced with U+FFFD.
    pub fn add_tool_bytes(
        &mut self,
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: &[u8],
    ) -> &mut Message {
        let content = String::from_utf8_lossy(content).into_owned();
        self.push(Message::tool(name, tool_call_id, content))
    }

    /// Replace the content of a leading system message, or insert one at the
    /// front. Always counts as a mutation, even if the text is unchanged.
    pub fn set_system_content(&mut self, content: impl Into<Content>) {
        let content = content.into();
        match self.messages.first_mut() {
            Some(first) if first.role == ROLE_SYSTEM => first.content = content,
            _ => self.messages.insert(0, Message::system(content)),
        }
        self.touch();
    }

    // ==================== Removing ====================

    pub fn remove_last(&mut self) -> Option<Message> {
        let removed = self.messages.pop();
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn shift_first(&mut self) -> Option<Message> {
        if self.messages.is_empty() {
            return None;
        }
        let removed = self.messages.remove(0);
        self.touch();
        Some(removed)
    }

    /// Remove the last message only if it has the given role
    pub fn pop_last_if_role(&mut self, role: &str) -> Option<Message> {
        if self.last_role() != Some(role) {
            return None;
        }
        self.remove_last()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.touch();
    }

    // ==================== Queries ====================

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_role(&self) -> Option<&str> {
        self.last().map(|m| m.role.as_str())
    }

    pub fn last_by_role(&self, role: &str) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == role)
    }

    /// Most recent message whose structured content carries `kind` as its
    /// `type` discriminator
    pub fn last_by_content_type(&self, kind: &str) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.content.has_type(kind))
    }

    pub fn count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn count_by_role(&self, role: &str) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    pub fn count_tool_responses(&self) -> usize {
        self.count_by_role(ROLE_TOOL)
    }

    /// Visit every message in order, stopping at the first error
    pub fn range<E, F>(&self, visit: F) -> Result<(), E>
    where
        F: FnMut(&Message) -> Result<(), E>,
    {
        self.messages.iter().try_for_each(visit)
    }

    /// Visit messages with the given role in order, stopping at the first error
    pub fn range_by_role<E, F>(&self, role: &str, visit: F) -> Result<(), E>
    where
        F: FnMut(&Message) -> Result<(), E>,
    {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .try_for_each(visit)
    }
}
