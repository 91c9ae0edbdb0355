//! Tool calls and pending-call resolution
//!
//! An assistant turn may carry [`ToolCall`]s. A call is pending until some
//! tool-role message anywhere in the log carries its id as `tool_call_id`.
//! [`Conversation::range_pending_tool_calls`] hands each pending call to a
//! handler, in log order, through a [`ToolCallContext`].

pub mod catalog;

pub use catalog::{FunctionDefinition, Parameters, Property, Tool, ToolCatalog};

use crate::conversation::Conversation;
use crate::error::{ChatError, ChatResult};
use crate::message::{Message, ROLE_ASSISTANT, ROLE_TOOL};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A request, embedded in an assistant turn, to invoke a function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_call_type")]
    pub r#type: String,
    #[serde(default)]
    pub function: Function,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            r#type: default_call_type(),
            function: Function {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function invocation; `arguments` stays JSON-encoded until resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl Function {
    /// Parse the JSON-encoded arguments. An empty string yields an empty map.
    pub fn arguments_map(&self) -> ChatResult<Map<String, Value>> {
        if self.arguments.is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&self.arguments).map_err(ChatError::Parse)
    }
}

/// A pending call bound to the conversation it was issued in
pub struct ToolCallContext<'a> {
    call: ToolCall,
    conversation: &'a mut Conversation,
}

impl<'a> ToolCallContext<'a> {
    pub fn new(call: ToolCall, conversation: &'a mut Conversation) -> Self {
        Self { call, conversation }
    }

    pub fn tool_call(&self) -> &ToolCall {
        &self.call
    }

    pub fn id(&self) -> &str {
        &self.call.id
    }

    pub fn name(&self) -> &str {
        &self.call.function.name
    }

    pub fn arguments(&self) -> ChatResult<Map<String, Value>> {
        self.call.function.arguments_map()
    }

    /// Answer the call: append a tool message whose content is `result`
    /// encoded as JSON. Nothing is appended if encoding fails.
    pub fn resolve<T: Serialize + ?Sized>(&mut self, result: &T) -> ChatResult<&mut Message> {
        let content = serde_json::to_string(result).map_err(ChatError::Encoding)?;
        let message = Message::tool(self.call.function.name.clone(), self.call.id.clone(), content);
        Ok(self.conversation.push(message))
    }

    pub fn conversation(&self) -> &Conversation {
        self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        self.conversation
    }
}

impl Conversation {
    /// Ids of every call that already has a tool response, wherever it sits
    fn answered_call_ids(&self) -> HashSet<String> {
        self.messages()
            .iter()
            .filter(|msg| msg.role == ROLE_TOOL)
            .filter_map(|msg| msg.tool_call_id.as_deref())
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect()
    }

    /// Calls without a matching tool response, in log order
    pub fn pending_tool_calls(&self) -> Vec<&ToolCall> {
        let mut seen = self.answered_call_ids();
        let mut pending = Vec::new();
        for msg in self.messages().iter().filter(|m| m.role == ROLE_ASSISTANT) {
            for call in &msg.tool_calls {
                if seen.insert(call.id.clone()) {
                    pending.push(call);
                }
            }
        }
        pending
    }

    /// Invoke `handler` once for every pending tool call.
    ///
    /// Calls are collected before the first invocation, so anything the
    /// handler appends is not visited in this pass. A call id is handled at
    /// most once per pass even if it appears in several assistant turns.
    /// The first handler error stops the pass and is returned unchanged.
    pub fn range_pending_tool_calls<E, F>(&mut self, mut handler: F) -> Result<(), E>
    where
        F: FnMut(&mut ToolCallContext<'_>) -> Result<(), E>,
    {
        let pending: Vec<ToolCall> = self.pending_tool_calls().into_iter().cloned().collect();
        if pending.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            conversation_id = %self.id,
            pending = pending.len(),
            "Resolving pending tool calls"
        );

        for call in pending {
            let call_id = call.id.clone();
            let mut ctx = ToolCallContext::new(call, self);
            if let Err(e) = handler(&mut ctx) {
                tracing::warn!(
                    conversation_id = %self.id,
                    tool_call_id = %call_id,
                    "Tool call handler failed, stopping resolution"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}
