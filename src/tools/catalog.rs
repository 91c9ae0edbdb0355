//! Tool definition catalog
//!
//! Definitions are grouped by name so callers can offer different tool sets
//! to different conversations. The catalog is an ordinary value built by the
//! caller and handed to whatever assembles provider requests; the
//! conversation itself never consults it.

use crate::error::{ChatError, ChatResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Callable tool, in the OpenAI-compatible `tools` shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(default = "default_tool_type")]
    pub r#type: String,
    pub function: FunctionDefinition,
}

fn default_tool_type() -> String {
    "function".to_string()
}

impl Tool {
    pub fn function(function: FunctionDefinition) -> Self {
        Self {
            r#type: default_tool_type(),
            function,
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub parameters: Parameters,
}

/// JSON-schema subset describing function parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default = "default_parameters_type")]
    pub r#type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    #[serde(default)]
    pub required: Vec<String>,
}

fn default_parameters_type() -> String {
    "object".to_string()
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            r#type: default_parameters_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub r#type: String,
    #[serde(default)]
    pub description: String,
}

/// Named groups of tool definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolCatalog {
    groups: BTreeMap<String, BTreeMap<String, Tool>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `{"<group>": {"<tool>": {<tool definition>}}}`
    pub fn from_json_slice(bytes: &[u8]) -> ChatResult<Self> {
        let catalog: Self = serde_json::from_slice(bytes).map_err(ChatError::Parse)?;
        tracing::debug!(
            groups = catalog.groups.len(),
            tools = catalog.len(),
            "Loaded tool catalog"
        );
        Ok(catalog)
    }

    /// Add a tool to `group`, replacing any tool with the same function name
    pub fn insert(&mut self, group: impl Into<String>, tool: Tool) -> Option<Tool> {
        self.groups
            .entry(group.into())
            .or_default()
            .insert(tool.function.name.clone(), tool)
    }

    /// All tools in a group, ordered by name. Empty for an unknown group.
    pub fn group(&self, group: &str) -> Vec<&Tool> {
        self.groups
            .get(group)
            .map(|tools| tools.values().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, group: &str, name: &str) -> Option<&Tool> {
        self.groups.get(group)?.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
