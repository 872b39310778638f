//! Tool handler contract.
//!
//! Every tool implements [`ToolHandler`]: it exposes a static
//! [`ToolDescriptor`] and performs one call on already validated arguments.
//! Results flow back as [`ToolResult`] and are wrapped by the dispatcher into a
//! [`ToolOutput`], the uniform reply sent to clients.

use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde::Serialize;

use super::error::HandlerError;

/// Static metadata advertised for a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Arc<JsonObject>,
}

impl ToolDescriptor {
    pub fn new(name: &'static str, description: &'static str, input_schema: Arc<JsonObject>) -> Self {
        Self {
            name,
            description,
            input_schema,
        }
    }

    /// Convert into the rmcp tool model.
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.into(),
            description: Some(self.description.into()),
            input_schema: self.input_schema.clone(),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }
}

/// Successful payload produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    Text(String),
    /// Base64 image data. No current tool produces one.
    Image { data: String, mime_type: String },
}

impl ToolResult {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    fn into_content(self) -> Content {
        match self {
            Self::Text(text) => Content::text(text),
            Self::Image { data, mime_type } => Content::image(data, mime_type),
        }
    }
}

/// Uniform reply envelope for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Content items, in order.
    pub content: Vec<ToolResult>,

    /// Whether the underlying operation failed.
    pub is_error: bool,
}

impl ToolOutput {
    /// Create a successful tool output.
    pub fn success(result: ToolResult) -> Self {
        Self {
            content: vec![result],
            is_error: false,
        }
    }

    /// Create a failed tool output carrying a readable message.
    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            content: vec![ToolResult::Text(error.to_string())],
            is_error: true,
        }
    }

    /// First text item, if any.
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|item| match item {
            ToolResult::Text(text) => Some(text.as_str()),
            ToolResult::Image { .. } => None,
        })
    }

    /// Convert into the rmcp result model.
    pub fn into_call_result(self) -> CallToolResult {
        let content: Vec<Content> = self
            .content
            .into_iter()
            .map(ToolResult::into_content)
            .collect();
        if self.is_error {
            CallToolResult::error(content)
        } else {
            CallToolResult::success(content)
        }
    }

    /// JSON shape of a `tools/call` result.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.clone().into_call_result()).unwrap_or_else(|_| {
            serde_json::json!({
                "content": [{ "type": "text", "text": self.text().unwrap_or_default() }],
                "isError": self.is_error,
            })
        })
    }
}

/// Trait implemented by every tool.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name, description and input schema.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Run the tool on arguments already validated against the descriptor's
    /// schema, with defaults filled in.
    async fn call(&self, arguments: JsonObject) -> Result<ToolResult, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_output_json() {
        let output = ToolOutput::success(ToolResult::text("Generated image URL: https://x/y.png"));
        let value = output.to_json();
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][0]["text"], "Generated image URL: https://x/y.png");
        assert_eq!(value["isError"], false);
    }

    #[test]
    fn test_failure_output_is_flagged() {
        let output = ToolOutput::failure("Error downloading image: HTTP 404");
        assert!(output.is_error);
        assert_eq!(output.text(), Some("Error downloading image: HTTP 404"));

        let value = output.to_json();
        assert_eq!(value["isError"], true);
    }

    #[test]
    fn test_image_result_becomes_image_content() {
        let output = ToolOutput::success(ToolResult::Image {
            data: "iVBORw0KGgo=".to_string(),
            mime_type: "image/png".to_string(),
        });
        assert_eq!(output.text(), None);

        let value = output.to_json();
        assert_eq!(value["content"][0]["type"], "image");
        assert_eq!(value["content"][0]["mimeType"], "image/png");
    }

    #[test]
    fn test_descriptor_serializes_with_input_schema() {
        let schema = json!({ "type": "object", "properties": {} })
            .as_object()
            .cloned()
            .unwrap();
        let descriptor = ToolDescriptor::new("noop", "Does nothing", Arc::new(schema));

        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["name"], "noop");
        assert_eq!(value["inputSchema"]["type"], "object");

        let tool = descriptor.to_tool();
        assert_eq!(tool.name, "noop");
    }
}
