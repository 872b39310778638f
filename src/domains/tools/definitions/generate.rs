//! Text-to-image generation tool.

use std::sync::Arc;

use rmcp::model::JsonObject;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::fal::FalClient;
use crate::core::config::Config;
use crate::domains::tools::error::{HandlerError, OperationError, ToolError};
use crate::domains::tools::handlers::{ToolDescriptor, ToolHandler, ToolResult};
use crate::domains::tools::schema::{parse_params, schema_for_params, with_examples};

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the image generation tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerateImageParams {
    /// Text prompt to generate the image. Recommended format: '[subject], 2D flat design, [optional style details], white background'
    pub prompt: String,

    /// Model to use for generation
    #[serde(default)]
    pub model: ImageModel,

    /// The aspect ratio of the generated image
    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    /// Whether to expand the prompt with MagicPrompt functionality
    #[serde(default = "default_expand_prompt")]
    pub expand_prompt: bool,

    /// The style of the generated image
    #[serde(default)]
    pub style: ImageStyle,

    /// A negative prompt to avoid in the generated image
    #[serde(default)]
    pub negative_prompt: String,
}

fn default_expand_prompt() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ImageModel {
    #[default]
    #[serde(rename = "fal-ai/ideogram/v2")]
    IdeogramV2,
}

impl ImageModel {
    /// Model path on the queue API.
    pub fn id(self) -> &'static str {
        match self {
            Self::IdeogramV2 => "fal-ai/ideogram/v2",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum AspectRatio {
    #[serde(rename = "10:16")]
    Ratio10x16,
    #[serde(rename = "16:10")]
    Ratio16x10,
    #[serde(rename = "9:16")]
    Ratio9x16,
    #[serde(rename = "16:9")]
    Ratio16x9,
    #[serde(rename = "4:3")]
    Ratio4x3,
    #[serde(rename = "3:4")]
    Ratio3x4,
    #[default]
    #[serde(rename = "1:1")]
    Ratio1x1,
    #[serde(rename = "1:3")]
    Ratio1x3,
    #[serde(rename = "3:1")]
    Ratio3x1,
    #[serde(rename = "3:2")]
    Ratio3x2,
    #[serde(rename = "2:3")]
    Ratio2x3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    #[default]
    Auto,
    General,
    Realistic,
    Design,
    #[serde(rename = "render_3D")]
    Render3D,
    Anime,
}

const PROMPT_EXAMPLES: &[&str] = &[
    "mountain peak logo, 2D flat design, minimalist geometric shapes, white background",
    "coffee cup icon, 2D flat design, simple line art style, white background",
    "fox mascot, 2D flat design, modern geometric shapes, white background",
];

// ============================================================================
// Tool Definition
// ============================================================================

/// Image generation tool - turns a text prompt into a hosted image URL.
pub struct GenerateImageTool {
    descriptor: ToolDescriptor,
    client: FalClient,
}

impl GenerateImageTool {
    /// Tool name as registered in MCP.
    pub const NAME: &'static str = "generate_image";

    /// Tool description shown to clients.
    pub const DESCRIPTION: &'static str = "Generate an image from a text prompt using FAL AI. For best results with logos and icons, use the format: '[subject], 2D flat design, [optional style details], white background'. Example: 'pine tree logo, 2D flat design, minimal geometric style, white background'";

    pub fn new(config: Arc<Config>) -> Result<Self, ToolError> {
        Ok(Self {
            descriptor: ToolDescriptor::new(
                Self::NAME,
                Self::DESCRIPTION,
                with_examples(
                    schema_for_params::<GenerateImageParams>(),
                    "prompt",
                    PROMPT_EXAMPLES,
                ),
            ),
            client: FalClient::new(&config.fal, &config.credentials)?,
        })
    }

    /// Request body sent to the model.
    fn payload(params: &GenerateImageParams) -> Value {
        json!({
            "prompt": params.prompt,
            "aspect_ratio": params.aspect_ratio,
            "expand_prompt": params.expand_prompt,
            "style": params.style,
            "negative_prompt": params.negative_prompt,
        })
    }

    /// Generate the image and return its URL.
    #[instrument(skip_all, fields(model = params.model.id()))]
    pub async fn execute(&self, params: &GenerateImageParams) -> Result<String, OperationError> {
        info!("Generating image with prompt: {}", params.prompt);

        let result = self
            .client
            .subscribe(params.model.id(), &Self::payload(params), "generating image")
            .await?;

        first_image_url(&result).ok_or(OperationError::MissingImageUrl {
            action: "Image generation",
        })
    }
}

/// URL of the first entry of `images`.
fn first_image_url(result: &Value) -> Option<String> {
    result
        .get("images")?
        .as_array()?
        .first()?
        .get("url")?
        .as_str()
        .map(str::to_string)
}

#[async_trait::async_trait]
impl ToolHandler for GenerateImageTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: JsonObject) -> Result<ToolResult, HandlerError> {
        let params: GenerateImageParams = parse_params(arguments)?;
        let url = self.execute(&params).await?;
        info!("Image generation result: {}", url);
        Ok(ToolResult::text(format!("Generated image URL: {}", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::definitions::fal::tests::mount_queue;
    use wiremock::MockServer;

    fn tool_for(server: &MockServer) -> GenerateImageTool {
        let mut config = Config::default();
        config.fal.base_url = server.uri();
        config.fal.poll_interval_ms = 5;
        config.credentials.fal_key = Some("test-key".to_string());
        GenerateImageTool::new(Arc::new(config)).unwrap()
    }

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_schema_advertises_defaults_and_enums() {
        let tool = GenerateImageTool::new(Arc::new(Config::default())).unwrap();
        let schema = &tool.descriptor().input_schema;
        let props = &schema["properties"];

        assert_eq!(schema["required"], json!(["prompt"]));
        assert_eq!(props["model"]["default"], "fal-ai/ideogram/v2");
        assert_eq!(props["aspect_ratio"]["default"], "1:1");
        assert_eq!(props["aspect_ratio"]["enum"].as_array().unwrap().len(), 11);
        assert_eq!(props["expand_prompt"]["default"], true);
        assert_eq!(props["style"]["default"], "auto");
        assert!(
            props["style"]["enum"]
                .as_array()
                .unwrap()
                .contains(&json!("render_3D"))
        );
        assert_eq!(props["negative_prompt"]["default"], "");
        assert_eq!(props["prompt"]["examples"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_payload_forwards_every_option() {
        let params: GenerateImageParams = serde_json::from_value(json!({
            "prompt": "fox mascot",
            "aspect_ratio": "16:9",
            "style": "render_3D",
            "expand_prompt": false,
            "negative_prompt": "blurry"
        }))
        .unwrap();

        let payload = GenerateImageTool::payload(&params);
        assert_eq!(
            payload,
            json!({
                "prompt": "fox mascot",
                "aspect_ratio": "16:9",
                "expand_prompt": false,
                "style": "render_3D",
                "negative_prompt": "blurry",
            })
        );
    }

    #[tokio::test]
    async fn test_returns_first_image_url() {
        let server = MockServer::start().await;
        mount_queue(
            &server,
            "fal-ai/ideogram/v2",
            json!({ "images": [{ "url": "https://cdn.example/a.png" }, { "url": "https://cdn.example/b.png" }] }),
        )
        .await;

        let result = tool_for(&server)
            .call(args(json!({ "prompt": "pine tree logo" })))
            .await
            .unwrap();
        assert_eq!(
            result,
            ToolResult::text("Generated image URL: https://cdn.example/a.png")
        );
    }

    #[tokio::test]
    async fn test_empty_image_list_is_missing_url() {
        let server = MockServer::start().await;
        mount_queue(&server, "fal-ai/ideogram/v2", json!({ "images": [] })).await;

        let err = tool_for(&server)
            .call(args(json!({ "prompt": "pine tree logo" })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandlerError::Failed(OperationError::MissingImageUrl { .. })
        ));
    }
}
