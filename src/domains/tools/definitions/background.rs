//! Background removal tool.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rmcp::model::JsonObject;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use super::fal::FalClient;
use crate::core::config::Config;
use crate::domains::tools::error::{HandlerError, OperationError, ToolError};
use crate::domains::tools::handlers::{ToolDescriptor, ToolHandler, ToolResult};
use crate::domains::tools::schema::{parse_params, schema_for_params};

const MODEL: &str = "fal-ai/bria/background/remove";

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the background removal tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RemoveBackgroundParams {
    /// Input image url
    pub image_url: String,

    /// If true, wait for the image to be generated and uploaded before returning
    #[serde(default = "default_sync_mode")]
    pub sync_mode: bool,

    /// If true, crop the result to a bounding box around the subject
    #[serde(default)]
    pub crop_to_bbox: bool,
}

fn default_sync_mode() -> bool {
    true
}

impl RemoveBackgroundParams {
    /// Accept http(s) URLs and base64 `data:image` URIs.
    pub fn validate(&self) -> Result<(), ToolError> {
        let input = self.image_url.trim();

        if input.starts_with("data:image") {
            return if is_base64_image(input) {
                Ok(())
            } else {
                Err(ToolError::invalid_arguments(
                    "image_url data URI does not carry valid base64 data",
                ))
            };
        }

        match reqwest::Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(ToolError::invalid_arguments(format!(
                "image_url must be an http(s) URL or a data:image URI, got '{}'",
                self.image_url
            ))),
        }
    }
}

/// Whether `s` is a `data:image/...;base64,<payload>` URI with a decodable payload.
fn is_base64_image(s: &str) -> bool {
    s.split_once(',')
        .map(|(_, payload)| STANDARD.decode(payload.trim()).is_ok())
        .unwrap_or(false)
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Background removal tool - returns the URL of a cut-out copy of the input.
pub struct RemoveBackgroundTool {
    descriptor: ToolDescriptor,
    client: FalClient,
}

impl RemoveBackgroundTool {
    /// Tool name as registered in MCP.
    pub const NAME: &'static str = "remove_background";

    /// Tool description shown to clients.
    pub const DESCRIPTION: &'static str = "Remove background from an image using FAL AI";

    pub fn new(config: Arc<Config>) -> Result<Self, ToolError> {
        Ok(Self {
            descriptor: ToolDescriptor::new(
                Self::NAME,
                Self::DESCRIPTION,
                schema_for_params::<RemoveBackgroundParams>(),
            ),
            client: FalClient::new(&config.fal, &config.credentials)?,
        })
    }

    /// Remove the background and return the result URL.
    #[instrument(skip_all)]
    pub async fn execute(&self, params: &RemoveBackgroundParams) -> Result<String, OperationError> {
        info!("Removing background from image: {}", summarize(&params.image_url));

        let payload = json!({
            "image_url": params.image_url,
            "sync_mode": params.sync_mode,
            "crop_to_bbox": params.crop_to_bbox,
        });
        let result = self
            .client
            .subscribe(MODEL, &payload, "removing background")
            .await?;

        extract_image_url(result)
    }
}

/// `image.url` of the response.
fn extract_image_url(result: Value) -> Result<String, OperationError> {
    let Some(image) = result.get("image").and_then(Value::as_object) else {
        warn!("Unexpected background removal response");
        return Err(OperationError::UnexpectedResponse(result.to_string()));
    };

    image
        .get("url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(OperationError::MissingImageUrl {
            action: "Background removal",
        })
}

/// Keep data URIs out of the logs.
fn summarize(image_url: &str) -> &str {
    if image_url.starts_with("data:") {
        image_url.split_once(',').map_or(image_url, |(head, _)| head)
    } else {
        image_url
    }
}

#[async_trait::async_trait]
impl ToolHandler for RemoveBackgroundTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: JsonObject) -> Result<ToolResult, HandlerError> {
        let params: RemoveBackgroundParams = parse_params(arguments)?;
        params.validate()?;

        let url = self.execute(&params).await?;
        info!("Successfully removed background from image");
        Ok(ToolResult::text(format!(
            "Background removed image URL: {}",
            url
        )))
    }
}
