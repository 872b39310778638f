//! Image download tool.
//!
//! Fetches a URL and streams the body to disk. The response must be 2xx and
//! declare an `image/*` content type before any file is created.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::{Client, Url, header};
use rmcp::model::JsonObject;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use crate::core::config::Config;
use crate::domains::tools::error::{HandlerError, OperationError, ToolError};
use crate::domains::tools::handlers::{ToolDescriptor, ToolHandler, ToolResult};
use crate::domains::tools::schema::{parse_params, schema_for_params};

const ACTION: &str = "downloading image";

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the download tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DownloadImageParams {
    /// URL of the image to download
    pub image_url: String,

    /// Directory to save the downloaded image
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_output_dir() -> String {
    "downloads".to_string()
}

impl DownloadImageParams {
    /// Parse the URL, accepting only http and https.
    pub fn validate(&self) -> Result<Url, ToolError> {
        let url = Url::parse(self.image_url.trim()).map_err(|e| {
            ToolError::invalid_arguments(format!("invalid image_url '{}': {}", self.image_url, e))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ToolError::invalid_arguments(format!(
                "unsupported URL scheme '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Download tool - saves a remote image under a local directory.
pub struct DownloadImageTool {
    descriptor: ToolDescriptor,
    client: Client,
    buffer_size: usize,
}

impl DownloadImageTool {
    /// Tool name as registered in MCP.
    pub const NAME: &'static str = "download_image";

    /// Tool description shown to clients.
    pub const DESCRIPTION: &'static str = "Download an image from a URL and save it locally";

    pub fn new(config: Arc<Config>) -> Result<Self, ToolError> {
        let client = Client::builder()
            .user_agent(concat!("image-mcp-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            descriptor: ToolDescriptor::new(
                Self::NAME,
                Self::DESCRIPTION,
                schema_for_params::<DownloadImageParams>(),
            ),
            client,
            buffer_size: config.tools.download_buffer_size.max(1),
        })
    }

    /// Download `url` into `output_dir` and return the absolute file path.
    #[instrument(skip(self, url), fields(url = %url))]
    pub async fn execute(&self, url: Url, output_dir: &Path) -> Result<PathBuf, OperationError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| OperationError::io("creating directory", output_dir, e))?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| OperationError::http(ACTION, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Download failed with HTTP {}", status.as_u16());
            return Err(OperationError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            warn!("Refusing non-image content-type: {}", content_type);
            return Err(OperationError::NotAnImage { content_type });
        }

        let filename = filename_from_url(&url)
            .unwrap_or_else(|| fallback_filename(&content_type, chrono::Utc::now().timestamp_millis()));
        let output_path = output_dir.join(&filename);
        debug!(path = %output_path.display(), "Writing image");

        let file = tokio::fs::File::create(&output_path)
            .await
            .map_err(|e| OperationError::io("creating file", &output_path, e))?;
        let mut writer = BufWriter::with_capacity(self.buffer_size, file);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| OperationError::http(ACTION, e))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| OperationError::io("writing", &output_path, e))?;
        }
        writer
            .flush()
            .await
            .map_err(|e| OperationError::io("writing", &output_path, e))?;

        tokio::fs::canonicalize(&output_path)
            .await
            .map_err(|e| OperationError::io("resolving", &output_path, e))
    }
}

/// Last non-empty path segment of `url`.
fn filename_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(str::to_string)
}

/// `image_<millis>.<ext>`, with the extension taken from the content type.
fn fallback_filename(content_type: &str, millis: i64) -> String {
    format!("image_{}.{}", millis, extension_for(content_type))
}

fn extension_for(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "image/tiff" => "tiff",
        "image/avif" => "avif",
        _ => "jpg",
    }
}

#[async_trait::async_trait]
impl ToolHandler for DownloadImageTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: JsonObject) -> Result<ToolResult, HandlerError> {
        let params: DownloadImageParams = parse_params(arguments)?;
        let url = params.validate()?;

        info!("Downloading image from: {}", url);
        let path = self.execute(url, Path::new(&params.output_dir)).await?;

        Ok(ToolResult::text(format!(
            "Image successfully downloaded to: {}",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3, 4];

    fn tool() -> DownloadImageTool {
        DownloadImageTool::new(Arc::new(Config::default())).unwrap()
    }

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_filename_from_url() {
        let url = Url::parse("https://cdn.example/images/cat.png?size=large").unwrap();
        assert_eq!(filename_from_url(&url).as_deref(), Some("cat.png"));

        let root = Url::parse("https://cdn.example/").unwrap();
        assert_eq!(filename_from_url(&root), None);

        let trailing = Url::parse("https://cdn.example/images/").unwrap();
        assert_eq!(filename_from_url(&trailing), None);
    }

    #[test]
    fn test_fallback_filename_uses_content_type() {
        assert_eq!(fallback_filename("image/png", 1700), "image_1700.png");
        assert_eq!(fallback_filename("image/webp; q=1", 5), "image_5.webp");
        assert_eq!(fallback_filename("image/x-unknown", 5), "image_5.jpg");
    }

    #[test]
    fn test_validate_rejects_non_http_urls() {
        let params = DownloadImageParams {
            image_url: "file:///etc/hosts".to_string(),
            output_dir: default_output_dir(),
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_schema_default_output_dir() {
        let tool = tool();
        let descriptor = tool.descriptor();
        let props = &descriptor.input_schema["properties"];
        assert_eq!(props["output_dir"]["default"], "downloads");
    }

    #[tokio::test]
    async fn test_downloads_image_into_output_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pics/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(PNG_BYTES),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let output_dir = dir.path().join("nested").join("out");

        let result = tool()
            .call(args(json!({
                "image_url": format!("{}/pics/cat.png", server.uri()),
                "output_dir": output_dir.to_string_lossy(),
            })))
            .await
            .unwrap();

        let expected = output_dir.canonicalize().unwrap().join("cat.png");
        assert_eq!(
            result,
            ToolResult::text(format!(
                "Image successfully downloaded to: {}",
                expected.display()
            ))
        );
        assert_eq!(std::fs::read(&expected).unwrap(), PNG_BYTES);
        assert_eq!(files_in(&output_dir).len(), 1);
    }

    #[tokio::test]
    async fn test_html_response_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html></html>"),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = tool()
            .call(args(json!({
                "image_url": format!("{}/page.html", server.uri()),
                "output_dir": dir.path().to_string_lossy(),
            })))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HandlerError::Failed(OperationError::NotAnImage { .. })
        ));
        assert!(err.to_string().contains("text/html"));
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = tool()
            .call(args(json!({
                "image_url": format!("{}/missing.png", server.uri()),
                "output_dir": dir.path().to_string_lossy(),
            })))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Error downloading image: HTTP 404");
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_root_url_gets_generated_filename() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/gif")
                    .set_body_bytes(b"GIF89a".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let url = Url::parse(&format!("{}/", server.uri())).unwrap();
        let path = tool().execute(url, dir.path()).await.unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("image_"), "{}", name);
        assert!(name.ends_with(".gif"), "{}", name);
    }
}
