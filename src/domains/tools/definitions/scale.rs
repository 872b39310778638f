//! Multi-size image scaling tool.
//!
//! Decodes the input once, forces RGBA so transparency survives, then writes
//! one Lanczos-resampled PNG per requested size next to the input file.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use rmcp::model::JsonObject;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::domains::tools::error::{HandlerError, OperationError, ToolError};
use crate::domains::tools::handlers::{ToolDescriptor, ToolHandler, ToolResult};
use crate::domains::tools::pool::WorkerPool;
use crate::domains::tools::schema::{parse_params, schema_for_params};

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the scaling tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScaleImageParams {
    /// Path to the input image to scale
    pub input_path: String,

    /// List of [width, height] pairs for desired output sizes
    #[serde(default = "default_sizes")]
    pub sizes: Vec<[u32; 2]>,
}

fn default_sizes() -> Vec<[u32; 2]> {
    vec![[32, 32], [128, 128]]
}

/// Largest accepted width or height.
pub const MAX_DIMENSION: u32 = 16_384;

/// Largest accepted output, in pixels (256 MiB of RGBA).
pub const MAX_PIXELS: u64 = 64 * 1024 * 1024;

impl ScaleImageParams {
    /// Every size must be non-empty and within the output limits.
    pub fn validate(&self) -> Result<(), ToolError> {
        check_sizes(&self.sizes).map_err(ToolError::invalid_arguments)
    }
}

/// Reject sizes that are empty or too large to allocate.
fn check_sizes(sizes: &[[u32; 2]]) -> Result<(), String> {
    if sizes.is_empty() {
        return Err("sizes cannot be empty".to_string());
    }
    for &[w, h] in sizes {
        if w == 0 || h == 0 {
            return Err(format!("sizes must be positive, got [{}, {}]", w, h));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION || u64::from(w) * u64::from(h) > MAX_PIXELS {
            return Err(format!(
                "size [{}, {}] exceeds the limit of {} per side and {} pixels",
                w, h, MAX_DIMENSION, MAX_PIXELS
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Scaling tool - writes `<stem>_<w>x<h>.png` per requested size.
pub struct ScaleImageTool {
    descriptor: ToolDescriptor,
    pool: WorkerPool,
}

impl ScaleImageTool {
    /// Tool name as registered in MCP.
    pub const NAME: &'static str = "scale_image";

    /// Tool description shown to clients.
    pub const DESCRIPTION: &'static str =
        "Scale an image to multiple sizes while preserving transparency";

    pub fn new(pool: WorkerPool) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                Self::NAME,
                Self::DESCRIPTION,
                schema_for_params::<ScaleImageParams>(),
            ),
            pool,
        }
    }

    /// Scale on the worker pool and return the written paths.
    #[instrument(skip(self, sizes), fields(sizes = sizes.len()))]
    pub async fn execute(
        &self,
        input_path: &Path,
        sizes: Vec<[u32; 2]>,
    ) -> Result<Vec<PathBuf>, OperationError> {
        check_sizes(&sizes).map_err(OperationError::invalid_input)?;
        if !input_path.exists() {
            return Err(OperationError::InputMissing(input_path.to_path_buf()));
        }

        let input = input_path.to_path_buf();
        self.pool.run(move || scale_to_sizes(&input, &sizes)).await?
    }
}

/// Output path for one size: same directory, `<stem>_<w>x<h>.png`.
pub fn scaled_path(input: &Path, width: u32, height: u32) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let directory = input.parent().unwrap_or_else(|| Path::new(""));
    directory.join(format!("{}_{}x{}.png", stem, width, height))
}

/// Blocking body of the tool. Stops at the first failing size.
fn scale_to_sizes(input: &Path, sizes: &[[u32; 2]]) -> Result<Vec<PathBuf>, OperationError> {
    let decoded = image::open(input).map_err(|source| OperationError::Decode {
        path: input.to_path_buf(),
        source,
    })?;
    let rgba = DynamicImage::ImageRgba8(decoded.to_rgba8());

    let mut written = Vec::with_capacity(sizes.len());
    for &[width, height] in sizes {
        let output = scaled_path(input, width, height);
        let scaled = rgba.resize_exact(width, height, FilterType::Lanczos3);

        if let Err(source) = scaled.save_with_format(&output, ImageFormat::Png) {
            return Err(OperationError::Encode {
                width,
                height,
                path: output,
                written,
                source,
            });
        }
        debug!(path = %output.display(), "Wrote scaled image");
        written.push(output);
    }

    Ok(written)
}

#[async_trait::async_trait]
impl ToolHandler for ScaleImageTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: JsonObject) -> Result<ToolResult, HandlerError> {
        let params: ScaleImageParams = parse_params(arguments)?;
        params.validate()?;

        info!("Scaling image: {}", params.input_path);
        let written = self
            .execute(Path::new(&params.input_path), params.sizes)
            .await?;

        let paths: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
        Ok(ToolResult::text(format!(
            "Successfully created scaled versions: {}",
            paths.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn tool() -> ScaleImageTool {
        ScaleImageTool::new(WorkerPool::new(2))
    }

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn write_rgb_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(64, 48, Rgb([200, 30, 30]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_scaled_path_is_pure() {
        let input = Path::new("/data/icons/logo.jpeg");
        assert_eq!(
            scaled_path(input, 32, 16),
            PathBuf::from("/data/icons/logo_32x16.png")
        );
        assert_eq!(scaled_path(input, 32, 16), scaled_path(input, 32, 16));
        assert_eq!(
            scaled_path(Path::new("logo.png"), 8, 8),
            PathBuf::from("logo_8x8.png")
        );
    }

    #[test]
    fn test_validate_rejects_zero_and_empty_sizes() {
        let mut params = ScaleImageParams {
            input_path: "x.png".to_string(),
            sizes: vec![[32, 0]],
        };
        assert!(params.validate().is_err());

        params.sizes.clear();
        assert!(params.validate().is_err());

        params.sizes = default_sizes();
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_sizes() {
        let mut params = ScaleImageParams {
            input_path: "x.png".to_string(),
            sizes: vec![[200_000, 200_000]],
        };
        assert!(matches!(
            params.validate(),
            Err(ToolError::InvalidArguments(_))
        ));

        // Each side fits, the pixel count does not
        params.sizes = vec![[MAX_DIMENSION, MAX_DIMENSION]];
        assert!(params.validate().is_err());

        params.sizes = vec![[MAX_DIMENSION, 16]];
        assert!(params.validate().is_ok());
    }

    #[tokio::test]
    async fn test_oversized_call_is_rejected_before_decoding() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("tiny.png");
        RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])).save(&input).unwrap();

        let err = tool()
            .call(args(json!({
                "input_path": input.to_string_lossy(),
                "sizes": [[200_000, 200_000]]
            })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandlerError::Rejected(ToolError::InvalidArguments(_))
        ));
        assert!(!dir.path().join("tiny_200000x200000.png").exists());

        let err = tool()
            .execute(&input, vec![[200_000, 200_000]])
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidInput(_)));
    }

    #[test]
    fn test_schema_default_sizes() {
        let tool = tool();
        let descriptor = tool.descriptor();
        let props = &descriptor.input_schema["properties"];
        assert_eq!(props["sizes"]["default"], json!([[32, 32], [128, 128]]));
        assert_eq!(props["sizes"]["type"], "array");
    }

    #[tokio::test]
    async fn test_default_sizes_produce_rgba_pngs() {
        let dir = TempDir::new().unwrap();
        let input = write_rgb_png(dir.path(), "badge.png");

        let result = tool()
            .call(args(json!({ "input_path": input.to_string_lossy() })))
            .await
            .unwrap();

        let small = dir.path().join("badge_32x32.png");
        let large = dir.path().join("badge_128x128.png");
        assert_eq!(
            result,
            ToolResult::text(format!(
                "Successfully created scaled versions: {}, {}",
                small.display(),
                large.display()
            ))
        );

        for (path, size) in [(&small, 32), (&large, 128)] {
            let img = image::open(path).unwrap();
            assert_eq!(img.dimensions(), (size, size));
            assert_eq!(img.color(), ColorType::Rgba8);
        }
    }

    #[tokio::test]
    async fn test_rescaling_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let input = write_rgb_png(dir.path(), "icon.png");
        let tool = tool();

        let first = tool.execute(&input, vec![[20, 10]]).await.unwrap();
        let second = tool.execute(&input, vec![[20, 10]]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(image::open(&second[0]).unwrap().dimensions(), (20, 10));
    }

    #[tokio::test]
    async fn test_transparency_is_preserved() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("half.png");
        let img = RgbaImage::from_fn(64, 64, |x, _| {
            if x < 32 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([10, 200, 10, 255])
            }
        });
        img.save(&input).unwrap();

        let written = tool().execute(&input, vec![[32, 32]]).await.unwrap();
        let scaled = image::open(&written[0]).unwrap().to_rgba8();

        assert_eq!(scaled.get_pixel(0, 16)[3], 0);
        assert!(scaled.get_pixel(31, 16)[3] > 200);
    }

    #[tokio::test]
    async fn test_missing_input_is_reported() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.png");

        let err = tool()
            .call(args(json!({ "input_path": missing.to_string_lossy() })))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Error: Input file {} does not exist", missing.display())
        );
    }

    #[tokio::test]
    async fn test_undecodable_input_is_reported() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("fake.png");
        std::fs::write(&input, b"definitely not a png").unwrap();

        let err = tool().execute(&input, default_sizes()).await.unwrap_err();
        assert!(matches!(err, OperationError::Decode { .. }));
        assert!(err.to_string().starts_with("Error scaling image"));
    }

    #[tokio::test]
    async fn test_failure_lists_sizes_already_written() {
        let dir = TempDir::new().unwrap();
        let input = write_rgb_png(dir.path(), "logo.png");
        // A directory where the second output should go makes its write fail
        std::fs::create_dir(dir.path().join("logo_128x128.png")).unwrap();

        let err = tool().execute(&input, default_sizes()).await.unwrap_err();
        match &err {
            OperationError::Encode {
                width,
                height,
                written,
                ..
            } => {
                assert_eq!((*width, *height), (128, 128));
                assert_eq!(written, &vec![dir.path().join("logo_32x32.png")]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("already written"));
        assert!(dir.path().join("logo_32x32.png").exists());
    }
}
