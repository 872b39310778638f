//! Tool definitions module.
//!
//! One file per tool, plus the queue client shared by the remote tools.

pub mod background;
pub mod download;
pub mod fal;
pub mod generate;
pub mod scale;

pub use background::{RemoveBackgroundParams, RemoveBackgroundTool};
pub use download::{DownloadImageParams, DownloadImageTool};
pub use fal::FalClient;
pub use generate::{AspectRatio, GenerateImageParams, GenerateImageTool, ImageModel, ImageStyle};
pub use scale::{ScaleImageParams, ScaleImageTool};
