//! Tool-specific error types.
//!
//! Two layers:
//! - [`ToolError`] is what the dispatcher reports to the transport (unknown
//!   tool, bad arguments, cancellation). These become protocol-level errors.
//! - [`OperationError`] is what a tool's external operation fails with. The
//!   dispatcher turns it into an error text payload; its `Display` output always
//!   begins with `"Error"`.
//!
//! [`HandlerError`] carries either one out of a handler.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during tool registration or dispatch.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The requested tool was not found.
    #[error("Unknown tool: {0}")]
    NotFound(String),

    /// Invalid arguments were provided to the tool.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// A tool with the same name is already registered.
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// The invocation was cancelled because the server is shutting down.
    #[error("Tool execution cancelled: server is shutting down")]
    Cancelled,

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Create a new "not found" error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a new "invalid arguments" error.
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a new "internal" error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Failures of the external operation behind a tool.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("Error {action}: {source}")]
    Http {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// A download answered with a non-2xx status.
    #[error("Error downloading image: HTTP {status}")]
    Status { status: u16 },

    /// A download answered with something that is not an image.
    #[error("Error: URL does not point to an image (content-type: {content_type})")]
    NotAnImage { content_type: String },

    /// Filesystem failure.
    #[error("Error {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input file of a local operation is absent.
    #[error("Error: Input file {} does not exist", .0.display())]
    InputMissing(PathBuf),

    /// The input could not be decoded as an image.
    #[error("Error scaling image: cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Writing one of the scaled outputs failed.
    #[error(
        "Error scaling image: failed to write {width}x{height} to {}: {source}{}",
        path.display(),
        written_suffix(.written)
    )]
    Encode {
        width: u32,
        height: u32,
        path: PathBuf,
        written: Vec<PathBuf>,
        #[source]
        source: image::ImageError,
    },

    /// The remote API answered with a non-2xx status.
    #[error("Error {action}: API returned HTTP {status}: {body}")]
    Api {
        action: &'static str,
        status: u16,
        body: String,
    },

    /// The remote API finished but its response carries no image URL.
    #[error("Error: {action} completed, but no image URL was returned")]
    MissingImageUrl { action: &'static str },

    /// The remote API answered with a payload of an unknown shape.
    #[error("Error: unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// No API key was configured.
    #[error("Error: no API key configured for the image service")]
    MissingCredential,

    /// The remote request did not complete in time.
    #[error("Error {action}: timed out after {seconds} seconds")]
    Timeout { action: &'static str, seconds: u64 },

    /// A blocking job panicked or was aborted.
    #[error("Error: worker failed: {0}")]
    WorkerPool(String),

    /// The arguments are well-formed but semantically unusable.
    #[error("Error: {0}")]
    InvalidInput(String),
}

/// What a handler call can fail with.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The arguments were rejected before any external work started.
    #[error(transparent)]
    Rejected(#[from] ToolError),

    /// The external operation failed.
    #[error(transparent)]
    Failed(#[from] OperationError),
}

fn written_suffix(written: &[PathBuf]) -> String {
    if written.is_empty() {
        return String::new();
    }
    let paths: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
    format!(" (already written: {})", paths.join(", "))
}

impl OperationError {
    pub fn http(action: &'static str, source: reqwest::Error) -> Self {
        Self::Http { action, source }
    }

    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operation_error_reads_as_error() {
        let errors = vec![
            OperationError::Status { status: 404 },
            OperationError::NotAnImage {
                content_type: "text/html".to_string(),
            },
            OperationError::InputMissing(PathBuf::from("missing.png")),
            OperationError::Api {
                action: "generating image",
                status: 500,
                body: "boom".to_string(),
            },
            OperationError::MissingImageUrl {
                action: "Background removal",
            },
            OperationError::UnexpectedResponse("{}".to_string()),
            OperationError::MissingCredential,
            OperationError::Timeout {
                action: "generating image",
                seconds: 5,
            },
            OperationError::WorkerPool("panicked".to_string()),
            OperationError::invalid_input("bad size"),
            OperationError::io(
                "creating directory",
                "/nope",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ),
        ];

        for err in errors {
            assert!(err.to_string().starts_with("Error"), "{}", err);
        }
    }

    #[test]
    fn test_status_error_carries_code() {
        let msg = OperationError::Status { status: 503 }.to_string();
        assert_eq!(msg, "Error downloading image: HTTP 503");
    }

    #[test]
    fn test_written_suffix_lists_partial_outputs() {
        assert_eq!(written_suffix(&[]), "");
        let suffix = written_suffix(&[PathBuf::from("a_32x32.png")]);
        assert_eq!(suffix, " (already written: a_32x32.png)");
    }

    #[test]
    fn test_tool_error_messages() {
        assert_eq!(
            ToolError::not_found("nope").to_string(),
            "Unknown tool: nope"
        );
        assert!(
            ToolError::invalid_arguments("missing 'prompt'")
                .to_string()
                .contains("prompt")
        );
    }
}
