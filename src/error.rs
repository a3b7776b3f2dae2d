//! Central error types for zoomcast.
//!
//! Typed errors for the recording engine and its collaborators. All errors
//! implement `Serialize` so host applications can forward them over IPC.

use serde::Serialize;
use thiserror::Error;

/// Main error type for zoomcast operations.
#[derive(Error, Debug)]
pub enum ZoomcastError {
    /// Screen capture backend failed
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// Filesystem operation failed
    #[error("Storage error: {0}")]
    StorageError(#[from] std::io::Error),

    /// No usable ffmpeg binary
    #[error("FFmpeg not found. Install FFmpeg or let the bundled download run once.")]
    FfmpegNotFound,

    /// Video encoder setup or append failed
    #[error("Encoder error: {0}")]
    EncoderError(String),

    /// Display not found by ID
    #[error("Display not found with ID {id}")]
    DisplayNotFound { id: u32 },

    /// Frame pipeline failed
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A bounded wait elapsed before the operation confirmed
    #[error("Timed out waiting for {context}")]
    Timeout { context: String },

    /// JSON encode/decode failed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Catch-all with a plain message
    #[error("{0}")]
    Other(String),
}

/// Serialize as the display string so hosts can ship errors to a frontend.
impl Serialize for ZoomcastError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<String> for ZoomcastError {
    fn from(msg: String) -> Self {
        ZoomcastError::Other(msg)
    }
}

impl From<&str> for ZoomcastError {
    fn from(msg: &str) -> Self {
        ZoomcastError::Other(msg.to_string())
    }
}

/// Extension trait for adding context to Results.
///
/// Similar to anyhow's `Context` trait, this allows chaining context
/// information onto errors for better debugging.
///
/// # Example
/// ```ignore
/// use crate::error::{ResultExt, ZoomcastResult};
///
/// fn load_settings() -> ZoomcastResult<ZoomSettings> {
///     std::fs::read_to_string("settings.json")
///         .context("failed to read settings file")?;
///     // ...
/// }
/// ```
pub trait ResultExt<T> {
    /// Add context to an error, converting it to ZoomcastError::Other.
    fn context(self, msg: &str) -> ZoomcastResult<T>;

    /// Add context built only on the error path.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> ZoomcastResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn context(self, msg: &str) -> ZoomcastResult<T> {
        self.map_err(|e| ZoomcastError::Other(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> ZoomcastResult<T> {
        self.map_err(|e| ZoomcastError::Other(format!("{}: {}", f(), e)))
    }
}

/// Extension trait for adding context to Option types.
pub trait OptionExt<T> {
    /// Convert None to ZoomcastError::Other with the given message.
    fn context(self, msg: &str) -> ZoomcastResult<T>;

    /// Convert None to ZoomcastError::Other with a lazily evaluated message.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> ZoomcastResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn context(self, msg: &str) -> ZoomcastResult<T> {
        self.ok_or_else(|| ZoomcastError::Other(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> ZoomcastResult<T> {
        self.ok_or_else(|| ZoomcastError::Other(f()))
    }
}

/// Type alias for Results using ZoomcastError.
pub type ZoomcastResult<T> = Result<T, ZoomcastError>;
