//! Error types shared by both rendering pipelines.
//!
//! Variants fall into four groups: input validation (raised before any
//! external process is spawned), external tool failures (carry the captured
//! stderr), per-image resource errors (logged and skipped by the Word
//! pipeline) and everything else.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while rendering a document.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Request data failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The template path does not point at an existing file.
    #[error("Template file not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    /// The template has the wrong extension for the selected pipeline.
    #[error("Template '{}' must have a .{expected} extension", .path.display())]
    UnexpectedExtension { path: PathBuf, expected: String },

    /// Template-language data payload is not valid JSON.
    #[error("Invalid JSON data for template: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The external executable could not be started.
    #[error("Failed to launch '{program}': {source}")]
    ToolLaunch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The external executable exited unsuccessfully.
    #[error("{tool} failed with exit code {}: {stderr}", display_code(.code))]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// An image source could not be turned into embeddable bytes.
    #[error("Image '{placeholder}' could not be resolved: {reason}")]
    ImageSource { placeholder: String, reason: String },

    /// The Word package is missing a part it needs.
    #[error("Malformed document package: {0}")]
    Package(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl ForgeError {
    /// `true` for errors caused by the caller's input rather than by the
    /// environment or an external tool.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ForgeError::InvalidInput(_)
                | ForgeError::TemplateNotFound(_)
                | ForgeError::UnexpectedExtension { .. }
                | ForgeError::InvalidJson(_)
        )
    }

    pub(crate) fn image(placeholder: &str, reason: impl Into<String>) -> Self {
        ForgeError::ImageSource {
            placeholder: placeholder.to_string(),
            reason: reason.into(),
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_message_carries_stderr() {
        let err = ForgeError::ToolFailed {
            tool: "wkhtmltopdf".to_string(),
            code: Some(1),
            stderr: "bad font".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("bad font"));
        assert!(!err.is_validation());
    }

    #[test]
    fn validation_errors_are_classified() {
        assert!(ForgeError::InvalidInput("x".into()).is_validation());
        assert!(ForgeError::TemplateNotFound(PathBuf::from("a.html")).is_validation());
        assert!(!ForgeError::image("logo", "missing").is_validation());
    }
}
