//! # doc-forge – template substitution for PDF and Word documents
//!
//! Two pipelines share one request model:
//!
//! - **PDF** ([`pipeline`]) – optional template-language compilation
//!   ([`compiler`]), `{{placeholder}}` substitution in HTML ([`html`]) and an
//!   external HTML → PDF renderer ([`process`]).
//! - **Word** ([`word`]) – `{placeholder}` substitution in paragraphs and
//!   table cells, table row population by column header, and replacement of
//!   named pictures ([`docx`], [`images`]).
//!
//! Requests are described in [`model`], tool locations and working
//! directories in [`config`]. A C-compatible FFI surface is exposed via the
//! [`ffi`] module.

pub mod compiler;
pub mod config;
pub mod docx;
pub mod error;
pub mod ffi;
pub mod html;
pub mod images;
pub mod model;
pub mod pipeline;
pub mod placeholders;
pub mod process;
pub mod templates;
pub mod word;
pub mod xml;

// Re-exports for convenience
pub use config::{ForgeConfig, ShellMode, ToolCommand};
pub use error::{ForgeError, Result};
pub use model::{
    ContentEntry, ContentType, DocumentRequest, ImageData, ImageSourceType, ParentBody,
    PdfRequest, TableData, TemplateKind,
};
pub use pipeline::PdfPipeline;
pub use word::{WordPipeline, WordSummary};
