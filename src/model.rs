//! Request model – the caller-supplied content that gets substituted into a
//! template.
//!
//! All types are plain request-scoped values. JSON field names follow the
//! camelCase spelling of the public document API (`contentType`, `tablePos`,
//! `placeholderName`, ...), and enum values accept both `text` and `Text`.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};

// ---------------------------------------------------------------------------
// Placeholder entries
// ---------------------------------------------------------------------------

/// What kind of value a placeholder receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    #[default]
    #[serde(alias = "Text")]
    Text,
    #[serde(alias = "Image")]
    Image,
}

/// Where in the document a placeholder lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParentBody {
    /// Free-standing body text.
    #[default]
    #[serde(alias = "None")]
    None,
    /// Inside a table cell.
    #[serde(alias = "Table")]
    Table,
}

/// One placeholder and the content that replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry {
    /// Bare placeholder name, without delimiters.
    pub placeholder: String,
    /// Replacement text; for image entries, a URL or local path.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub parent_body: ParentBody,
}

impl ContentEntry {
    /// Body text entry.
    pub fn text(placeholder: &str, content: &str) -> Self {
        Self {
            placeholder: placeholder.to_string(),
            content: content.to_string(),
            content_type: ContentType::Text,
            parent_body: ParentBody::None,
        }
    }

    /// Text entry located inside a table.
    pub fn table_text(placeholder: &str, content: &str) -> Self {
        Self {
            parent_body: ParentBody::Table,
            ..Self::text(placeholder, content)
        }
    }

    /// Body image entry whose content is a URL or local path.
    pub fn image(placeholder: &str, location: &str) -> Self {
        Self {
            content_type: ContentType::Image,
            ..Self::text(placeholder, location)
        }
    }
}

// ---------------------------------------------------------------------------
// Table rows
// ---------------------------------------------------------------------------

/// Rows to append to one table of a Word template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableData {
    /// 1-based position of the table among the body's tables. Values that do
    /// not name an existing table are ignored.
    pub table_pos: usize,
    /// One mapping per new row, keyed by column header text.
    #[serde(default, alias = "rows")]
    pub data: Vec<HashMap<String, String>>,
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// How [`ImageData::data`] is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageSourceType {
    #[serde(alias = "Base64")]
    Base64,
    #[serde(alias = "LocalFile")]
    LocalFile,
    #[serde(alias = "Url")]
    Url,
}

/// Replacement for an image drawing, matched by the drawing's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    pub placeholder_name: String,
    pub source_type: ImageSourceType,
    /// Base64 payload, file path or URL depending on `source_type`.
    pub data: String,
    /// File extension of the image; required for base64 payloads.
    #[serde(default)]
    pub image_extension: Option<String>,
}

impl ImageData {
    pub fn base64(placeholder: &str, payload: &str, extension: &str) -> Self {
        Self {
            placeholder_name: placeholder.to_string(),
            source_type: ImageSourceType::Base64,
            data: payload.to_string(),
            image_extension: Some(extension.to_string()),
        }
    }

    pub fn local_file(placeholder: &str, path: &str) -> Self {
        Self {
            placeholder_name: placeholder.to_string(),
            source_type: ImageSourceType::LocalFile,
            data: path.to_string(),
            image_extension: None,
        }
    }

    pub fn url(placeholder: &str, url: &str) -> Self {
        Self {
            placeholder_name: placeholder.to_string(),
            source_type: ImageSourceType::Url,
            data: url.to_string(),
            image_extension: None,
        }
    }

    /// Image source for a body image [`ContentEntry`]: URLs are fetched,
    /// anything else is read from disk.
    pub fn from_entry(entry: &ContentEntry) -> Self {
        let location = entry.content.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::url(&entry.placeholder, location)
        } else {
            Self::local_file(&entry.placeholder, location)
        }
    }

    /// Extension without a leading dot, if one was supplied.
    pub fn normalized_extension(&self) -> Option<&str> {
        self.image_extension
            .as_deref()
            .map(|ext| ext.trim().trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
    }

    /// Reject entries that can never be resolved.
    pub fn validate(&self) -> Result<()> {
        if self.placeholder_name.trim().is_empty() {
            return Err(ForgeError::InvalidInput(
                "Image placeholder name is required".to_string(),
            ));
        }
        if self.source_type == ImageSourceType::Base64 && self.normalized_extension().is_none() {
            return Err(ForgeError::InvalidInput(format!(
                "Image extension is required for base64 image '{}'",
                self.placeholder_name
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Which kind of source the PDF pipeline starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateKind {
    /// Plain HTML with `{{placeholder}}` tokens.
    #[default]
    #[serde(alias = "Html")]
    Html,
    /// Template-language source compiled to HTML by an external tool first.
    #[serde(alias = "TemplateLanguage", alias = "ejs")]
    TemplateLanguage,
}

/// Input to the PDF pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfRequest {
    /// Template already materialised on disk.
    pub template: PathBuf,
    #[serde(default)]
    pub template_kind: TemplateKind,
    /// Serialised JSON handed to the template-language compiler.
    #[serde(default, alias = "serializedEjsDataJson")]
    pub template_data: Option<String>,
    #[serde(default)]
    pub placeholders: Vec<ContentEntry>,
}

/// Input to the Word pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
    /// Word package template already materialised on disk.
    pub template: PathBuf,
    #[serde(default)]
    pub placeholders: Vec<ContentEntry>,
    #[serde(default, alias = "tables")]
    pub tables_data: Vec<TableData>,
    #[serde(default, alias = "imagesData")]
    pub images: Vec<ImageData>,
}

impl PdfRequest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ForgeError::InvalidInput(format!("Malformed PDF request: {e}")))
    }
}

impl DocumentRequest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ForgeError::InvalidInput(format!("Malformed document request: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_entry_defaults_to_body_text() {
        let entry: ContentEntry =
            serde_json::from_str(r#"{"placeholder":"Name","content":"Ada"}"#).unwrap();
        assert_eq!(entry, ContentEntry::text("Name", "Ada"));
    }

    #[test]
    fn enums_accept_pascal_case() {
        let entry: ContentEntry = serde_json::from_str(
            r#"{"placeholder":"Qty","content":"5","contentType":"Text","parentBody":"Table"}"#,
        )
        .unwrap();
        assert_eq!(entry.parent_body, ParentBody::Table);
    }

    #[test]
    fn document_request_reads_api_field_names() {
        let json = r#"{
            "template": "in.docx",
            "placeholders": [{"placeholder":"Logo","content":"https://x/logo.png","contentType":"image"}],
            "tablesData": [{"tablePos": 1, "data": [{"Name": "A"}]}],
            "imagesData": [{"placeholderName":"Sig","sourceType":"base64","data":"AAAA","imageExtension":".png"}]
        }"#;
        let req = DocumentRequest::from_json(json).unwrap();
        assert_eq!(req.tables_data[0].table_pos, 1);
        assert_eq!(req.tables_data[0].data[0]["Name"], "A");
        assert_eq!(req.images[0].normalized_extension(), Some("png"));
        assert_eq!(req.placeholders[0].content_type, ContentType::Image);
    }

    #[test]
    fn base64_image_requires_extension() {
        let mut image = ImageData::base64("Sig", "AAAA", "png");
        assert!(image.validate().is_ok());
        image.image_extension = Some(".".to_string());
        assert!(image.validate().unwrap_err().is_validation());
        assert!(ImageData::url("Sig", "http://x").validate().is_ok());
    }

    #[test]
    fn image_entry_source_is_inferred_from_location() {
        let url = ImageData::from_entry(&ContentEntry::image("Logo", "https://example.com/a.png"));
        assert_eq!(url.source_type, ImageSourceType::Url);
        let file = ImageData::from_entry(&ContentEntry::image("Logo", "/tmp/a.png"));
        assert_eq!(file.source_type, ImageSourceType::LocalFile);
    }

    #[test]
    fn pdf_request_accepts_legacy_data_field() {
        let req = PdfRequest::from_json(
            r#"{"template":"t.ejs","templateKind":"ejs","serializedEjsDataJson":"{\"a\":1}"}"#,
        )
        .unwrap();
        assert_eq!(req.template_kind, TemplateKind::TemplateLanguage);
        assert_eq!(req.template_data.as_deref(), Some(r#"{"a":1}"#));
    }
}
