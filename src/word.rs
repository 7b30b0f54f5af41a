//! Word pipeline – fills a `.docx` template with text, table rows and images.
//!
//! Stages:
//!
//! 1. **Validate** – template exists with the Word extension, image entries
//!    are well formed
//! 2. **Text** – paragraph tokens, table cell tokens and appended table rows,
//!    edited through [`WordDocument`] and saved to the output path
//! 3. **Images** – the saved file is reopened as a [`WordPackage`]; drawings
//!    whose name matches an image placeholder get their image part replaced
//! 4. **Cleanup** – the request's staging directory is removed
//!
//! The text stage is always saved before the image stage opens the file.
//! Image failures are logged and skipped one placeholder at a time.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tempfile::TempDir;

use crate::config::ForgeConfig;
use crate::docx::{BodyBlock, WordDocument, WordPackage};
use crate::error::{ForgeError, Result};
use crate::images::ImageResolver;
use crate::model::{ContentEntry, DocumentRequest, ImageData, TableData};
use crate::pipeline::remove_partial_output;
use crate::placeholders::{classify, ClassifiedPlaceholders, Delimiter, PlaceholderMap};

/// What a Word render changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WordSummary {
    /// Token occurrences replaced in paragraphs and table cells.
    pub tokens_replaced: usize,
    /// Rows appended across all populated tables.
    pub rows_appended: usize,
    /// Image placeholders whose picture was replaced.
    pub images_replaced: usize,
    /// Image placeholders skipped because their source could not be resolved.
    pub images_skipped: usize,
}

/// Renders Word documents from `.docx` templates.
#[derive(Debug, Clone)]
pub struct WordPipeline {
    config: ForgeConfig,
}

impl WordPipeline {
    pub fn new(config: ForgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Render `request` into a Word document at `output`.
    pub async fn render(&self, request: &DocumentRequest, output: &Path) -> Result<WordSummary> {
        self.validate(request, output).await?;

        let mut saved = false;
        match self.run_stages(request, output, &mut saved).await {
            Ok(summary) => {
                log::info!(
                    "Rendered {} to {} ({} tokens, {} rows, {} images, {} skipped)",
                    request.template.display(),
                    output.display(),
                    summary.tokens_replaced,
                    summary.rows_appended,
                    summary.images_replaced,
                    summary.images_skipped
                );
                Ok(summary)
            }
            Err(e) => {
                if saved {
                    remove_partial_output(output).await;
                }
                Err(e)
            }
        }
    }

    async fn validate(&self, request: &DocumentRequest, output: &Path) -> Result<()> {
        if output.as_os_str().is_empty() {
            return Err(ForgeError::InvalidInput("Output path is required".to_string()));
        }

        let template = &request.template;
        if template.as_os_str().is_empty() || !tokio::fs::try_exists(template).await? {
            return Err(ForgeError::TemplateNotFound(template.clone()));
        }
        let expected = self.config.word_extension.trim_start_matches('.');
        let ok = template
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(expected));
        if !ok {
            return Err(ForgeError::UnexpectedExtension {
                path: template.clone(),
                expected: expected.to_string(),
            });
        }

        for image in &request.images {
            image.validate()?;
        }
        Ok(())
    }

    /// Sets `saved` once the output path has been written to.
    async fn run_stages(
        &self,
        request: &DocumentRequest,
        output: &Path,
        saved: &mut bool,
    ) -> Result<WordSummary> {
        let placeholders = classify(&request.placeholders, Delimiter::Single);
        let mut summary = WordSummary::default();

        // Text
        let mut document = WordDocument::open(&request.template).await?;
        let (tokens, rows) = fill_document(&mut document, &placeholders, &request.tables_data)?;
        summary.tokens_replaced = tokens;
        summary.rows_appended = rows;
        *saved = true;
        document.save(output).await?;
        log::debug!("Saved text stage to {}", output.display());

        // Images
        let sources = image_sources(&request.images, &placeholders.body_image);
        if sources.is_empty() {
            return Ok(summary);
        }

        let staging = self.staging_dir(output).await?;
        let outcome = self.replace_images(&sources, output, staging.path()).await;

        // Cleanup
        let shown = staging.path().display().to_string();
        if let Err(e) = staging.close() {
            log::warn!("Failed to remove staging directory {shown}: {e}");
        }

        let (replaced, skipped) = outcome?;
        summary.images_replaced = replaced;
        summary.images_skipped = skipped;
        Ok(summary)
    }

    async fn staging_dir(&self, output: &Path) -> Result<TempDir> {
        let root = self.config.temp_dir_for(output);
        tokio::fs::create_dir_all(&root).await?;
        Ok(tempfile::Builder::new().prefix("word-").tempdir_in(&root)?)
    }

    /// Returns `(replaced, skipped)` placeholder counts.
    async fn replace_images(
        &self,
        sources: &[ImageData],
        output: &Path,
        staging: &Path,
    ) -> Result<(usize, usize)> {
        let mut package = WordPackage::open(output).await?;
        let drawings = package.drawings()?;
        let resolver = ImageResolver::new(&self.config, staging)?;
        let (mut replaced, mut skipped) = (0, 0);

        for source in sources {
            let name = source.placeholder_name.as_str();
            let mut parts: Vec<String> = Vec::new();
            for drawing in drawings.iter().filter(|d| d.name.as_deref() == Some(name)) {
                for embed in &drawing.embeds {
                    match package.image_part(embed) {
                        Some(part) if !parts.iter().any(|p| p == part) => {
                            parts.push(part.to_string())
                        }
                        Some(_) => {}
                        None => log::debug!("Drawing '{name}' embeds unknown relationship {embed}"),
                    }
                }
            }
            if parts.is_empty() {
                log::debug!("No drawing named '{name}' in the template");
                continue;
            }

            let staged = match resolver.resolve(source).await {
                Ok(staged) => staged,
                Err(e) => {
                    log::warn!("Skipping image '{name}': {e}");
                    skipped += 1;
                    continue;
                }
            };
            let mut swapped = false;
            for part in &parts {
                if package.replace_part(part, staged.bytes().to_vec()) {
                    log::debug!("Replaced {part} for image '{name}'");
                    swapped = true;
                }
            }
            if swapped {
                replaced += 1;
            } else {
                log::warn!("Skipping image '{name}': no image part found in the package");
                skipped += 1;
            }
        }

        if replaced > 0 {
            package.save(output).await?;
        }
        Ok((replaced, skipped))
    }
}

/// Substitute tokens and append table rows. Returns
/// `(tokens replaced, rows appended)`.
fn fill_document(
    document: &mut WordDocument,
    placeholders: &ClassifiedPlaceholders,
    tables_data: &[TableData],
) -> Result<(usize, usize)> {
    let (mut tokens, mut rows) = (0, 0);
    let mut table_pos = 0;

    for block in document.blocks_mut()? {
        match block {
            BodyBlock::Paragraph(mut paragraph) => {
                tokens += paragraph.substitute(&placeholders.body_text);
            }
            BodyBlock::Table(mut table) => {
                table_pos += 1;
                tokens += table.substitute(&placeholders.table_text);
                for data in tables_data.iter().filter(|d| d.table_pos == table_pos) {
                    rows += table.append_rows(&data.data);
                }
            }
        }
    }

    for data in tables_data
        .iter()
        .filter(|d| d.table_pos == 0 || d.table_pos > table_pos)
    {
        log::warn!(
            "Ignoring rows for table {} (template has {table_pos} tables)",
            data.table_pos
        );
    }
    Ok((tokens, rows))
}

/// Explicit image entries first, then body image placeholders not already
/// covered by one. Each placeholder name appears once.
fn image_sources(images: &[ImageData], body_images: &PlaceholderMap) -> Vec<ImageData> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut sources = Vec::new();
    for image in images {
        if seen.insert(image.placeholder_name.as_str()) {
            sources.push(image.clone());
        } else {
            log::debug!("Duplicate image '{}' ignored", image.placeholder_name);
        }
    }
    for (name, location) in body_images.iter() {
        if seen.insert(name) {
            sources.push(ImageData::from_entry(&ContentEntry::image(name, location)));
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageSourceType;
    use crate::templates::{WordTemplateBuilder, PIXEL_PNG_BASE64};

    fn write_template(dir: &Path, builder: WordTemplateBuilder) -> std::path::PathBuf {
        let path = dir.join("template.docx");
        std::fs::write(&path, builder.build().unwrap()).unwrap();
        path
    }

    #[test]
    fn explicit_images_take_precedence() {
        let entries = vec![
            ContentEntry::image("Logo", "https://example.com/logo.png"),
            ContentEntry::image("Stamp", "/srv/stamp.png"),
        ];
        let maps = classify(&entries, Delimiter::Single);
        let images = vec![ImageData::base64("Logo", PIXEL_PNG_BASE64, "png")];

        let sources = image_sources(&images, &maps.body_image);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source_type, ImageSourceType::Base64);
        assert_eq!(sources[1].placeholder_name, "Stamp");
        assert_eq!(sources[1].source_type, ImageSourceType::LocalFile);
    }

    #[tokio::test]
    async fn wrong_extension_is_rejected_before_any_output() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.doc");
        std::fs::write(&template, b"not a package").unwrap();
        let request = DocumentRequest {
            template,
            ..DocumentRequest::default()
        };
        let output = dir.path().join("out.docx");
        let err = WordPipeline::new(ForgeConfig::default())
            .render(&request, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::UnexpectedExtension { .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn corrupt_template_keeps_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.docx");
        std::fs::write(&template, b"not a zip").unwrap();
        let output = dir.path().join("out.docx");
        std::fs::write(&output, b"previous render").unwrap();
        let request = DocumentRequest {
            template,
            ..DocumentRequest::default()
        };
        WordPipeline::new(ForgeConfig::default())
            .render(&request, &output)
            .await
            .unwrap_err();
        assert_eq!(std::fs::read(&output).unwrap(), b"previous render");
    }

    #[tokio::test]
    async fn base64_without_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), WordTemplateBuilder::new().paragraph("x"));
        let mut image = ImageData::base64("Logo", PIXEL_PNG_BASE64, "png");
        image.image_extension = None;
        let request = DocumentRequest {
            template,
            images: vec![image],
            ..DocumentRequest::default()
        };
        let err = WordPipeline::new(ForgeConfig::default())
            .render(&request, &dir.path().join("out.docx"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn body_and_table_tokens_use_their_own_maps() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(
            dir.path(),
            WordTemplateBuilder::new()
                .paragraph("{Total} due")
                .table(&[&["Label", "Amount"], &["Total", "{Total}"]]),
        );
        let request = DocumentRequest {
            template,
            placeholders: vec![
                ContentEntry::text("Total", "body"),
                ContentEntry::table_text("Total", "cell"),
            ],
            ..DocumentRequest::default()
        };
        let output = dir.path().join("out.docx");
        let summary = WordPipeline::new(ForgeConfig::default())
            .render(&request, &output)
            .await
            .unwrap();
        assert_eq!(summary.tokens_replaced, 2);

        let document = WordDocument::open(&output).await.unwrap();
        assert_eq!(document.paragraph_texts().unwrap(), vec!["body due"]);
        assert_eq!(document.table_texts().unwrap()[0][1], vec!["Total", "cell"]);
    }

    #[tokio::test]
    async fn no_image_sources_leaves_no_staging_directory() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), WordTemplateBuilder::new().paragraph("{A}"));
        let request = DocumentRequest {
            template,
            placeholders: vec![ContentEntry::text("A", "1")],
            ..DocumentRequest::default()
        };
        WordPipeline::new(ForgeConfig::default())
            .render(&request, &dir.path().join("out.docx"))
            .await
            .unwrap();
        assert!(!dir.path().join("Temp").exists());
    }

    #[tokio::test]
    async fn drawing_without_image_part_counts_as_skipped() {
        use std::io::{Cursor, Read, Write};

        let bytes = WordTemplateBuilder::new()
            .image("Logo", "png", crate::templates::PIXEL_PNG)
            .build()
            .unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            if file.name().starts_with("word/media/") {
                continue;
            }
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            writer
                .start_file(file.name(), zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(&data).unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.docx");
        std::fs::write(&template, writer.finish().unwrap().into_inner()).unwrap();

        let request = DocumentRequest {
            template,
            images: vec![ImageData::base64("Logo", PIXEL_PNG_BASE64, "png")],
            ..DocumentRequest::default()
        };
        let summary = WordPipeline::new(ForgeConfig::default())
            .render(&request, &dir.path().join("out.docx"))
            .await
            .unwrap();
        assert_eq!(summary.images_replaced, 0);
        assert_eq!(summary.images_skipped, 1);
    }
}
