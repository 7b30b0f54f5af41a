//! PDF pipeline – ties together template validation, optional template
//! language compilation, placeholder substitution and the external HTML → PDF
//! renderer.
//!
//! Stages run in order and stop at the first failure:
//!
//! 1. **Validate** – the template exists and has the right extension
//! 2. **Compile** – template-language sources only ([`compiler`](crate::compiler))
//! 3. **Substitute** – `{{placeholder}}` tokens in the HTML ([`html`](crate::html))
//! 4. **Render** – `<renderer> <html> <pdf>`
//! 5. **Cleanup** – intermediates are removed whatever the outcome
//!
//! Validation failures leave the output path alone. Once the renderer has
//! been started, a failed run never leaves a file at the output path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::compiler::TemplateCompiler;
use crate::config::ForgeConfig;
use crate::error::{ForgeError, Result};
use crate::html;
use crate::model::{PdfRequest, TemplateKind};
use crate::placeholders::{classify, Delimiter};
use crate::process::ProcessRunner;

/// Extensions accepted for plain HTML templates.
const HTML_EXTENSIONS: [&str; 2] = ["html", "htm"];

/// Renders PDF documents from HTML or template-language templates.
#[derive(Debug, Clone)]
pub struct PdfPipeline {
    config: ForgeConfig,
    compiler: TemplateCompiler,
    runner: ProcessRunner,
}

/// Temporary files created during one render.
#[derive(Default)]
struct Intermediates {
    compiled: Option<TempPath>,
    substituted: Option<TempPath>,
    /// The renderer was started on the output path.
    rendering: bool,
}

impl Intermediates {
    /// Remove everything. Failures are logged and never replace the
    /// pipeline's own result.
    fn cleanup(self) {
        for path in [self.substituted, self.compiled].into_iter().flatten() {
            let shown = path.display().to_string();
            if let Err(e) = path.close() {
                log::warn!("Failed to remove intermediate file {shown}: {e}");
            }
        }
    }
}

impl PdfPipeline {
    pub fn new(config: ForgeConfig) -> Self {
        Self {
            compiler: TemplateCompiler::new(&config),
            runner: ProcessRunner::new(config.shell),
            config,
        }
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Render `request` into a PDF at `output`.
    pub async fn render(&self, request: &PdfRequest, output: &Path) -> Result<()> {
        if output.as_os_str().is_empty() {
            return Err(ForgeError::InvalidInput("Output path is required".to_string()));
        }
        // 1. Validate
        self.validate(request).await?;

        let mut intermediates = Intermediates::default();
        let result = self.run_stages(request, output, &mut intermediates).await;
        let rendering = intermediates.rendering;
        intermediates.cleanup();

        match result {
            Ok(()) => {
                log::info!(
                    "Rendered {} to {}",
                    request.template.display(),
                    output.display()
                );
                Ok(())
            }
            Err(e) => {
                if rendering {
                    remove_partial_output(output).await;
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        request: &PdfRequest,
        output: &Path,
        intermediates: &mut Intermediates,
    ) -> Result<()> {
        // 2. Compile (template language only)
        let html_source: PathBuf = match request.template_kind {
            TemplateKind::Html => request.template.clone(),
            TemplateKind::TemplateLanguage => {
                log::debug!("Compiling {}", request.template.display());
                let compiled = self
                    .compiler
                    .compile(
                        &request.template,
                        request.template_data.as_deref(),
                        &self.config.temp_dir_for(output),
                    )
                    .await?;
                let path = compiled.to_path_buf();
                intermediates.compiled = Some(compiled);
                path
            }
        };

        // 3. Substitute
        let template_html = tokio::fs::read_to_string(&html_source).await?;
        let tokens = classify(&request.placeholders, Delimiter::Double).body_text;
        let substituted = html::substitute(&template_html, &tokens);
        let substituted_path =
            html::write_substituted(&self.config.modified_dir_for(output), &substituted).await?;
        let html_path = substituted_path.to_path_buf();
        intermediates.substituted = Some(substituted_path);

        // 4. Render
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tool = &self.config.html_to_pdf;
        let args = [html_path.into_os_string(), OsString::from(output.as_os_str())];
        intermediates.rendering = true;
        let finished = self
            .runner
            .run(tool, &args)
            .await?
            .into_result(&tool.display_name())?;
        if !finished.stdout.trim().is_empty() {
            log::debug!("{}: {}", tool.display_name(), finished.stdout.trim());
        }

        if !tokio::fs::try_exists(output).await? {
            return Err(ForgeError::ToolFailed {
                tool: tool.display_name(),
                code: finished.exit_code,
                stderr: format!("no PDF was written to {}", output.display()),
            });
        }
        Ok(())
    }

    async fn validate(&self, request: &PdfRequest) -> Result<()> {
        let template = &request.template;
        if template.as_os_str().is_empty() || !tokio::fs::try_exists(template).await? {
            return Err(ForgeError::TemplateNotFound(template.clone()));
        }

        match request.template_kind {
            TemplateKind::Html => {
                let ok = template
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| HTML_EXTENSIONS.iter().any(|h| e.eq_ignore_ascii_case(h)));
                if !ok {
                    return Err(ForgeError::UnexpectedExtension {
                        path: template.clone(),
                        expected: HTML_EXTENSIONS[0].to_string(),
                    });
                }
                Ok(())
            }
            TemplateKind::TemplateLanguage => self
                .compiler
                .validate(template, request.template_data.as_deref()),
        }
    }
}

pub(crate) async fn remove_partial_output(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => log::debug!("Removed partial output {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove partial output {}: {e}", output.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentEntry;

    #[tokio::test]
    async fn missing_template_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PdfPipeline::new(ForgeConfig::default());
        let request = PdfRequest {
            template: dir.path().join("missing.html"),
            ..PdfRequest::default()
        };
        let err = pipeline
            .render(&request, &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::TemplateNotFound(_)));
    }

    #[tokio::test]
    async fn failed_validation_keeps_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.pdf");
        std::fs::write(&output, "%PDF previous render").unwrap();
        let request = PdfRequest {
            template: dir.path().join("typo.html"),
            ..PdfRequest::default()
        };
        let err = PdfPipeline::new(ForgeConfig::default())
            .render(&request, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::TemplateNotFound(_)));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "%PDF previous render");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_render_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("page.html");
        std::fs::write(&template, "<p>x</p>").unwrap();
        let output = dir.path().join("report.pdf");
        std::fs::write(&output, "%PDF previous render").unwrap();
        let config = ForgeConfig {
            html_to_pdf: crate::config::ToolCommand::new("sh")
                .with_args(["-c", r#"echo partial > "$2"; exit 1"#, "wkhtmltopdf"]),
            shell: crate::config::ShellMode::Direct,
            ..ForgeConfig::default()
        };
        let request = PdfRequest {
            template,
            ..PdfRequest::default()
        };
        let err = PdfPipeline::new(config)
            .render(&request, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ToolFailed { .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn html_kind_requires_html_extension() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("page.txt");
        std::fs::write(&template, "{{A}}").unwrap();
        let pipeline = PdfPipeline::new(ForgeConfig::default());
        let request = PdfRequest {
            template,
            placeholders: vec![ContentEntry::text("A", "1")],
            ..PdfRequest::default()
        };
        let err = pipeline
            .render(&request, &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::UnexpectedExtension { .. }));
        assert!(!dir.path().join("Modified").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn renderer_receives_substituted_html() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("page.html");
        std::fs::write(&template, "<h1>{{Title}}</h1>").unwrap();
        let config = ForgeConfig {
            html_to_pdf: crate::config::ToolCommand::new("sh")
                .with_args(["-c", r#"cp "$1" "$2""#, "wkhtmltopdf"]),
            shell: crate::config::ShellMode::Direct,
            ..ForgeConfig::default()
        };
        let request = PdfRequest {
            template,
            placeholders: vec![ContentEntry::text("Title", "Report")],
            ..PdfRequest::default()
        };
        let output = dir.path().join("out.pdf");
        PdfPipeline::new(config).render(&request, &output).await.unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "<h1>Report</h1>");
    }
}
