//! Template-language compilation – turns a template-language source plus a
//! JSON data payload into HTML with an external compiler.
//!
//! The compiler is invoked as
//! `<compiler> <template> -f <data.json> -o <output.html>`.

use std::ffi::OsString;
use std::path::Path;

use tempfile::TempPath;

use crate::config::{ForgeConfig, ToolCommand};
use crate::error::{ForgeError, Result};
use crate::process::ProcessRunner;

/// Compiles template-language sources for the PDF pipeline.
#[derive(Debug, Clone)]
pub struct TemplateCompiler {
    tool: ToolCommand,
    extension: String,
    runner: ProcessRunner,
}

impl TemplateCompiler {
    pub fn new(config: &ForgeConfig) -> Self {
        Self {
            tool: config.template_compiler.clone(),
            extension: config.template_extension.clone(),
            runner: ProcessRunner::new(config.shell),
        }
    }

    /// Check the template's extension and the data payload. Nothing is
    /// spawned or written.
    pub fn validate(&self, template: &Path, data: Option<&str>) -> Result<()> {
        if !has_extension(template, &self.extension) {
            return Err(ForgeError::UnexpectedExtension {
                path: template.to_path_buf(),
                expected: self.extension.clone(),
            });
        }
        if let Some(json) = data.filter(|d| !d.trim().is_empty()) {
            serde_json::from_str::<serde_json::Value>(json).map_err(ForgeError::InvalidJson)?;
        }
        Ok(())
    }

    /// Compile `template` into a fresh HTML file inside `work_dir`.
    ///
    /// The JSON data file is always removed before returning. The compiled
    /// HTML is removed when the returned path is dropped or closed.
    pub async fn compile(
        &self,
        template: &Path,
        data: Option<&str>,
        work_dir: &Path,
    ) -> Result<TempPath> {
        self.validate(template, data)?;
        tokio::fs::create_dir_all(work_dir).await?;

        let payload = match data {
            Some(json) if !json.trim().is_empty() => json,
            _ => "{}",
        };
        let data_file = tempfile::Builder::new()
            .prefix("template-data-")
            .suffix(".json")
            .tempfile_in(work_dir)?
            .into_temp_path();
        tokio::fs::write(&data_file, payload).await?;

        let html_file = tempfile::Builder::new()
            .prefix("compiled-")
            .suffix(".html")
            .tempfile_in(work_dir)?
            .into_temp_path();

        let args = [
            template.as_os_str().to_owned(),
            OsString::from("-f"),
            data_file.as_os_str().to_owned(),
            OsString::from("-o"),
            html_file.as_os_str().to_owned(),
        ];
        let outcome = self.runner.run(&self.tool, &args).await;

        if let Err(e) = data_file.close() {
            log::warn!("Failed to remove template data file: {e}");
        }

        outcome?.into_result(&self.tool.display_name())?;
        log::debug!(
            "Compiled {} to {}",
            template.display(),
            html_file.display()
        );
        Ok(html_file)
    }
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(expected.trim_start_matches('.')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler_with(tool: ToolCommand) -> TemplateCompiler {
        let config = ForgeConfig {
            template_compiler: tool,
            shell: crate::config::ShellMode::Direct,
            ..ForgeConfig::default()
        };
        TemplateCompiler::new(&config)
    }

    #[test]
    fn wrong_extension_is_rejected() {
        let compiler = compiler_with(ToolCommand::new("ejs"));
        let err = compiler.validate(Path::new("page.html"), None).unwrap_err();
        assert!(matches!(err, ForgeError::UnexpectedExtension { .. }));
        assert!(compiler.validate(Path::new("page.EJS"), None).is_ok());
    }

    #[test]
    fn malformed_json_is_rejected() {
        let compiler = compiler_with(ToolCommand::new("ejs"));
        let err = compiler
            .validate(Path::new("page.ejs"), Some("{not json"))
            .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidJson(_)));
        assert!(compiler.validate(Path::new("page.ejs"), Some("  ")).is_ok());
    }

    #[tokio::test]
    async fn validation_happens_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        // A tool that cannot be launched proves nothing was spawned.
        let compiler = compiler_with(ToolCommand::new("/nonexistent/compiler"));
        let err = compiler
            .compile(&dir.path().join("a.ejs"), Some("[1,"), dir.path())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn compiles_and_removes_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("page.ejs");
        std::fs::write(&template, "<p>hello</p>").unwrap();
        let work = dir.path().join("Temp");

        // $1 template, $3 data file, $5 output html
        let tool = ToolCommand::new("sh").with_args(["-c", r#"{ cat "$1"; cat "$3"; } > "$5""#, "ejs"]);
        let compiler = compiler_with(tool);

        let html = compiler
            .compile(&template, Some(r#"{"name":"Ada"}"#), &work)
            .await
            .unwrap();
        let content = std::fs::read_to_string(&html).unwrap();
        assert_eq!(content, r#"<p>hello</p>{"name":"Ada"}"#);

        let leftovers: Vec<_> = std::fs::read_dir(&work)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn compiler_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("page.ejs");
        std::fs::write(&template, "<%= oops").unwrap();

        let tool = ToolCommand::new("sh").with_args(["-c", "echo 'Could not find matching close tag' >&2; exit 1", "ejs"]);
        let err = compiler_with(tool)
            .compile(&template, None, dir.path())
            .await
            .unwrap_err();
        match err {
            ForgeError::ToolFailed { stderr, .. } => {
                assert!(stderr.contains("Could not find matching close tag"))
            }
            other => panic!("expected ToolFailed, got {other:?}"),
        }
    }
}
