//! Engine configuration – external tool locations and the names of the
//! working directories created next to each output artifact.
//!
//! A [`ForgeConfig`] is handed to each pipeline when it is constructed; there
//! is no process-wide configuration state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};

/// How tool invocations are turned into an OS process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellMode {
    /// `Cmd` on Windows, `Direct` everywhere else.
    #[default]
    Auto,
    /// Execute the program directly.
    Direct,
    /// Run through `cmd.exe /C`.
    Cmd,
}

impl ShellMode {
    /// Resolve `Auto` for the current platform.
    pub fn resolve(self) -> ShellMode {
        match self {
            ShellMode::Auto if cfg!(windows) => ShellMode::Cmd,
            ShellMode::Auto => ShellMode::Direct,
            other => other,
        }
    }
}

/// An external executable plus arguments placed before the ones a pipeline
/// supplies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Short name used in logs and error messages.
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Configuration shared by the PDF and Word pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// HTML → PDF renderer, invoked as `<program> [args] <html> <pdf>`.
    pub html_to_pdf: ToolCommand,
    /// Template-language compiler, invoked as
    /// `<program> [args] <template> -f <data.json> -o <out.html>`.
    pub template_compiler: ToolCommand,
    /// Extension (without dot) required for template-language sources.
    pub template_extension: String,
    /// Extension (without dot) required for Word templates.
    pub word_extension: String,
    /// Directory, relative to the output's directory, for substituted HTML.
    pub modified_dir: String,
    /// Directory, relative to the output's directory, for compiler inputs and
    /// staged images.
    pub temp_dir: String,
    /// Timeout applied to each remote image fetch.
    pub image_fetch_timeout_secs: u64,
    pub shell: ShellMode,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            html_to_pdf: ToolCommand::new("wkhtmltopdf"),
            template_compiler: ToolCommand::new("ejs"),
            template_extension: "ejs".to_string(),
            word_extension: "docx".to_string(),
            modified_dir: "Modified".to_string(),
            temp_dir: "Temp".to_string(),
            image_fetch_timeout_secs: 30,
            shell: ShellMode::Auto,
        }
    }
}

impl ForgeConfig {
    /// Deserialise from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ForgeError::InvalidInput(format!("Invalid configuration: {e}")))
    }

    /// Read and deserialise a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Working directory for substituted HTML next to `output`.
    pub fn modified_dir_for(&self, output: &Path) -> PathBuf {
        output_parent(output).join(&self.modified_dir)
    }

    /// Working directory for compiler inputs and staged images next to `output`.
    pub fn temp_dir_for(&self, output: &Path) -> PathBuf {
        output_parent(output).join(&self.temp_dir)
    }
}

fn output_parent(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ForgeConfig::from_json(
            r#"{"html_to_pdf": {"program": "/opt/wk/bin/wkhtmltopdf", "args": ["--quiet"]}}"#,
        )
        .unwrap();
        assert_eq!(config.html_to_pdf.program, PathBuf::from("/opt/wk/bin/wkhtmltopdf"));
        assert_eq!(config.html_to_pdf.args, vec!["--quiet"]);
        assert_eq!(config.template_compiler.program, PathBuf::from("ejs"));
        assert_eq!(config.modified_dir, "Modified");
    }

    #[test]
    fn json_roundtrip() {
        let config = ForgeConfig {
            shell: ShellMode::Cmd,
            ..ForgeConfig::default()
        };
        let back = ForgeConfig::from_json(&config.to_json()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn working_dirs_sit_next_to_output() {
        let config = ForgeConfig::default();
        let output = Path::new("/srv/out/report.pdf");
        assert_eq!(config.modified_dir_for(output), PathBuf::from("/srv/out/Modified"));
        assert_eq!(config.temp_dir_for(Path::new("report.pdf")), PathBuf::from("./Temp"));
    }

    #[test]
    fn tool_display_name_is_file_name() {
        let tool = ToolCommand::new("/usr/local/bin/wkhtmltopdf");
        assert_eq!(tool.display_name(), "wkhtmltopdf");
    }
}
