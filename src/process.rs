//! External process runner – starts a tool, captures its output and waits
//! for it to exit without blocking a worker thread.
//!
//! The runner reports exit codes but does not judge them; callers decide what
//! counts as failure via [`ProcessOutput::into_result`].

use std::ffi::OsString;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::{ShellMode, ToolCommand};
use crate::error::{ForgeError, Result};

/// Windows `CREATE_NO_WINDOW` process creation flag.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn a non-zero exit into [`ForgeError::ToolFailed`] carrying stderr.
    pub fn into_result(self, tool: &str) -> Result<ProcessOutput> {
        if self.success() {
            return Ok(self);
        }
        let stderr = match self.stderr.trim() {
            "" => self.stdout.trim().to_string(),
            s => s.to_string(),
        };
        Err(ForgeError::ToolFailed {
            tool: tool.to_string(),
            code: self.exit_code,
            stderr,
        })
    }
}

/// Program and argument list after platform resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

/// Apply the shell wrapping for `mode` to `tool` followed by `args`.
///
/// The logical argument list is identical in both modes; `Cmd` only places
/// `cmd.exe /C <program>` in front of it.
pub fn resolve_command(tool: &ToolCommand, args: &[OsString], mode: ShellMode) -> ResolvedCommand {
    let logical: Vec<OsString> = tool
        .args
        .iter()
        .map(OsString::from)
        .chain(args.iter().cloned())
        .collect();

    match mode.resolve() {
        ShellMode::Cmd => {
            let mut wrapped = vec![OsString::from("/C"), tool.program.clone().into_os_string()];
            wrapped.extend(logical);
            ResolvedCommand {
                program: OsString::from("cmd.exe"),
                args: wrapped,
            }
        }
        _ => ResolvedCommand {
            program: tool.program.clone().into_os_string(),
            args: logical,
        },
    }
}

/// Runs external tools for the pipelines.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    shell: ShellMode,
}

impl ProcessRunner {
    pub fn new(shell: ShellMode) -> Self {
        Self { shell }
    }

    /// Start `tool` with `args`, wait for it to exit and capture its output.
    ///
    /// Only a failure to start the process is an error here; the exit code is
    /// returned as-is.
    pub async fn run(&self, tool: &ToolCommand, args: &[OsString]) -> Result<ProcessOutput> {
        let resolved = resolve_command(tool, args, self.shell);
        log::debug!(
            "Running {:?} {:?}",
            resolved.program,
            resolved.args
        );

        let mut command = Command::new(&resolved.program);
        command
            .args(&resolved.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let output = command.output().await.map_err(|source| ForgeError::ToolLaunch {
            program: tool.program.display().to_string(),
            source,
        })?;

        let result = ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        log::debug!(
            "{} exited with {:?} ({} bytes stdout, {} bytes stderr)",
            tool.display_name(),
            result.exit_code,
            result.stdout.len(),
            result.stderr.len()
        );
        Ok(result)
    }
}
