//! External command execution and output classification.
//!
//! Every package-manager call goes through a [`CommandRunner`]. Backends
//! describe *what* to run with an [`Invocation`]; the runner owns spawning,
//! concurrent stream draining and error-line extraction.

pub mod classify;
mod recording;
mod runner;

pub use classify::{LineMatcher, PatternTable, strip_ansi};
pub use recording::{RecordedCall, RecordingRunner};
pub use runner::SystemRunner;

use crate::error::{AppkgError, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Anything able to execute an [`Invocation`].
pub trait CommandRunner: Send + Sync {
    /// Run to completion. `Err` means the command could not be started at all;
    /// a command that ran and failed is reported through [`ProcessResult`].
    fn run(&self, invocation: &Invocation) -> Result<ProcessResult>;
}

/// How stdio is wired for a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Capture both streams silently.
    Capture,
    /// Capture both streams and mirror non-noise lines to the terminal.
    Mirror,
    /// Inherit the terminal (password prompts). Nothing is captured.
    Interactive,
}

/// A single external command, fully described.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub elevated: bool,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub stdio: StdioMode,
    pub patterns: Option<Arc<PatternTable>>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            elevated: false,
            env: Vec::new(),
            cwd: None,
            stdio: StdioMode::Capture,
            patterns: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run through `sudo -E`.
    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, vars: &[(&str, &str)]) -> Self {
        for (k, v) in vars {
            self.env.push(((*k).to_string(), (*v).to_string()));
        }
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn mirrored(mut self) -> Self {
        self.stdio = StdioMode::Mirror;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.stdio = StdioMode::Interactive;
        self
    }

    /// Classify output with `table`: noise is filtered from mirrored output and
    /// error lines are extracted into [`ProcessResult::error_lines`].
    pub fn classify_with(mut self, table: Arc<PatternTable>) -> Self {
        self.patterns = Some(table);
        self
    }

    /// The argv actually executed, including the sudo prefix.
    pub fn argv(&self) -> (String, Vec<String>) {
        if self.elevated {
            let mut args = vec!["-E".to_string(), self.program.clone()];
            args.extend(self.args.iter().cloned());
            ("sudo".to_string(), args)
        } else {
            (self.program.clone(), self.args.clone())
        }
    }

    /// Human readable command line, used in logs and error messages.
    pub fn display(&self) -> String {
        let (program, args) = self.argv();
        crate::ui::render_command(&program, &args)
    }
}

/// Outcome of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout+stderr in arrival order, ANSI sequences stripped.
    pub output: String,
    /// Lines the pattern table classified as real errors.
    pub error_lines: Vec<String>,
}

impl ProcessResult {
    pub fn exited_ok(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Some tools exit 0 while printing fatal errors, so both signals count.
    pub fn failed(&self) -> bool {
        !self.exited_ok() || !self.error_lines.is_empty()
    }

    /// Convert a failed result into the matching typed error.
    pub fn into_error(self, tool: &str) -> AppkgError {
        if self.error_lines.is_empty() {
            AppkgError::ExitCodeOnly {
                tool: tool.to_string(),
                code: self.exit_code.unwrap_or(-1),
                output: self.output,
            }
        } else {
            AppkgError::BackendReportedError {
                tool: tool.to_string(),
                errors: self.error_lines,
                output: self.output,
            }
        }
    }

    /// `Ok(self)` on success, the typed error otherwise.
    pub fn check(self, tool: &str) -> Result<Self> {
        if self.failed() {
            Err(self.into_error(tool))
        } else {
            Ok(self)
        }
    }

    /// Lines of the combined stdout+stderr buffer.
    pub fn output_lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elevated_argv_prefixes_sudo() {
        let inv = Invocation::new("apk").args(["add", "curl"]).elevated();
        let (program, args) = inv.argv();
        assert_eq!(program, "sudo");
        assert_eq!(args, vec!["-E", "apk", "add", "curl"]);
    }

    #[test]
    fn exit_zero_with_error_line_still_fails() {
        let result = ProcessResult {
            exit_code: Some(0),
            output: "ERROR: unable to select packages".into(),
            error_lines: vec!["ERROR: unable to select packages".into()],
        };
        assert!(result.failed());
        assert!(matches!(
            result.into_error("apk"),
            AppkgError::BackendReportedError { .. }
        ));
    }

    #[test]
    fn nonzero_without_error_lines_is_exit_code_only() {
        let result = ProcessResult {
            exit_code: Some(100),
            output: "something odd".into(),
            error_lines: vec![],
        };
        match result.check("apt-get") {
            Err(AppkgError::ExitCodeOnly { code, .. }) => assert_eq!(code, 100),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn output_lines_include_stderr_text() {
        let result = ProcessResult {
            exit_code: Some(0),
            output: "(1/2) Installing zlib\nWARNING: opening /repo: No such file\n(2/2) Installing curl\n".into(),
            error_lines: vec![],
        };
        let lines: Vec<&str> = result.output_lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "WARNING: opening /repo: No such file");
    }
}
