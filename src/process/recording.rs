use super::{CommandRunner, Invocation, ProcessResult, strip_ansi};
use crate::error::{AppkgError, Result};
use std::path::PathBuf;
use std::sync::Mutex;

type Responder = Box<dyn Fn(&Invocation) -> (i32, String) + Send + Sync>;

/// A command as seen by [`RecordingRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub elevated: bool,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl RecordedCall {
    /// `program arg1 arg2...`, without any sudo prefix.
    pub fn command_line(&self) -> String {
        command_line(&self.program, &self.args)
    }
}

fn command_line(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Runner that never spawns anything.
///
/// Every invocation is recorded. Replies come from rules keyed by a command-line
/// prefix (the most recently added matching rule wins); unmatched commands
/// succeed with empty output. Pattern tables on the invocation are still
/// applied, so classification behaves as it would against the real tool.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<RecordedCall>>,
    rules: Vec<(String, Responder)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to commands starting with `prefix` with a fixed exit code and output.
    pub fn reply(self, prefix: &str, code: i32, output: &str) -> Self {
        let output = output.to_string();
        self.respond(prefix, move |_| (code, output.clone()))
    }

    /// Reply to commands starting with `prefix` with a computed exit code and output.
    pub fn respond<F>(mut self, prefix: &str, responder: F) -> Self
    where
        F: Fn(&Invocation) -> (i32, String) + Send + Sync + 'static,
    {
        self.rules.push((prefix.to_string(), Box::new(responder)));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.command_line().starts_with(prefix))
            .collect()
    }

    pub fn was_called(&self, prefix: &str) -> bool {
        !self.calls_matching(prefix).is_empty()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessResult> {
        let call = RecordedCall {
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            elevated: invocation.elevated,
            cwd: invocation.cwd.clone(),
            env: invocation.env.clone(),
        };
        let line = call.command_line();
        self.calls
            .lock()
            .map_err(|_| AppkgError::LockError("recorded call log poisoned".to_string()))?
            .push(call);

        let (code, raw) = self
            .rules
            .iter()
            .rev()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, responder)| responder(invocation))
            .unwrap_or((0, String::new()));

        let output = strip_ansi(&raw);
        let error_lines = invocation
            .patterns
            .as_ref()
            .map(|table| table.error_lines(&output))
            .unwrap_or_default();

        Ok(ProcessResult {
            exit_code: Some(code),
            output,
            error_lines,
        })
    }
}
