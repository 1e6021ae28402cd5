use super::{CommandRunner, Invocation, PatternTable, ProcessResult, StdioMode, strip_ansi};
use crate::error::{AppkgError, Result};
use crate::ui;
use crate::utils::platform::build_program_command;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Runs invocations as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessResult> {
        ui::verbose(&format!("$ {}", invocation.display()));
        match invocation.stdio {
            StdioMode::Interactive => run_interactive(invocation),
            StdioMode::Capture | StdioMode::Mirror => run_captured(invocation),
        }
    }
}

#[derive(Clone, Copy)]
enum LiveStream {
    Stdout,
    Stderr,
}

fn spawn_error(invocation: &Invocation, err: std::io::Error) -> AppkgError {
    if err.kind() == std::io::ErrorKind::NotFound {
        let (program, _) = invocation.argv();
        return AppkgError::DependencyMissing(program);
    }
    AppkgError::SystemCommandFailed {
        command: invocation.display(),
        reason: err.to_string(),
    }
}

fn run_captured(invocation: &Invocation) -> Result<ProcessResult> {
    let mut cmd = build_program_command(invocation);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| spawn_error(invocation, e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppkgError::SystemCommandFailed {
            command: invocation.display(),
            reason: "Failed to capture stdout".to_string(),
        })?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppkgError::SystemCommandFailed {
            command: invocation.display(),
            reason: "Failed to capture stderr".to_string(),
        })?;

    let combined = Arc::new(Mutex::new(String::new()));
    let mirror = invocation.stdio == StdioMode::Mirror && !ui::is_quiet();

    let stdout_thread = drain(
        stdout,
        Arc::clone(&combined),
        mirror.then_some(LiveStream::Stdout),
        invocation.patterns.clone(),
    );
    let stderr_thread = drain(
        stderr,
        Arc::clone(&combined),
        mirror.then_some(LiveStream::Stderr),
        invocation.patterns.clone(),
    );

    let status = child.wait().map_err(|e| AppkgError::SystemCommandFailed {
        command: invocation.display(),
        reason: e.to_string(),
    })?;
    let _ = stdout_thread.join();
    let _ = stderr_thread.join();

    let raw = combined
        .lock()
        .map(|buf| buf.clone())
        .map_err(|_| AppkgError::LockError("output buffer poisoned".to_string()))?;
    let output = strip_ansi(&raw);
    let error_lines = invocation
        .patterns
        .as_ref()
        .map(|table| table.error_lines(&output))
        .unwrap_or_default();

    Ok(ProcessResult {
        exit_code: status.code(),
        output,
        error_lines,
    })
}

/// Read `reader` line by line into the shared buffer, mirroring non-noise lines.
fn drain<R: Read + Send + 'static>(
    reader: R,
    sink: Arc<Mutex<String>>,
    live: Option<LiveStream>,
    patterns: Option<Arc<PatternTable>>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let mut line = String::from_utf8_lossy(&buf).into_owned();
            if !line.ends_with('\n') {
                line.push('\n');
            }

            if let Ok(mut combined) = sink.lock() {
                combined.push_str(&line);
            }

            let Some(stream) = live else { continue };
            if patterns.as_ref().is_some_and(|t| t.is_noise(&line)) {
                continue;
            }
            match stream {
                LiveStream::Stdout => {
                    let mut out = std::io::stdout().lock();
                    let _ = out.write_all(line.as_bytes());
                    let _ = out.flush();
                }
                LiveStream::Stderr => {
                    let mut err = std::io::stderr().lock();
                    let _ = err.write_all(line.as_bytes());
                }
            }
        }
    })
}

fn run_interactive(invocation: &Invocation) -> Result<ProcessResult> {
    let mut cmd = build_program_command(invocation);
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let status = cmd
        .status()
        .map_err(|e| spawn_error(invocation, e))?;

    Ok(ProcessResult {
        exit_code: status.code(),
        output: String::new(),
        error_lines: Vec::new(),
    })
}
