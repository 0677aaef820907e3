//! The external media-encoding tool, run as a black box.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a finished tool invocation reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    pub stderr: String,
}

/// Runs the encoding tool with a wall-clock budget.
///
/// Implementations return `Err(ConversionTimeout)` when the budget is exceeded and
/// `Err(ConversionFailed)` when the tool cannot be started at all. A tool that runs and exits
/// non-zero is `Ok` with `success == false`; the caller decides what that means.
pub trait MediaTool: Send + Sync {
    fn run(&self, args: &[String], timeout: Duration) -> Result<ToolOutput>;
}

/// The `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    /// Use `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    /// Use a specific executable (absolute path or a name resolved through `PATH`).
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTool for Ffmpeg {
    fn run(&self, args: &[String], timeout: Duration) -> Result<ToolOutput> {
        tracing::debug!(program = %self.program.display(), ?args, "running encoder");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                Error::ConversionFailed(format!(
                    "failed to start '{}': {err}",
                    self.program.display()
                ))
            })?;

        // Drain stderr on its own thread so a chatty encoder can't fill the pipe and stall.
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let status = wait_with_timeout(&mut child, timeout)?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        Ok(ToolOutput {
            success: status.success(),
            stderr,
        })
    }
}

/// Poll `child` until it exits or `timeout` passes. On timeout the child is killed and reaped.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                tracing::error!(timeout_secs = timeout.as_secs(), "encoder timed out, killing");
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::ConversionTimeout(timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => {
                let _ = child.kill();
                return Err(Error::ConversionFailed(format!(
                    "failed to wait for encoder: {err}"
                )));
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_owned(), script.to_owned()]
    }

    #[test]
    fn zero_exit_is_success() -> anyhow::Result<()> {
        let out = Ffmpeg::with_program("sh").run(&sh("exit 0"), Duration::from_secs(5))?;
        assert!(out.success);
        Ok(())
    }

    #[test]
    fn non_zero_exit_is_reported_with_stderr() -> anyhow::Result<()> {
        let out = Ffmpeg::with_program("sh")
            .run(&sh("echo 'Invalid data found' >&2; exit 1"), Duration::from_secs(5))?;
        assert!(!out.success);
        assert!(out.stderr.contains("Invalid data found"));
        Ok(())
    }

    #[test]
    fn slow_tool_times_out() {
        let started = Instant::now();
        let err = Ffmpeg::with_program("sh")
            .run(&sh("sleep 5"), Duration::from_millis(200))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ConversionTimeout);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_conversion_failure() {
        let err = Ffmpeg::with_program("/definitely/not/ffmpeg")
            .run(&[], Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ConversionFailed);
    }
}
