//! Subprocess runner used for the BlueZ command-line tools.

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::trace;

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs an external tool with a hard timeout.
///
/// A missing binary maps to [`ScanError::ToolUnavailable`] and an expired
/// timeout to [`ScanError::Timeout`]. Dropping the returned future must
/// terminate the child.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ProcessOutput>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ProcessOutput> {
        trace!("Running {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ScanError::ToolUnavailable(program.to_string()),
                _ => ScanError::Io(e),
            })?;

        // On timeout the child is dropped with the future and killed.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ScanError::Timeout(timeout))??;

        Ok(ProcessOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_tool_unavailable() {
        let err = TokioProcessRunner
            .run("definitely-not-a-real-tool-btscan", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::ToolUnavailable(_)));
    }

    #[tokio::test]
    async fn test_captures_stdout_and_status() {
        let out = TokioProcessRunner
            .run("sh", &["-c".into(), "echo hello; exit 3".into()], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = TokioProcessRunner
            .run("sleep", &["5".into()], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Timeout(_)));
    }
}
