//! Sandbox contract: path validation and command execution.
//!
//! The sandbox owns two concerns only: keeping paths inside its root and
//! running commands. File I/O is done by tool handlers against validated
//! paths; sensitive-file filtering and dangerous-command policy live in
//! the handler layer.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::warn;

/// Command execution outcome.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("path escapes the sandbox: {0}")]
    PathEscapes(String),

    #[error("working directory not found: {0}")]
    MissingWorkingDir(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("exec failed: {0}")]
    Exec(String),
}

/// Isolated environment shared by an agent and its subagents.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Resolve `path` relative to the sandbox root, rejecting anything
    /// that escapes it.
    fn validate_path(&self, path: &str) -> Result<PathBuf, SandboxError>;

    /// Run a shell command inside the sandbox.
    async fn exec(
        &self,
        command: &str,
        timeout: Duration,
        working_dir: Option<&str>,
    ) -> Result<ExecResult, SandboxError>;
}

/// Sandbox rooted at a local directory; commands run via the system
/// shell with `kill_on_drop` so cancellation reaches the subprocess.
pub struct LocalSandbox {
    root: PathBuf,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lexically normalise `path` against the root. `..` components are
    /// resolved; any that would climb above the root are a violation.
    fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let joined = self.root.join(path);
        let mut resolved = PathBuf::new();

        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    if !resolved.pop() || !resolved.starts_with(&self.root) {
                        warn!(path, "path traversal attempt");
                        return Err(SandboxError::PathEscapes(path.to_string()));
                    }
                }
                Component::CurDir => {}
                other => resolved.push(other),
            }
        }

        if !resolved.starts_with(&self.root) {
            warn!(path, "path traversal attempt");
            return Err(SandboxError::PathEscapes(path.to_string()));
        }
        Ok(resolved)
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn validate_path(&self, path: &str) -> Result<PathBuf, SandboxError> {
        self.resolve(path)
    }

    async fn exec(
        &self,
        command: &str,
        timeout: Duration,
        working_dir: Option<&str>,
    ) -> Result<ExecResult, SandboxError> {
        let cwd = match working_dir {
            Some(dir) => {
                let resolved = self.resolve(dir)?;
                if !resolved.is_dir() {
                    return Err(SandboxError::MissingWorkingDir(dir.to_string()));
                }
                resolved
            }
            None => self.root.clone(),
        };

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::Exec(e.to_string()))?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let run = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            if let Some(pipe) = &mut stdout_pipe {
                let _ = pipe.read_to_end(&mut stdout).await;
            }
            if let Some(pipe) = &mut stderr_pipe {
                let _ = pipe.read_to_end(&mut stderr).await;
            }
            let status = child
                .wait()
                .await
                .map_err(|e| SandboxError::Exec(e.to_string()))?;
            Ok::<_, SandboxError>(ExecResult {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                exit_code: status.code().unwrap_or(-1),
            })
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(SandboxError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn validate_path_allows_inside_and_rejects_escape() {
        let dir = tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());

        let inside = sandbox.validate_path("src/main.rs").unwrap();
        assert!(inside.starts_with(dir.path()));

        assert!(sandbox.validate_path("../outside").is_err());
        assert!(sandbox.validate_path("a/../../outside").is_err());
        assert!(sandbox.validate_path("a/./b/../c").is_ok());
    }

    #[tokio::test]
    async fn exec_captures_output_and_exit_code() {
        let dir = tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());

        let result = sandbox
            .exec("echo out; echo err >&2; exit 3", Duration::from_secs(5), None)
            .await
            .unwrap();
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn exec_times_out() {
        let dir = tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());

        let result = sandbox
            .exec("sleep 5", Duration::from_millis(50), None)
            .await;
        assert!(matches!(result, Err(SandboxError::Timeout(_))));
    }

    #[tokio::test]
    async fn exec_rejects_escaped_working_dir() {
        let dir = tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());

        let result = sandbox
            .exec("true", Duration::from_secs(1), Some("../elsewhere"))
            .await;
        assert!(matches!(result, Err(SandboxError::PathEscapes(_))));
    }
}
