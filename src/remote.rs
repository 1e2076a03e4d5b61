//! Remote command/file-transfer collaborator.
//!
//! The upload pipeline borrows a [`RemoteSession`] for the duration of one
//! upload; it never owns the session's lifecycle. Two primitives are
//! consumed: copy a local file to a remote path, and run a remote command
//! capturing both output streams. Exit codes are deliberately not part of
//! the contract — the storage tools on the other end don't report useful
//! ones, so callers judge success from the captured streams.
//!
//! Commands are built from discrete argument tokens. The production
//! implementation escapes each token individually before it crosses the
//! remote shell boundary, so cluster identifiers are never interpolated
//! into a command string unquoted.

use std::path::Path;
use std::process::Stdio;

use crate::config::SshConfig;
use crate::error::DeployError;

/// Captured output of a remote command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[allow(async_fn_in_trait)] // trait is internal-only
pub trait RemoteSession {
    /// Copy a local file to the given remote path.
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), DeployError>;

    /// Run a remote command, returning both streams. Transport failures
    /// (connection loss, unreachable host) are errors; whatever the remote
    /// command itself prints is returned for the caller to interpret.
    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput, DeployError>;
}

// ── OpenSSH-backed session ────────────────────────────────

/// Session backed by the local `ssh`/`scp` binaries.
pub struct SshSession {
    host: String,
    user: String,
    port: u16,
}

impl SshSession {
    pub fn new(config: &SshConfig) -> Self {
        Self {
            host: config.host.clone(),
            user: config.user.clone(),
            port: config.port,
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl RemoteSession for SshSession {
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), DeployError> {
        let target = format!("{}:{}", self.destination(), shell_escape(remote));
        let output = tokio::process::Command::new("scp")
            .arg("-P")
            .arg(self.port.to_string())
            .arg("-q")
            .arg(local)
            .arg(&target)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DeployError::Io {
                context: "running scp".into(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(DeployError::Transport {
                message: format!(
                    "scp to {target} failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        tracing::debug!(local = %local.display(), remote, "file staged on remote host");
        Ok(())
    }

    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput, DeployError> {
        // ssh joins its trailing arguments with spaces and hands the result
        // to the remote shell, so each token is escaped here — identifiers
        // never reach the remote shell uninterpreted.
        let mut command = String::from(program);
        for arg in args {
            command.push(' ');
            command.push_str(&shell_escape(arg));
        }

        tracing::debug!(host = %self.host, %command, "executing remote command");

        let output = tokio::process::Command::new("ssh")
            .arg("-p")
            .arg(self.port.to_string())
            .arg(self.destination())
            .arg("--")
            .arg(&command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DeployError::Io {
                context: "running ssh".into(),
                source: e,
            })?;

        // 255 is the ssh client's own failure code; anything else is the
        // remote command's status, which the output heuristics handle.
        if output.status.code() == Some(255) {
            return Err(DeployError::Transport {
                message: format!(
                    "ssh to {} failed: {}",
                    self.destination(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Quote a single token for a POSIX shell.
///
/// Plain identifier-like tokens pass through untouched; everything else is
/// single-quoted, with embedded single quotes spliced out as `'\''`.
pub fn shell_escape(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=+@".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
