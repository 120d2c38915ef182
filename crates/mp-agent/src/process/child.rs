//! Child process management
//!
//! Spawns the bridged command with all three stdio streams piped.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use mp_core::{CommandSpec, SessionError};

/// A running child process owned by one session
#[derive(Debug)]
pub struct ChildProcess {
    /// Command line, for logging
    command: String,
    /// Process ID, if the OS reported one
    pid: Option<u32>,
    /// Child process handle
    child: Child,
}

/// The child's stdio pipes, handed to the forwarders
#[derive(Debug)]
pub struct ChildPipes {
    /// Writer to the child's stdin
    pub stdin: ChildStdin,
    /// Reader for the child's stdout
    pub stdout: ChildStdout,
    /// Reader for the child's stderr
    pub stderr: ChildStderr,
}

impl ChildProcess {
    /// Spawn `spec` with piped stdio, inheriting this process's environment.
    ///
    /// The child is killed if the handle is dropped without being reaped.
    pub fn spawn(spec: &CommandSpec) -> Result<(Self, ChildPipes), SessionError> {
        let command = spec.to_string();

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SessionError::Spawn {
                command: command.clone(),
                source,
            })?;

        let pid = child.id();
        tracing::info!("Started `{}` process (pid {:?})", command, pid);

        let stdin = child.stdin.take().ok_or(SessionError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(SessionError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(SessionError::MissingPipe("stderr"))?;

        Ok((
            Self {
                command,
                pid,
                child,
            },
            ChildPipes {
                stdin,
                stdout,
                stderr,
            },
        ))
    }

    /// Command line the process was started with
    pub fn command(&self) -> &str {
        &self.command
    }

    /// OS process ID
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExitStatus, SessionError> {
        self.child.wait().await.map_err(SessionError::Wait)
    }

    /// Give the process `grace` to exit on its own, then kill it.
    ///
    /// Returns the exit status once the process has been reaped.
    pub async fn terminate(&mut self, grace: Duration) -> Result<ExitStatus, SessionError> {
        if let Ok(status) = tokio::time::timeout(grace, self.child.wait()).await {
            return status.map_err(SessionError::Wait);
        }

        tracing::warn!(
            "`{}` did not exit within {:?} of losing its input, killing it",
            self.command,
            grace
        );
        if let Err(e) = self.child.start_kill() {
            tracing::debug!("Kill failed for `{}`: {}", self.command, e);
        }
        self.wait().await
    }
}
