//! Remote execution transport.
//!
//! The benchmark's only contact with a VM is "run this command" and "copy
//! this file", so the transport is a narrow trait. The production
//! implementation drives the OpenSSH client binaries; password
//! authentication is delegated to `sshpass`.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use virtfleet_common::Result;

use crate::auth::{AuthMethod, AuthSpec};

/// Captured outcome of one remote operation on one host.
#[derive(Debug, Clone)]
pub struct HostOutput {
    /// Remote exit code; -1 when the process died without one
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl HostOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Single-host command/copy capability; fan-out lives above this seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Run a shell command on one host.
    async fn run(&self, address: &str, command: &str) -> Result<HostOutput>;

    /// Copy a local file onto one host.
    async fn copy(&self, address: &str, local: &Path, remote: &str) -> Result<HostOutput>;
}

/// Transport backed by `ssh`/`scp`.
pub struct SshTransport {
    user: String,
    password: String,
}

impl SshTransport {
    pub fn new(auth: &AuthSpec) -> SshTransport {
        let AuthMethod::Password { password } = &auth.method;
        SshTransport {
            user: auth.user.clone(),
            password: password.clone(),
        }
    }

    /// `sshpass -p <password> <program> -o StrictHostKeyChecking=no ...`
    fn base_command(&self, program: &str) -> Command {
        let mut cmd = Command::new("sshpass");
        cmd.args([
            "-p",
            self.password.as_str(),
            program,
            "-o",
            "StrictHostKeyChecking=no",
        ]);
        cmd
    }

    async fn capture(mut cmd: Command) -> Result<HostOutput> {
        let output = cmd.output().await?;
        Ok(HostOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    async fn run(&self, address: &str, command: &str) -> Result<HostOutput> {
        let mut cmd = self.base_command("ssh");
        cmd.arg(format!("{}@{}", self.user, address)).arg(command);
        SshTransport::capture(cmd).await
    }

    async fn copy(&self, address: &str, local: &Path, remote: &str) -> Result<HostOutput> {
        let mut cmd = self.base_command("scp");
        cmd.arg(local)
            .arg(format!("{}@{}:{}", self.user, address, remote));
        SshTransport::capture(cmd).await
    }
}
