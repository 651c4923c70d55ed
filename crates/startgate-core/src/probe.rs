use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;

use crate::descriptor::ConnectionDescriptor;
use crate::error::ProbeError;

/// A connection-level readiness check against a dependency.
///
/// `Ok(())` means the dependency accepts connections. Any error means "not
/// ready yet"; callers retry rather than fail.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, target: &ConnectionDescriptor) -> Result<(), ProbeError>;
}

#[async_trait]
impl<T: Probe + ?Sized> Probe for Arc<T> {
    async fn check(&self, target: &ConnectionDescriptor) -> Result<(), ProbeError> {
        (**self).check(target).await
    }
}

/// Opens (and immediately drops) a TCP connection to `host:port`.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self, target: &ConnectionDescriptor) -> Result<(), ProbeError> {
        let host = target.host().ok_or(ProbeError::MissingHost)?;
        match timeout(self.connect_timeout, TcpStream::connect((host, target.port()))).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(source)) => Err(ProbeError::Connect {
                target: target.to_string(),
                source,
            }),
            Err(_) => Err(ProbeError::Timeout {
                target: target.to_string(),
                timeout: self.connect_timeout,
            }),
        }
    }
}

/// Delegates the check to an external readiness utility such as
/// `pg_isready -h {host} -p {port}`. Exit status 0 means ready.
///
/// `{host}` and `{port}` in the arguments are replaced per attempt. The
/// utility's output is discarded and it is killed once `timeout` elapses.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Splits `line` on whitespace. Returns `None` for a blank line.
    pub fn from_command_line(line: &str, timeout: Duration) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), timeout))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn render_args(&self, host: &str, port: u16) -> Vec<String> {
        let port = port.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{host}", host).replace("{port}", &port))
            .collect()
    }
}

#[async_trait]
impl Probe for CommandProbe {
    async fn check(&self, target: &ConnectionDescriptor) -> Result<(), ProbeError> {
        let host = target.host().ok_or(ProbeError::MissingHost)?;
        let mut child = Command::new(&self.program)
            .args(self.render_args(host, target.port()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let waited = timeout(self.timeout, child.wait()).await;
        match waited {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(ProbeError::NotReady {
                program: self.program.clone(),
                status: status.to_string(),
            }),
            Ok(Err(source)) => Err(ProbeError::Spawn {
                program: self.program.clone(),
                source,
            }),
            Err(_) => {
                let _ = child.kill().await;
                Err(ProbeError::Timeout {
                    target: target.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}
