use std::fmt;
use std::io::{self, Write};
use std::process::ExitStatus;
use std::str::FromStr;

use async_trait::async_trait;

/// A program plus its arguments, split from a whitespace-separated string.
/// Quoting is not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// First element is the program. `None` when `parts` is empty.
    pub fn from_parts(parts: Vec<String>) -> Option<Self> {
        let mut parts = parts.into_iter();
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl FromStr for CommandLine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_parts(s.split_whitespace().map(str::to_string).collect())
            .ok_or_else(|| "command must not be empty".to_string())
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a startup step finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepExit {
    Success,
    /// Exit code, or `128 + signal` when the step was killed by a signal.
    Failed(i32),
}

impl StepExit {
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return StepExit::Success;
        }
        if let Some(code) = status.code() {
            return StepExit::Failed(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return StepExit::Failed(128 + signal);
            }
        }
        StepExit::Failed(1)
    }

    pub fn code(&self) -> i32 {
        match self {
            StepExit::Success => 0,
            StepExit::Failed(code) => *code,
        }
    }
}

/// Runs the external collaborators of the startup sequence.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` to completion with inherited stdio.
    async fn status(&self, command: &CommandLine) -> io::Result<StepExit>;

    /// Replaces the current process with `command`. Like
    /// `CommandExt::exec`, this only returns if the handoff failed.
    fn hand_off(&self, command: &CommandLine) -> io::Error;
}

#[async_trait]
impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    async fn status(&self, command: &CommandLine) -> io::Result<StepExit> {
        (**self).status(command).await
    }

    fn hand_off(&self, command: &CommandLine) -> io::Error {
        (**self).hand_off(command)
    }
}

/// Runs real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn status(&self, command: &CommandLine) -> io::Result<StepExit> {
        let status = tokio::process::Command::new(command.program())
            .args(command.args())
            .kill_on_drop(true)
            .status()
            .await?;
        Ok(StepExit::from_status(status))
    }

    #[cfg(unix)]
    fn hand_off(&self, command: &CommandLine) -> io::Error {
        use std::os::unix::process::CommandExt;

        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        std::process::Command::new(command.program())
            .args(command.args())
            .exec()
    }

    // No exec outside Unix: run the server as a child and mirror its exit code.
    #[cfg(not(unix))]
    fn hand_off(&self, command: &CommandLine) -> io::Error {
        let _ = io::stdout().flush();
        match std::process::Command::new(command.program())
            .args(command.args())
            .status()
        {
            Ok(status) => std::process::exit(StepExit::from_status(status).code()),
            Err(err) => err,
        }
    }
}
