use std::convert::Infallible;
use std::fmt;
use std::io;

use startgate_core::{GateOutcome, Probe, ReadinessGate, Reporter, Sleeper};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::runner::{CommandLine, CommandRunner, StepExit};

/// Step-level status output.
pub trait Progress {
    fn step(&self, message: &str);
    fn success(&self, message: &str);
    fn warn(&self, message: &str);
}

impl<T: Progress + ?Sized> Progress for &T {
    fn step(&self, message: &str) {
        (**self).step(message);
    }

    fn success(&self, message: &str) {
        (**self).success(message);
    }

    fn warn(&self, message: &str) {
        (**self).warn(message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Migrate,
    CollectStatic,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Migrate => f.write_str("migration"),
            Step::CollectStatic => f.write_str("static file collection"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{step} exited with status {code}")]
    StepFailed { step: Step, code: i32 },

    #[error("could not launch {step} (`{command}`): {source}")]
    Launch {
        step: Step,
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("could not hand off to `{command}`: {source}")]
    Handoff {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl StartupError {
    /// Exit status this process should end with. A failed step's own code
    /// is passed through; launch failures follow the shell's 127/126.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::StepFailed { code, .. } => *code,
            StartupError::Launch { source, .. } | StartupError::Handoff { source, .. } => {
                if source.kind() == io::ErrorKind::NotFound {
                    127
                } else {
                    126
                }
            }
        }
    }
}

/// The linear startup sequence: gate, migrate, collect static files in
/// production, then hand the process over to the server.
pub struct Startup<'a, C, G> {
    config: &'a Config,
    runner: C,
    progress: G,
}

impl<'a, C, G> Startup<'a, C, G>
where
    C: CommandRunner,
    G: Progress,
{
    pub fn new(config: &'a Config, runner: C, progress: G) -> Self {
        Self {
            config,
            runner,
            progress,
        }
    }

    /// Only returns on failure; on success the server has replaced this
    /// process.
    pub async fn run<P, S, R>(
        &self,
        gate: &ReadinessGate<P, S, R>,
    ) -> Result<Infallible, StartupError>
    where
        P: Probe,
        S: Sleeper,
        R: Reporter,
    {
        match gate.wait(self.config.descriptor.as_ref()).await {
            GateOutcome::Skipped => debug!("no database configured, not waiting"),
            GateOutcome::Ready { attempts } => debug!(attempts, "database ready"),
            GateOutcome::TimedOut { attempts } => {
                debug!(attempts, "starting without a confirmed database connection")
            }
        }

        self.run_step(Step::Migrate, &self.config.migrate).await?;

        if self.config.mode.is_production() {
            self.run_step(Step::CollectStatic, &self.config.collectstatic)
                .await?;
        } else {
            debug!("development mode, skipping static file collection");
        }

        let server = &self.config.server;
        self.progress.step(&format!("Starting {server}"));
        info!(command = %server, "handing off to server");
        let source = self.runner.hand_off(server);
        Err(StartupError::Handoff {
            command: server.to_string(),
            source,
        })
    }

    async fn run_step(&self, step: Step, command: &CommandLine) -> Result<(), StartupError> {
        self.progress.step(&format!("Running {step}: {command}"));
        info!(%step, %command, "running startup step");

        let exit = self
            .runner
            .status(command)
            .await
            .map_err(|source| StartupError::Launch {
                step,
                command: command.to_string(),
                source,
            })?;
        match exit {
            StepExit::Success => {
                self.progress.success(&format!("{step} finished"));
                Ok(())
            }
            failed => Err(StartupError::StepFailed {
                step,
                code: failed.code(),
            }),
        }
    }
}
