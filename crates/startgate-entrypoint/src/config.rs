use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::builder::FalseyValueParser;
use clap::Parser;
use startgate_core::{ConnectionDescriptor, RetryPolicy};

use crate::runner::CommandLine;

#[derive(Parser, Debug)]
#[clap(
    name = "startgate-entrypoint",
    version,
    about = "Wait for the database, migrate, collect static files, then exec the server"
)]
pub struct CliOpts {
    /// Connection string of the database to wait for; unset skips the wait
    #[clap(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Debug flag; `false` (any case) or `0` selects production mode
    #[clap(long, env = "DEBUG")]
    debug: Option<String>,

    /// Probe attempts before giving up on the database
    #[clap(long, env = "STARTGATE_MAX_ATTEMPTS", default_value_t = RetryPolicy::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Seconds to sleep after each failed probe
    #[clap(long, env = "STARTGATE_INTERVAL_SECS", default_value_t = 1)]
    interval_secs: u64,

    /// Seconds a single probe may take
    #[clap(long, env = "STARTGATE_PROBE_TIMEOUT_SECS", default_value_t = 2)]
    probe_timeout_secs: u64,

    /// External readiness utility, e.g. "pg_isready -h {host} -p {port}";
    /// unset uses a plain TCP connect
    #[clap(long, env = "STARTGATE_PROBE_COMMAND")]
    probe_command: Option<String>,

    #[clap(
        long,
        env = "STARTGATE_MIGRATE_COMMAND",
        default_value = "python manage.py migrate --noinput"
    )]
    migrate_command: CommandLine,

    /// Only run in production mode
    #[clap(
        long,
        env = "STARTGATE_COLLECTSTATIC_COMMAND",
        default_value = "python manage.py collectstatic --noinput"
    )]
    collectstatic_command: CommandLine,

    /// Any value except a false-like one (`0`, `false`, `no`, `off`, empty)
    /// turns colour off
    #[clap(long, env = "NO_COLOR", value_parser = FalseyValueParser::new())]
    no_color: bool,

    /// Emit diagnostic logs as JSON
    #[clap(long, env = "STARTGATE_LOG_JSON", value_parser = FalseyValueParser::new())]
    log_json: bool,

    /// Server command that replaces this process
    #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

/// Production mode is selected by an explicit "debug off" value; everything
/// else, including an unset flag, is treated as development.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Production,
    Development,
}

impl Mode {
    pub fn from_debug_flag(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Mode::Production,
            _ => Mode::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeConfig {
    Tcp { timeout: Duration },
    Command { command: String, timeout: Duration },
}

/// Everything the startup sequence needs, read once from flags and
/// environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub descriptor: Option<ConnectionDescriptor>,
    pub mode: Mode,
    pub policy: RetryPolicy,
    pub probe: ProbeConfig,
    pub migrate: CommandLine,
    pub collectstatic: CommandLine,
    pub server: CommandLine,
    pub no_color: bool,
    pub log_json: bool,
}

impl CliOpts {
    pub fn into_config(self) -> Result<Config> {
        let server = CommandLine::from_parts(self.command)
            .ok_or_else(|| anyhow!("a server command is required"))?;
        let timeout = Duration::from_secs(self.probe_timeout_secs);
        let probe = match self.probe_command.filter(|c| !c.trim().is_empty()) {
            Some(command) => ProbeConfig::Command { command, timeout },
            None => ProbeConfig::Tcp { timeout },
        };

        Ok(Config {
            descriptor: ConnectionDescriptor::from_optional(self.database_url.as_deref()),
            mode: Mode::from_debug_flag(self.debug.as_deref()),
            policy: RetryPolicy::new(self.max_attempts, Duration::from_secs(self.interval_secs)),
            probe,
            migrate: self.migrate_command,
            collectstatic: self.collectstatic_command,
            server,
            no_color: self.no_color,
            log_json: self.log_json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        CliOpts::try_parse_from(args)
            .expect("valid arguments")
            .into_config()
            .expect("valid config")
    }

    #[test]
    fn debug_flag_selects_mode() {
        for value in ["False", "false", "FALSE", "0"] {
            assert_eq!(Mode::from_debug_flag(Some(value)), Mode::Production, "{value}");
        }
        for value in ["True", "true", "1", "", "no", " false"] {
            assert_eq!(Mode::from_debug_flag(Some(value)), Mode::Development, "{value}");
        }
        assert_eq!(Mode::from_debug_flag(None), Mode::Development);
    }

    // Flags are given explicitly so values from the test environment never win.
    #[test]
    fn flags_build_config() {
        let config = parse(&[
            "startgate-entrypoint",
            "--database-url",
            "postgres://u:p@db:6543/app",
            "--debug",
            "False",
            "--max-attempts",
            "5",
            "--interval-secs",
            "2",
            "--probe-command",
            "pg_isready -h {host} -p {port}",
            "--migrate-command",
            "./manage migrate",
            "--collectstatic-command",
            "./manage collectstatic",
            "--",
            "gunicorn",
            "app.wsgi",
            "--bind",
            "0.0.0.0:8000",
        ]);

        let descriptor = config.descriptor.expect("descriptor");
        assert_eq!((descriptor.host(), descriptor.port()), (Some("db"), 6543));
        assert!(config.mode.is_production());
        assert_eq!(config.policy, RetryPolicy::new(5, Duration::from_secs(2)));
        assert_eq!(
            config.probe,
            ProbeConfig::Command {
                command: "pg_isready -h {host} -p {port}".into(),
                timeout: Duration::from_secs(2),
            }
        );
        assert_eq!(config.migrate.to_string(), "./manage migrate");
        assert_eq!(config.collectstatic.to_string(), "./manage collectstatic");
        assert_eq!(config.server.program(), "gunicorn");
        assert_eq!(config.server.args(), ["app.wsgi", "--bind", "0.0.0.0:8000"]);
    }

    #[test]
    fn server_arguments_may_look_like_flags() {
        let config = parse(&[
            "startgate-entrypoint",
            "--database-url",
            "",
            "--debug",
            "1",
            "uvicorn",
            "--port",
            "8000",
        ]);
        assert!(config.descriptor.is_none());
        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.server.to_string(), "uvicorn --port 8000");
    }

    #[test]
    fn server_command_is_required() {
        assert!(CliOpts::try_parse_from(["startgate-entrypoint"]).is_err());
    }
}
