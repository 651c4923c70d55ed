//! Human-readable status lines. Colour is cosmetic and dropped when the
//! stream is not a terminal, `NO_COLOR` is set or `--no-color` is passed.

use owo_colors::{OwoColorize as _, Stream};
use startgate_core::{GateEvent, Reporter};

use crate::startup::Progress;

pub struct Console;

impl Console {
    pub fn new(no_color: bool) -> Self {
        if no_color {
            owo_colors::set_override(false);
        }
        Self
    }

    pub fn error(&self, message: &str) {
        eprintln!(
            "{} {message}",
            "✗".if_supports_color(Stream::Stderr, |t| t.red())
        );
    }
}

impl Progress for Console {
    fn step(&self, message: &str) {
        println!(
            "{} {message}",
            "→".if_supports_color(Stream::Stdout, |t| t.cyan())
        );
    }

    fn success(&self, message: &str) {
        println!(
            "{} {message}",
            "✓".if_supports_color(Stream::Stdout, |t| t.green())
        );
    }

    fn warn(&self, message: &str) {
        println!(
            "{} {message}",
            "!".if_supports_color(Stream::Stdout, |t| t.yellow())
        );
    }
}

impl Reporter for Console {
    fn report(&self, event: &GateEvent<'_>) {
        match event {
            GateEvent::Waiting {
                target,
                attempt,
                max_attempts,
            } => self.step(&format!(
                "Waiting for database at {target}... (attempt {attempt}/{max_attempts})"
            )),
            GateEvent::Ready { target, .. } => {
                self.success(&format!("Database at {target} is ready"))
            }
            GateEvent::TimedOut { target, attempts } => self.warn(&format!(
                "Database at {target} not ready after {attempts} attempts, continuing anyway"
            )),
        }
    }
}
