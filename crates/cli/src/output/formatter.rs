//! Human-readable and JSON output
//!
//! Data goes to stdout; errors, warnings and progress go to stderr so piping
//! `urio cat` stays byte-exact.

use serde::Serialize;
use urio_core::Error;

use super::OutputConfig;
use crate::exit_code::ExitCode;

#[derive(Debug, Clone, Copy)]
enum Mark {
    Success,
    Error,
    Warning,
}

/// Formatter for CLI output
///
/// Handles both human-readable and JSON output formats based on configuration.
/// When JSON mode is enabled, all output is strict JSON without colors or progress.
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> OutputConfig {
        self.config
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Output a value
    ///
    /// In JSON mode, serializes the value to JSON.
    /// In human mode, uses the Display implementation.
    pub fn output<T: Serialize + std::fmt::Display>(&self, value: &T) {
        if self.config.quiet {
            return;
        }

        if self.config.json {
            self.json(value);
        } else {
            println!("{value}");
        }
    }

    /// Output a success message; silent in JSON mode, where the exit code speaks
    pub fn success(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        println!("{}", self.mark(Mark::Success, message));
    }

    /// Errors are always printed, even in quiet mode
    pub fn error(&self, message: &str) {
        if self.config.json {
            self.json_err(&serde_json::json!({ "error": message }));
        } else {
            eprintln!("{}", self.mark(Mark::Error, message));
        }
    }

    /// Report a failed operation and pick the matching exit code
    pub fn fail(&self, err: &Error) -> ExitCode {
        tracing::debug!(error = ?err, "command failed");
        if self.config.json {
            self.json_err(&serde_json::json!({
                "error": err.to_string(),
                "retryable": err.is_transient(),
            }));
        } else {
            eprintln!("{}", self.mark(Mark::Error, &err.to_string()));
        }
        ExitCode::from(err)
    }

    pub fn warning(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        eprintln!("{}", self.mark(Mark::Warning, message));
    }

    fn mark(&self, mark: Mark, message: &str) -> String {
        let (symbol, color) = match mark {
            Mark::Success => ("✓", "32"),
            Mark::Error => ("✗", "31"),
            Mark::Warning => ("⚠", "33"),
        };
        if self.colors_enabled() {
            format!("\x1b[{color}m{symbol}\x1b[0m {message}")
        } else {
            format!("{symbol} {message}")
        }
    }

    fn json_err(&self, value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => eprintln!("{json}"),
            Err(_) => eprintln!("{value}"),
        }
    }

    /// Output JSON directly
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing output: {e}"),
        }
    }

    /// Print a line of text (respects quiet mode)
    pub fn println(&self, message: &str) {
        if self.config.quiet {
            return;
        }
        println!("{message}");
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}
