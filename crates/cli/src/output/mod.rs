//! Structured output envelope for all CLI commands.
//!
//! Every command produces one result envelope on stdout:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "ok": true,
//!   "command": "open",
//!   "inputs": { "vmcp": "https://example.org/vm.vmcp" },
//!   "data": { ... },
//!   "timings": { "durationMs": 1234 }
//! }
//! ```
//!
//! On failure `data` is absent and `error` carries a code and message.
//! Streaming commands (`watch`) additionally print one [`EventLine`] per
//! event before the final envelope.


use std::io::{self, Write};
use std::time::{Duration, Instant};

use colored::Colorize;
use serde::{Deserialize, Serialize};

/// Current schema version for command output.
///
/// Increment this when making breaking changes to the output structure.
pub const SCHEMA_VERSION: u32 = 1;

/// Output format for CLI results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Pretty-printed JSON (default)
	#[default]
	Json,
	/// Newline-delimited JSON (streaming)
	Ndjson,
	/// Human-readable text
	Text,
}

impl std::str::FromStr for OutputFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"json" => Ok(OutputFormat::Json),
			"ndjson" => Ok(OutputFormat::Ndjson),
			"text" => Ok(OutputFormat::Text),
			_ => Err(format!("unknown format: {s}")),
		}
	}
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Json => write!(f, "json"),
			OutputFormat::Ndjson => write!(f, "ndjson"),
			OutputFormat::Text => write!(f, "text"),
		}
	}
}

/// The result envelope returned by all commands.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema_version: Option<u32>,

	pub ok: bool,

	/// Command name (e.g., "open", "control", "viewer")
	pub command: String,

	/// Inputs used for this command (for traceability)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub inputs: Option<serde_json::Value>,

	/// Command-specific result data (only present on success)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,

	/// Error information (only present on failure)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub timings: Option<Timings>,
}

/// Error information for failed commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,

	/// Human-readable error message
	pub message: String,

	/// Additional error details (daemon error code, URL, ...)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Standardized error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Nothing answered at the daemon endpoint
	DaemonUnavailable,
	/// The daemon reported a failure
	RemoteFailure,
	/// The daemon or the user refused the request
	AccessDenied,
	/// Operation timed out
	Timeout,
	/// The operation was cancelled or polling gave up
	Cancelled,
	/// Session is closed or unknown
	SessionError,
	/// Malformed or unexpected daemon traffic
	ProtocolError,
	/// Invalid input provided
	InvalidInput,
	/// Configuration file could not be used
	ConfigError,
	/// File I/O error
	IoError,
	/// Unknown/internal error
	InternalError,
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::DaemonUnavailable => write!(f, "DAEMON_UNAVAILABLE"),
			ErrorCode::RemoteFailure => write!(f, "REMOTE_FAILURE"),
			ErrorCode::AccessDenied => write!(f, "ACCESS_DENIED"),
			ErrorCode::Timeout => write!(f, "TIMEOUT"),
			ErrorCode::Cancelled => write!(f, "CANCELLED"),
			ErrorCode::SessionError => write!(f, "SESSION_ERROR"),
			ErrorCode::ProtocolError => write!(f, "PROTOCOL_ERROR"),
			ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
			ErrorCode::ConfigError => write!(f, "CONFIG_ERROR"),
			ErrorCode::IoError => write!(f, "IO_ERROR"),
			ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
		}
	}
}

/// Timing information for the command
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	/// Total duration in milliseconds
	pub duration_ms: u64,
}

impl From<Duration> for Timings {
	fn from(duration: Duration) -> Self {
		Timings {
			duration_ms: duration.as_millis() as u64,
		}
	}
}

/// Builder for constructing command results
pub struct ResultBuilder<T: Serialize> {
	command: String,
	inputs: Option<serde_json::Value>,
	data: Option<T>,
	error: Option<CommandError>,
	start_time: Instant,
}

impl<T: Serialize> ResultBuilder<T> {
	/// Create a new result builder for the given command.
	///
	/// Timing starts now.
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			inputs: None,
			data: None,
			error: None,
			start_time: Instant::now(),
		}
	}

	/// Start timing from an earlier instant (the command's real start).
	pub fn started_at(mut self, start: Instant) -> Self {
		self.start_time = start;
		self
	}

	pub fn inputs(mut self, inputs: serde_json::Value) -> Self {
		self.inputs = Some(inputs);
		self
	}

	/// Set the successful result data
	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, error: CommandError) -> Self {
		self.error = Some(error);
		self
	}

	/// Build the final result
	pub fn build(self) -> CommandResult<T> {
		let ok = self.error.is_none() && self.data.is_some();

		CommandResult {
			schema_version: Some(SCHEMA_VERSION),
			ok,
			command: self.command,
			inputs: self.inputs,
			data: self.data,
			error: self.error,
			timings: Some(Timings::from(self.start_time.elapsed())),
		}
	}
}

/// One streamed event, printed by `watch` as it happens.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLine<'a, E: Serialize> {
	pub session: &'a str,
	#[serde(flatten)]
	pub event: &'a E,
}

/// Print a command result to stdout in the specified format
pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	match format {
		OutputFormat::Json => {
			if let Ok(json) = serde_json::to_string_pretty(result) {
				println!("{json}");
			}
		}
		OutputFormat::Ndjson => {
			if let Ok(json) = serde_json::to_string(result) {
				println!("{json}");
			}
		}
		OutputFormat::Text => {
			print_result_text(result);
		}
	}
}

/// Print a command result in human-readable text format
fn print_result_text<T: Serialize>(result: &CommandResult<T>) {
	let mut stdout = io::stdout().lock();

	if result.ok {
		if let Some(ref data) = result.data {
			match serde_json::to_value(data) {
				Ok(serde_json::Value::String(s)) => {
					let _ = writeln!(stdout, "{s}");
				}
				Ok(value) => {
					if let Ok(json) = serde_json::to_string_pretty(&value) {
						let _ = writeln!(stdout, "{json}");
					}
				}
				Err(_) => {}
			}
		}
	} else if let Some(ref error) = result.error {
		let _ = writeln!(stdout, "Error [{}]: {}", error.code, error.message);
		if let Some(ref details) = error.details {
			if let Ok(json) = serde_json::to_string_pretty(details) {
				let _ = writeln!(stdout, "Details: {json}");
			}
		}
	}
}

/// Print one streamed event.
///
/// JSON and NDJSON both stream compact lines so the output stays parseable
/// line by line; text gets a short colored summary.
pub fn print_event<E: Serialize>(session: &str, event: &E, format: OutputFormat) {
	match format {
		OutputFormat::Json | OutputFormat::Ndjson => {
			if let Ok(json) = serde_json::to_string(&EventLine { session, event }) {
				println!("{json}");
			}
		}
		OutputFormat::Text => {
			let Ok(serde_json::Value::Object(mut fields)) = serde_json::to_value(event) else {
				return;
			};
			let name = fields
				.remove("event")
				.and_then(|v| v.as_str().map(str::to_string))
				.unwrap_or_default();
			let rest = serde_json::Value::Object(fields);
			println!("{} {} {}", session.dimmed(), name.cyan(), rest);
		}
	}
}

/// Print an error to stderr in human-readable format
pub fn print_error_stderr(error: &CommandError) {
	eprintln!("{} [{}]: {}", "Error".red().bold(), error.code, error.message);
}

/// Print progress feedback to stderr.
pub fn print_progress(message: &str, percent: Option<f64>) {
	match percent {
		Some(percent) => eprintln!("{} {:>5.1}% {}", "progress".green(), percent, message),
		None => eprintln!("{} {}", "progress".green(), message),
	}
}
