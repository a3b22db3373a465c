use std::path::PathBuf;

use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error("config file {path}: {message}")]
	Config { path: PathBuf, message: String },

	/// The user declined a daemon prompt, or stdin closed before answering.
	#[error("interaction declined: {0}")]
	Declined(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	WebApi(#[from] cvmweb::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

/// Maps a client error onto the CLI error vocabulary.
fn classify_webapi_error(err: &cvmweb::Error) -> (ErrorCode, Option<serde_json::Value>) {
	use cvmweb::Error;

	match err {
		Error::ServiceUnavailable(url) => (ErrorCode::DaemonUnavailable, Some(serde_json::json!({ "url": url }))),
		Error::ConnectionFailed(_) | Error::TransportError(_) | Error::ChannelClosed => {
			(ErrorCode::DaemonUnavailable, None)
		}
		Error::Remote { code, .. } => {
			let details = Some(serde_json::json!({ "daemonCode": code.code(), "daemonError": code.name() }));
			if err.is_access_denied() {
				(ErrorCode::AccessDenied, details)
			} else {
				(ErrorCode::RemoteFailure, details)
			}
		}
		Error::Rejected(_) => (ErrorCode::RemoteFailure, None),
		Error::ProtocolError(_) | Error::Json(_) => (ErrorCode::ProtocolError, None),
		Error::Timeout(_) => (ErrorCode::Timeout, None),
		Error::Cancelled(_) => (ErrorCode::Cancelled, None),
		Error::InvalidArgument(_) => (ErrorCode::InvalidInput, None),
		Error::SessionNotFound(_) => (ErrorCode::SessionError, None),
		Error::Io(_) => (ErrorCode::IoError, None),
	}
}

impl CliError {
	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = match self {
			CliError::InvalidInput(_) => (ErrorCode::InvalidInput, None),
			CliError::Config { path, .. } => (ErrorCode::ConfigError, Some(serde_json::json!({ "path": path }))),
			CliError::Declined(_) => (ErrorCode::AccessDenied, None),
			CliError::Io(_) => (ErrorCode::IoError, None),
			CliError::Json(_) => (ErrorCode::InternalError, None),
			CliError::WebApi(err) => classify_webapi_error(err),
			CliError::Anyhow(_) => (ErrorCode::InternalError, None),
		};

		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}
}
