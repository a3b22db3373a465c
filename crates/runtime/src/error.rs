//! Error types for the CernVM WebAPI runtime.

use cvmweb_protocol::ErrorCode;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the daemon.
#[derive(Debug, Error)]
pub enum Error {
	/// Nothing is listening on the daemon endpoint (not installed or not running).
	#[error("CernVM WebAPI daemon is not available at {0}")]
	ServiceUnavailable(String),

	/// Connection attempt failed for another reason.
	#[error("Failed to connect to CernVM WebAPI daemon: {0}")]
	ConnectionFailed(String),

	/// Transport-level error (WebSocket).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Unexpected or malformed frame.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// The daemon reported a failure through the `failed` callback.
	#[error("{message} [{code}]")]
	Remote {
		/// Human-readable message from the daemon
		message: String,
		/// Daemon error code
		code: ErrorCode,
	},

	/// The daemon rejected the request itself (missing parameter, unknown session).
	#[error("Request rejected: {0}")]
	Rejected(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// Timeout waiting for operation.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Connection closed while a reply was outstanding.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// Invalid argument provided to method.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// Operation on a session that is closed or unknown.
	#[error("Session not found: {0}")]
	SessionNotFound(String),

	/// Operation was cancelled by the caller.
	#[error("Cancelled: {0}")]
	Cancelled(String),
}

impl Error {
	/// Returns the daemon error code if this is a Remote error.
	pub fn code(&self) -> Option<ErrorCode> {
		match self {
			Error::Remote { code, .. } => Some(*code),
			_ => None,
		}
	}

	/// Returns true if the daemon could not be reached at all.
	pub fn is_unavailable(&self) -> bool {
		matches!(self, Error::ServiceUnavailable(_))
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// Returns true if the daemon (or the user through it) denied the request.
	pub fn is_access_denied(&self) -> bool {
		matches!(
			self.code(),
			Some(ErrorCode::AccessDenied | ErrorCode::PasswordDenied | ErrorCode::NotTrusted)
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn remote_error_display() {
		let err = Error::Remote {
			message: "User denied the allocation of new session".to_string(),
			code: ErrorCode::from_code(-2),
		};
		assert_eq!(
			err.to_string(),
			"User denied the allocation of new session [ACCESS_DENIED (-2)]"
		);
		assert!(err.is_access_denied());
		assert_eq!(err.code(), Some(ErrorCode::AccessDenied));
	}

	#[test]
	fn unavailable_is_not_remote() {
		let err = Error::ServiceUnavailable("ws://127.0.0.1:5624/".to_string());
		assert!(err.is_unavailable());
		assert_eq!(err.code(), None);
		assert!(!err.is_access_denied());
	}
}
