//! Numeric error codes reported by the daemon in `failed` events.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Hypervisor/daemon error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
	Ok,
	Scheduled,
	AlreadyExists,
	Generic,
	AccessDenied,
	Unsupported,
	QueryError,
	ExternalError,
	InvalidState,
	NotFound,
	NotAllowed,
	NotSupported,
	NotValidated,
	NotTrusted,
	StillWorking,
	PasswordDenied,
	UsageError,
	NotImplemented,
	Other(i64),
}

impl ErrorCode {
	pub fn from_code(code: i64) -> Self {
		match code {
			0 => Self::Ok,
			1 => Self::Scheduled,
			2 => Self::AlreadyExists,
			-1 => Self::Generic,
			-2 => Self::AccessDenied,
			-3 => Self::Unsupported,
			-4 => Self::QueryError,
			-5 => Self::ExternalError,
			-6 => Self::InvalidState,
			-7 => Self::NotFound,
			-8 => Self::NotAllowed,
			-9 => Self::NotSupported,
			-10 => Self::NotValidated,
			-11 => Self::NotTrusted,
			-12 => Self::StillWorking,
			-20 => Self::PasswordDenied,
			-99 => Self::UsageError,
			-100 => Self::NotImplemented,
			other => Self::Other(other),
		}
	}

	pub fn code(&self) -> i64 {
		match self {
			Self::Ok => 0,
			Self::Scheduled => 1,
			Self::AlreadyExists => 2,
			Self::Generic => -1,
			Self::AccessDenied => -2,
			Self::Unsupported => -3,
			Self::QueryError => -4,
			Self::ExternalError => -5,
			Self::InvalidState => -6,
			Self::NotFound => -7,
			Self::NotAllowed => -8,
			Self::NotSupported => -9,
			Self::NotValidated => -10,
			Self::NotTrusted => -11,
			Self::StillWorking => -12,
			Self::PasswordDenied => -20,
			Self::UsageError => -99,
			Self::NotImplemented => -100,
			Self::Other(code) => *code,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			Self::Ok => "OK",
			Self::Scheduled => "SCHEDULED",
			Self::AlreadyExists => "ALREADY_EXISTS",
			Self::Generic => "ERROR",
			Self::AccessDenied => "ACCESS_DENIED",
			Self::Unsupported => "UNSUPPORTED",
			Self::QueryError => "QUERY_ERROR",
			Self::ExternalError => "EXTERNAL_ERROR",
			Self::InvalidState => "INVALID_STATE",
			Self::NotFound => "NOT_FOUND",
			Self::NotAllowed => "NOT_ALLOWED",
			Self::NotSupported => "NOT_SUPPORTED",
			Self::NotValidated => "NOT_VALIDATED",
			Self::NotTrusted => "NOT_TRUSTED",
			Self::StillWorking => "STILL_WORKING",
			Self::PasswordDenied => "PASSWORD_DENIED",
			Self::UsageError => "USAGE_ERROR",
			Self::NotImplemented => "NOT_IMPLEMENTED",
			Self::Other(_) => "UNKNOWN",
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.name(), self.code())
	}
}

impl Serialize for ErrorCode {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_i64(self.code())
	}
}

impl<'de> Deserialize<'de> for ErrorCode {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		i64::deserialize(deserializer).map(Self::from_code)
	}
}
