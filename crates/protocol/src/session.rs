//! Session identifiers and state.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque session identifier assigned by the daemon.
///
/// The daemon hands out integers but routes events by their string form, so
/// the id is stored as text and converted back when sent in `session_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
	pub fn new(id: impl AsRef<str>) -> Self {
		Self(Arc::from(id.as_ref()))
	}

	/// Reads an id from a JSON string or number.
	pub fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::String(s) if !s.is_empty() => Some(Self::new(s)),
			Value::Number(n) => Some(Self::new(n.to_string())),
			_ => None,
		}
	}

	/// Value to send as `session_id`: a number when the id is numeric.
	pub fn to_wire(&self) -> Value {
		match self.0.parse::<i64>() {
			Ok(n) => Value::from(n),
			Err(_) => Value::String(self.0.to_string()),
		}
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl Borrow<str> for SessionId {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl From<&str> for SessionId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl Serialize for SessionId {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.0)
	}
}

/// Virtual machine state as reported by `stateChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
	#[default]
	Missing,
	Available,
	PoweredOff,
	Saved,
	Paused,
	Running,
	Unknown(i64),
}

impl SessionState {
	pub fn from_code(code: i64) -> Self {
		match code {
			0 => Self::Missing,
			1 => Self::Available,
			2 => Self::PoweredOff,
			3 => Self::Saved,
			4 => Self::Paused,
			5 => Self::Running,
			other => Self::Unknown(other),
		}
	}

	pub fn code(&self) -> i64 {
		match self {
			Self::Missing => 0,
			Self::Available => 1,
			Self::PoweredOff => 2,
			Self::Saved => 3,
			Self::Paused => 4,
			Self::Running => 5,
			Self::Unknown(code) => *code,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Missing => "missing",
			Self::Available => "available",
			Self::PoweredOff => "poweroff",
			Self::Saved => "saved",
			Self::Paused => "paused",
			Self::Running => "running",
			Self::Unknown(_) => "unknown",
		}
	}
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Serialize for SessionState {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

/// Entry of the privileged `enumSessions` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
	pub uuid: String,
	#[serde(default)]
	pub config: Value,
}
