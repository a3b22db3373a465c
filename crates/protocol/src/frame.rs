//! Frame envelope exchanged with the daemon.
//!
//! ```json
//! {"type": "action",   "name": "requestSession", "id": "3", "data": {"vmcp": "..."}}
//! {"type": "response", "id": "0", "data": {"version": "2.0.0"}}
//! {"type": "event",    "name": "progress", "id": "3", "data": ["Downloading", 40]}
//! {"type": "error",    "id": "3", "error": "Missing 'vmcp' parameter"}
//! ```
//!
//! Ids travel as strings but the daemon echoes some of them (session ids) as
//! numbers, so both are accepted on input.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Any frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
	/// Command sent by the client.
	Action(ActionFrame),
	/// Plain reply to an action.
	Response(ResponseFrame),
	/// Callback-role, session or connection event.
	Event(EventFrame),
	/// Request-level rejection (bad parameters, unknown session).
	Error(ErrorFrame),
	/// Unrecognised `type`, kept for forward compatibility.
	#[serde(other)]
	Unknown,
}

impl Frame {
	/// Builds an outbound action frame.
	pub fn action(name: impl Into<String>, id: impl Into<String>, data: Option<Value>) -> Self {
		Frame::Action(ActionFrame {
			name: name.into(),
			id: id.into(),
			data,
		})
	}

	/// The correlation id, if the frame carries one.
	pub fn id(&self) -> Option<&str> {
		match self {
			Frame::Action(f) => Some(&f.id),
			Frame::Response(f) => Some(&f.id),
			Frame::Event(f) => f.id.as_deref(),
			Frame::Error(f) => f.id.as_deref(),
			Frame::Unknown => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFrame {
	pub name: String,
	#[serde(deserialize_with = "deserialize_id")]
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
	#[serde(deserialize_with = "deserialize_id")]
	pub id: String,
	#[serde(default)]
	pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
	pub name: String,
	#[serde(
		default,
		deserialize_with = "deserialize_optional_id",
		skip_serializing_if = "Option::is_none"
	)]
	pub id: Option<String>,
	#[serde(default)]
	pub data: Value,
}

impl EventFrame {
	/// Positional arguments; empty when `data` is not an array.
	pub fn args(&self) -> &[Value] {
		match &self.data {
			Value::Array(items) => items,
			_ => &[],
		}
	}

	/// Argument `index` as text. Numbers and booleans are stringified.
	pub fn arg_string(&self, index: usize) -> Option<String> {
		match self.args().get(index)? {
			Value::String(s) => Some(s.clone()),
			Value::Null => None,
			other => Some(other.to_string()),
		}
	}

	/// Argument `index` as an integer, accepting numeric strings.
	pub fn arg_i64(&self, index: usize) -> Option<i64> {
		match self.args().get(index)? {
			Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
			Value::String(s) => s.trim().parse().ok(),
			_ => None,
		}
	}

	/// Argument `index` as a float, accepting numeric strings.
	pub fn arg_f64(&self, index: usize) -> Option<f64> {
		match self.args().get(index)? {
			Value::Number(n) => n.as_f64(),
			Value::String(s) => s.trim().parse().ok(),
			_ => None,
		}
	}

	/// Argument `index` as a boolean; `0`/`1` are accepted too.
	pub fn arg_bool(&self, index: usize) -> Option<bool> {
		match self.args().get(index)? {
			Value::Bool(b) => Some(*b),
			Value::Number(n) => n.as_i64().map(|n| n != 0),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
	#[serde(
		default,
		deserialize_with = "deserialize_optional_id",
		skip_serializing_if = "Option::is_none"
	)]
	pub id: Option<String>,
	pub error: String,
}

fn id_from_value<E: serde::de::Error>(value: Value) -> Result<Option<String>, E> {
	match value {
		Value::Null => Ok(None),
		Value::String(s) => Ok(Some(s)),
		Value::Number(n) => Ok(Some(n.to_string())),
		other => Err(E::custom(format!("invalid frame id: {other}"))),
	}
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Value::deserialize(deserializer)?;
	id_from_value(value)?.ok_or_else(|| D::Error::custom("frame id must not be null"))
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Value::deserialize(deserializer)?;
	id_from_value(value)
}
