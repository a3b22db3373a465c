//! Event types delivered to plugin and session handlers.

use cvmweb_protocol::{EventFrame, Interaction, Resolution, SessionState};
use serde::Serialize;
use serde_json::{Map, Value};

/// Events raised on the [`WebApiPlugin`](crate::WebApiPlugin) itself.
///
/// Progress feedback of `requestSession` is surfaced here rather than on the
/// session, because the session does not exist until the request succeeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PluginEvent {
	Progress { message: String, percent: f64 },
	Started { message: String },
	Completed { message: String },
	/// The daemon granted or revoked privileged access.
	Privileged { privileged: bool },
	/// The daemon needs the user to answer a prompt; reply with
	/// [`WebApiPlugin::reply_interaction`](crate::WebApiPlugin::reply_interaction).
	Interact { interaction: Interaction },
	/// The daemon connection closed.
	Disconnected,
}

/// Events raised on a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
	StateVariables { variables: Map<String, Value> },
	StateChanged { state: SessionState },
	ApiStateChanged { available: bool, url: Option<String> },
	ResolutionChanged { resolution: Resolution },
	/// The hypervisor reported a problem. The daemon sends either a message
	/// or a failure flag word.
	Failure { message: Option<String>, flags: Option<i64> },
	/// Session event this client does not model.
	Other { name: String, data: Value },
	/// The session was closed or its connection went away.
	Closed,
}

impl SessionEvent {
	/// Decodes a session-scoped event frame.
	pub fn from_frame(frame: EventFrame) -> Self {
		match frame.name.as_str() {
			"stateVariables" => match frame.data {
				Value::Object(variables) => SessionEvent::StateVariables { variables },
				_ => SessionEvent::StateVariables {
					variables: Map::new(),
				},
			},
			"stateChanged" => SessionEvent::StateChanged {
				state: SessionState::from_code(frame.arg_i64(0).unwrap_or(0)),
			},
			"apiStateChanged" => SessionEvent::ApiStateChanged {
				available: frame.arg_bool(0).unwrap_or(false),
				url: frame.arg_string(1),
			},
			"resolutionChanged" => match resolution_args(&frame) {
				Some(resolution) => SessionEvent::ResolutionChanged { resolution },
				None => {
					tracing::warn!(data = %frame.data, "Malformed resolutionChanged event");
					SessionEvent::Other {
						name: frame.name,
						data: frame.data,
					}
				}
			},
			"failure" => match frame.args().first() {
				Some(Value::Number(n)) => SessionEvent::Failure {
					message: None,
					flags: n.as_i64(),
				},
				_ => SessionEvent::Failure {
					message: frame.arg_string(0),
					flags: None,
				},
			},
			_ => SessionEvent::Other {
				name: frame.name,
				data: frame.data,
			},
		}
	}
}

fn resolution_args(frame: &EventFrame) -> Option<Resolution> {
	let field = |i| {
		frame
			.arg_i64(i)
			.and_then(|n| u32::try_from(n).ok())
			.filter(|n| *n > 0)
	};
	Some(Resolution::new(
		field(0)?,
		field(1)?,
		field(2).unwrap_or(Resolution::DEFAULT_BPP),
	))
}
