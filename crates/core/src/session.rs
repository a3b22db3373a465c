//! Handles on daemon-side virtual machine sessions.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cvmweb_protocol::{EventFrame, RdpTarget, Resolution, SessionId, SessionState, ViewerWindow};
use cvmweb_runtime::{Connection, Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::events::SessionEvent;
use crate::handlers::{self, HandlerMap, Subscription};
use crate::plugin::{PluginOptions, bounded};
use crate::viewer::{Viewer, ViewerOpener};

/// Last known state of a session, folded from its events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
	pub state: SessionState,
	pub variables: Map<String, Value>,
	pub api_available: bool,
	pub api_url: Option<String>,
	pub resolution: Option<Resolution>,
	pub last_failure: Option<String>,
}

impl SessionSnapshot {
	fn apply(&mut self, event: &SessionEvent) {
		match event {
			SessionEvent::StateVariables { variables } => {
				if let Some(code) = variables.get("state").and_then(Value::as_i64) {
					self.state = SessionState::from_code(code);
				}
				for (key, value) in variables {
					self.variables.insert(key.clone(), value.clone());
				}
			}
			SessionEvent::StateChanged { state } => {
				self.state = *state;
				if *state != SessionState::Running {
					self.api_available = false;
				}
			}
			SessionEvent::ApiStateChanged { available, url } => {
				self.api_available = *available;
				if url.is_some() {
					self.api_url.clone_from(url);
				}
			}
			SessionEvent::ResolutionChanged { resolution } => self.resolution = Some(*resolution),
			SessionEvent::Failure { message, flags } => {
				self.last_failure = message
					.clone()
					.or_else(|| flags.map(|f| format!("failure flags {f:#x}")));
			}
			SessionEvent::Other { .. } | SessionEvent::Closed => {}
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
	Pending,
	Ready,
	Closed,
}

struct SessionShared {
	snapshot: Mutex<SessionSnapshot>,
	handlers: HandlerMap<SessionEvent>,
	lifecycle: watch::Sender<Lifecycle>,
}

struct SessionInner {
	id: SessionId,
	connection: Arc<Connection>,
	options: PluginOptions,
	shared: Arc<SessionShared>,
	event_task: JoinHandle<()>,
}

impl Drop for SessionInner {
	fn drop(&mut self) {
		self.event_task.abort();
	}
}

/// A virtual machine session opened through
/// [`WebApiPlugin::request_session`](crate::WebApiPlugin::request_session).
///
/// Cheap to clone; all clones share state. Events stop once the session is
/// closed or the connection ends.
#[derive(Clone)]
pub struct Session {
	inner: Arc<SessionInner>,
}

impl Session {
	pub(crate) fn new(
		connection: Arc<Connection>,
		id: SessionId,
		events: mpsc::UnboundedReceiver<EventFrame>,
		options: PluginOptions,
	) -> Self {
		let (lifecycle, _) = watch::channel(Lifecycle::Pending);
		let shared = Arc::new(SessionShared {
			snapshot: Mutex::new(SessionSnapshot::default()),
			handlers: handlers::new_handler_map(),
			lifecycle,
		});

		let event_task = tokio::spawn(pump_session_events(id.clone(), events, Arc::clone(&shared)));

		Self {
			inner: Arc::new(SessionInner {
				id,
				connection,
				options,
				shared,
				event_task,
			}),
		}
	}

	pub fn id(&self) -> &SessionId {
		&self.inner.id
	}

	pub fn snapshot(&self) -> SessionSnapshot {
		self.inner.shared.snapshot.lock().clone()
	}

	pub fn state(&self) -> SessionState {
		self.inner.shared.snapshot.lock().state
	}

	pub fn is_closed(&self) -> bool {
		*self.inner.shared.lifecycle.borrow() == Lifecycle::Closed
	}

	/// Registers a handler for this session's events.
	///
	/// Returns a [`Subscription`] that unregisters the handler when dropped.
	pub fn on_event<F, Fut>(&self, handler: F) -> Subscription
	where
		F: Fn(SessionEvent) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		handlers::register(&self.inner.shared.handlers, handler)
	}

	/// Waits for the first `stateVariables` event.
	pub(crate) async fn initialized(&self, timeout: Duration) -> Result<()> {
		let mut lifecycle = self.inner.shared.lifecycle.subscribe();
		let state = tokio::time::timeout(timeout, lifecycle.wait_for(|s| *s != Lifecycle::Pending))
			.await
			.map_err(|_| {
				Error::Timeout(format!(
					"session {} sent no state within {}ms",
					self.inner.id,
					timeout.as_millis()
				))
			})?
			.map(|s| *s)
			.map_err(|_| Error::ChannelClosed)?;

		match state {
			Lifecycle::Closed => Err(Error::SessionNotFound(self.inner.id.to_string())),
			_ => Ok(()),
		}
	}

	/// Boots the virtual machine. `params` are passed to the hypervisor as-is.
	pub async fn start(&self, params: Option<Map<String, Value>>) -> Result<String> {
		self.action("start", params.unwrap_or_default()).await.map(message)
	}

	pub async fn stop(&self) -> Result<String> {
		self.simple("stop").await
	}

	pub async fn pause(&self) -> Result<String> {
		self.simple("pause").await
	}

	pub async fn resume(&self) -> Result<String> {
		self.simple("resume").await
	}

	pub async fn hibernate(&self) -> Result<String> {
		self.simple("hibernate").await
	}

	pub async fn reset(&self) -> Result<String> {
		self.simple("reset").await
	}

	/// Closes the session and stops its event stream.
	pub async fn close(&self) -> Result<String> {
		let reply = self.simple("close").await?;
		self.inner.connection.unregister_route(self.inner.id.as_str());
		tracing::info!(session = %self.inner.id, "Session closed");
		Ok(reply)
	}

	/// Asks the daemon to resend this session's state variables.
	///
	/// The daemon does not acknowledge `sync`, so nothing is awaited.
	pub fn sync(&self) -> Result<()> {
		self.ensure_open()?;
		self.inner
			.connection
			.notify("sync", Some(Value::Object(self.payload(Map::new()))))
	}

	/// Reads a session parameter (`cpus`, `memory`, `apiURL`, `rdpURL`, ...).
	pub async fn get(&self, key: &str) -> Result<String> {
		let mut data = Map::new();
		data.insert("key".to_string(), Value::from(key));
		self.action("get", data).await.map(message)
	}

	/// Writes a session parameter. The daemon ignores unknown keys.
	pub async fn set(&self, key: &str, value: &str) -> Result<()> {
		self.action("set", key_value(key, value)).await.map(drop)
	}

	/// Writes a free-form property kept alongside the session.
	pub async fn set_property(&self, key: &str, value: &str) -> Result<()> {
		self.action("setProperty", key_value(key, value)).await.map(drop)
	}

	/// URL of the API port exposed by the virtual machine.
	pub async fn api_url(&self) -> Result<String> {
		self.get("apiURL").await
	}

	/// Where to point an RDP client at this session's display.
	pub async fn rdp_target(&self) -> Result<RdpTarget> {
		let raw = self.get("rdpURL").await?;
		RdpTarget::parse(&raw).map_err(|e| Error::InvalidArgument(e.to_string()))
	}

	/// Opens `viewer` on this session's display.
	pub async fn open_viewer(&self, viewer: &Viewer, opener: &dyn ViewerOpener) -> Result<ViewerWindow> {
		let target = self.rdp_target().await?;
		let resolution = target.resolution.map(|r| r.to_string());
		viewer.launch(opener, &target.address, resolution.as_deref())
	}

	async fn simple(&self, action: &str) -> Result<String> {
		self.action(action, Map::new()).await.map(message)
	}

	async fn action(&self, name: &str, data: Map<String, Value>) -> Result<Value> {
		self.ensure_open()?;
		tracing::debug!(session = %self.inner.id, action = name, "Session action");
		bounded(
			self.inner.options.request_timeout,
			name,
			self.inner
				.connection
				.call(name, Some(Value::Object(self.payload(data)))),
		)
		.await
	}

	fn payload(&self, mut data: Map<String, Value>) -> Map<String, Value> {
		data.insert("session_id".to_string(), self.inner.id.to_wire());
		data
	}

	fn ensure_open(&self) -> Result<()> {
		if self.is_closed() {
			return Err(Error::SessionNotFound(self.inner.id.to_string()));
		}
		Ok(())
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.inner.id)
			.field("state", &self.state())
			.field("closed", &self.is_closed())
			.finish()
	}
}

fn key_value(key: &str, value: &str) -> Map<String, Value> {
	let mut data = Map::new();
	data.insert("key".to_string(), Value::from(key));
	data.insert("value".to_string(), Value::from(value));
	data
}

/// First argument of a `succeed` reply as text.
fn message(reply: Value) -> String {
	match reply {
		Value::Array(mut args) if !args.is_empty() => match args.swap_remove(0) {
			Value::String(s) => s,
			Value::Null => String::new(),
			other => other.to_string(),
		},
		Value::String(s) => s,
		_ => String::new(),
	}
}

async fn pump_session_events(
	id: SessionId,
	mut events: mpsc::UnboundedReceiver<EventFrame>,
	shared: Arc<SessionShared>,
) {
	while let Some(frame) = events.recv().await {
		let event = SessionEvent::from_frame(frame);
		tracing::trace!(session = %id, ?event, "Session event");

		shared.snapshot.lock().apply(&event);
		if matches!(event, SessionEvent::StateVariables { .. }) {
			shared.lifecycle.send_if_modified(|state| {
				if *state == Lifecycle::Pending {
					*state = Lifecycle::Ready;
					true
				} else {
					false
				}
			});
		}

		handlers::emit(&shared.handlers, event, "session").await;
	}

	tracing::debug!(session = %id, "Session event stream ended");
	shared.lifecycle.send_replace(Lifecycle::Closed);
	handlers::emit(&shared.handlers, SessionEvent::Closed, "session").await;
}
