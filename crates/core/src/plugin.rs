//! The WebAPI plugin facade.
//!
//! [`WebApiPlugin`] wraps a [`Connection`] and exposes the daemon's
//! connection-level operations. Session-level operations live on the
//! [`Session`] handles it returns.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cvmweb_protocol::{
	CallbackRole, EventFrame, Interaction, InteractionResult, SessionId, SessionSummary,
};
use cvmweb_runtime::{Connection, Error, Reply, Result};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::DEFAULT_SESSION_INIT_TIMEOUT_MS;
use crate::events::PluginEvent;
use crate::handlers::{self, HandlerMap, Subscription};
use crate::session::Session;

/// Timeouts applied by the plugin and its sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginOptions {
	/// How long `request_session` waits for the new session's first
	/// `stateVariables` event.
	pub session_init_timeout: Duration,
	/// Upper bound on single requests; `None` waits forever.
	pub request_timeout: Option<Duration>,
}

impl Default for PluginOptions {
	fn default() -> Self {
		Self {
			session_init_timeout: Duration::from_millis(DEFAULT_SESSION_INIT_TIMEOUT_MS),
			request_timeout: None,
		}
	}
}

/// How long `handshake` waits for the `privileged` event that follows the
/// daemon's reply.
pub const PRIVILEGE_WAIT: Duration = Duration::from_secs(2);

/// Awaits `fut`, failing with [`Error::Timeout`] after `timeout` if one is set.
pub(crate) async fn bounded<T>(
	timeout: Option<Duration>,
	what: &str,
	fut: impl Future<Output = Result<T>>,
) -> Result<T> {
	match timeout {
		Some(limit) => tokio::time::timeout(limit, fut)
			.await
			.map_err(|_| Error::Timeout(format!("{what} timed out after {}ms", limit.as_millis())))?,
		None => fut.await,
	}
}

/// Client-side handle on the CernVM WebAPI daemon.
pub struct WebApiPlugin {
	connection: Arc<Connection>,
	options: PluginOptions,
	handlers: HandlerMap<PluginEvent>,
	privileged: Arc<AtomicBool>,
	version: Mutex<Option<String>>,
	event_task: Mutex<Option<JoinHandle<()>>>,
}

impl WebApiPlugin {
	/// Wraps a running connection.
	///
	/// The caller is responsible for spawning [`Connection::run`].
	pub fn new(connection: Arc<Connection>, options: PluginOptions) -> Arc<Self> {
		let plugin = Arc::new(Self {
			connection,
			options,
			handlers: handlers::new_handler_map(),
			privileged: Arc::new(AtomicBool::new(false)),
			version: Mutex::new(None),
			event_task: Mutex::new(None),
		});

		let task = tokio::spawn(pump_connection_events(
			Arc::clone(&plugin.connection),
			plugin.connection.subscribe(),
			Arc::clone(&plugin.handlers),
			Arc::clone(&plugin.privileged),
		));
		*plugin.event_task.lock() = Some(task);

		plugin
	}

	pub fn connection(&self) -> &Arc<Connection> {
		&self.connection
	}

	pub fn options(&self) -> PluginOptions {
		self.options
	}

	/// Returns true while the daemon connection is open.
	pub fn is_connected(&self) -> bool {
		!self.connection.is_closed()
	}

	/// Returns true once the daemon has granted privileged access.
	pub fn is_privileged(&self) -> bool {
		self.privileged.load(Ordering::SeqCst)
	}

	/// Daemon version reported by the last handshake.
	pub fn version(&self) -> Option<String> {
		self.version.lock().clone()
	}

	/// Introduces the client to the daemon and returns its version.
	///
	/// The daemon answers with its version and then announces the privilege
	/// level; both are recorded before this returns.
	pub async fn handshake(&self, auth: Option<&str>) -> Result<String> {
		let data = match auth {
			Some(key) => json!({ "auth": key }),
			None => json!({}),
		};
		// Subscribed before sending so the `privileged` event cannot slip past.
		let mut events = self.connection.subscribe();
		let reply = bounded(
			self.options.request_timeout,
			"handshake",
			self.connection.call("handshake", Some(data)),
		)
		.await?;

		let version = reply
			.get("version")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();
		*self.version.lock() = Some(version.clone());

		let announcement = async {
			tokio::select! {
				biased;
				granted = privilege_announcement(&mut events) => granted,
				_ = self.connection.closed() => None,
			}
		};
		match tokio::time::timeout(PRIVILEGE_WAIT, announcement).await {
			Ok(Some(granted)) => self.privileged.store(granted, Ordering::SeqCst),
			Ok(None) => return Err(Error::ChannelClosed),
			Err(_) => tracing::warn!("Daemon did not announce a privilege level"),
		}

		tracing::info!(version = %version, privileged = self.is_privileged(), "Connected to CernVM WebAPI daemon");
		Ok(version)
	}

	/// Asks the daemon to shut down.
	///
	/// Nothing is registered for a reply; the only possible error is a
	/// connection that is already closed.
	pub fn stop_service(&self) -> Result<()> {
		tracing::info!("Requesting daemon shutdown");
		self.connection.notify("stopService", None)
	}

	/// Opens (or reopens) the session described by `vmcp`.
	///
	/// Progress feedback is emitted as [`PluginEvent`]s while the daemon
	/// works. Resolves once the session has reported its initial state.
	pub async fn request_session(&self, vmcp: &str) -> Result<Session> {
		if vmcp.trim().is_empty() {
			return Err(Error::InvalidArgument("vmcp URL is empty".to_string()));
		}

		let mut request = self
			.connection
			.send_action("requestSession", Some(json!({ "vmcp": vmcp })))?;

		let session_id = loop {
			let reply = match request.next().await? {
				Some(reply) => reply,
				None => return Err(Error::ChannelClosed),
			};

			match reply {
				Reply::Callback {
					role: CallbackRole::Progress,
					event,
				} => {
					let message = event.arg_string(0).unwrap_or_default();
					let percent = event.arg_f64(1).unwrap_or(0.0);
					self.emit(PluginEvent::Progress { message, percent }).await;
				}
				Reply::Callback {
					role: CallbackRole::Started,
					event,
				} => {
					let message = event.arg_string(0).unwrap_or_default();
					self.emit(PluginEvent::Started { message }).await;
				}
				Reply::Callback {
					role: CallbackRole::Completed,
					event,
				} => {
					let message = event.arg_string(0).unwrap_or_default();
					self.emit(PluginEvent::Completed { message }).await;
				}
				Reply::Callback {
					role: CallbackRole::Succeed,
					event,
				} => break session_id_from_succeed(&event)?,
				Reply::Response(data) => {
					break data
						.get("session_id")
						.and_then(SessionId::from_value)
						.ok_or_else(|| {
							Error::ProtocolError("requestSession reply has no session id".to_string())
						})?;
				}
				failure => {
					let err = match failure.into_result() {
						Err(err) => err,
						Ok(_) => Error::ProtocolError("unexpected requestSession reply".to_string()),
					};
					tracing::error!(vmcp, "Failed to request session: {}", err);
					return Err(err);
				}
			}
		};

		tracing::info!(session = %session_id, "Session granted, waiting for initial state");
		let events = self.connection.register_route(session_id.clone());
		let session = Session::new(Arc::clone(&self.connection), session_id, events, self.options);

		// State sent between `succeed` and the route registration is lost;
		// a sync makes the daemon send it again.
		session.sync()?;

		if let Err(err) = session.initialized(self.options.session_init_timeout).await {
			tracing::warn!(session = %session.id(), "Session did not initialize: {}", err);
			self.connection.unregister_route(session.id().as_str());
			return Err(err);
		}

		Ok(session)
	}

	/// Asks every open session to resend its state.
	///
	/// Fire-and-forget: replies are not awaited.
	pub fn sync_sessions(&self) -> Result<()> {
		let ids = self.connection.route_ids();
		tracing::debug!(sessions = ids.len(), "Synchronizing sessions");
		for id in ids {
			self.connection
				.notify("sync", Some(json!({ "session_id": id.to_wire() })))?;
		}
		Ok(())
	}

	/// Lists every session the daemon knows about. Requires privileged access.
	pub async fn enum_sessions(&self) -> Result<Vec<SessionSummary>> {
		let reply = bounded(
			self.options.request_timeout,
			"enumSessions",
			self.connection.call("enumSessions", None),
		)
		.await?;

		let sessions = reply.get("sessions").cloned().unwrap_or(Value::Array(Vec::new()));
		Ok(serde_json::from_value(sessions)?)
	}

	/// Answers the daemon's pending [`Interaction`].
	pub fn reply_interaction(&self, result: InteractionResult) -> Result<()> {
		tracing::debug!(?result, "Answering interaction");
		self.connection
			.notify("interactionCallback", Some(json!({ "result": result.code() })))
	}

	/// Registers a handler for plugin events.
	///
	/// Returns a [`Subscription`] that unregisters the handler when dropped.
	pub fn on_event<F, Fut>(&self, handler: F) -> Subscription
	where
		F: Fn(PluginEvent) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		handlers::register(&self.handlers, handler)
	}

	/// Resolves once the daemon connection has closed.
	pub async fn closed(&self) {
		self.connection.closed().await;
	}

	async fn emit(&self, event: PluginEvent) {
		handlers::emit(&self.handlers, event, "plugin").await;
	}
}

impl Drop for WebApiPlugin {
	fn drop(&mut self) {
		if let Some(task) = self.event_task.lock().take() {
			task.abort();
		}
	}
}

impl std::fmt::Debug for WebApiPlugin {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WebApiPlugin")
			.field("version", &*self.version.lock())
			.field("privileged", &self.is_privileged())
			.field("sessions", &self.connection.route_count())
			.finish()
	}
}

/// `succeed` of `requestSession` carries `[message, session_id]`.
fn session_id_from_succeed(event: &EventFrame) -> Result<SessionId> {
	event
		.args()
		.get(1)
		.and_then(SessionId::from_value)
		.ok_or_else(|| Error::ProtocolError(format!("requestSession succeeded without a session id: {}", event.data)))
}

/// Next `privileged` announcement on `events`, or `None` once the
/// connection is gone.
async fn privilege_announcement(events: &mut broadcast::Receiver<EventFrame>) -> Option<bool> {
	loop {
		match events.recv().await {
			Ok(frame) if frame.name == "privileged" => return Some(frame.arg_bool(0).unwrap_or(false)),
			Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
			Err(broadcast::error::RecvError::Closed) => return None,
		}
	}
}

async fn pump_connection_events(
	connection: Arc<Connection>,
	mut events: broadcast::Receiver<EventFrame>,
	handlers: HandlerMap<PluginEvent>,
	privileged: Arc<AtomicBool>,
) {
	loop {
		let frame = tokio::select! {
			received = events.recv() => match received {
				Ok(frame) => frame,
				Err(broadcast::error::RecvError::Lagged(n)) => {
					tracing::warn!(dropped = n, "Plugin event receiver lagged");
					continue;
				}
				Err(broadcast::error::RecvError::Closed) => break,
			},
			_ = connection.closed() => break,
		};

		let event = match frame.name.as_str() {
			"privileged" => {
				let granted = frame.arg_bool(0).unwrap_or(false);
				privileged.store(granted, Ordering::SeqCst);
				tracing::info!(privileged = granted, "Privilege level changed");
				PluginEvent::Privileged { privileged: granted }
			}
			"interact" => match Interaction::from_event(&frame) {
				Some(interaction) => PluginEvent::Interact { interaction },
				None => {
					tracing::warn!(data = %frame.data, "Malformed interact event");
					continue;
				}
			},
			other => {
				tracing::debug!(event = other, "Unhandled connection event");
				continue;
			}
		};

		handlers::emit(&handlers, event, "plugin").await;
	}

	handlers::emit(&handlers, PluginEvent::Disconnected, "plugin").await;
}
