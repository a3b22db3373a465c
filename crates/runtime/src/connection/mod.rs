//! Request/reply correlation and event routing over a transport.
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::send_action`] with an action name and payload
//! 2. Connection assigns the next request id and registers a reply channel
//! 3. The action frame is queued for the writer task
//! 4. The dispatch loop decodes incoming frames:
//!    - `response` / `error` frames and callback-role events (`succeed`,
//!      `failed`, `progress`, `started`, `completed`) go to the pending
//!      request with the same id; terminal ones retire it
//!    - other events whose id matches a registered session route go to that
//!      session
//!    - events without an id are broadcast as connection-level events
//! 5. The caller drains the [`PendingRequest`] until its terminal reply
//!
//! When the transport closes, every pending request and every route is
//! dropped, so waiters observe [`Error::ChannelClosed`] instead of hanging.

mod registry;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::task::{Context, Poll};

use cvmweb_protocol::{CallbackRole, ErrorCode, EventFrame, Frame, SessionId};
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{Notify, broadcast, mpsc};

use self::registry::{PendingTable, RouteTable};
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Capacity of the connection-level event broadcast.
const EVENT_CAPACITY: usize = 64;

/// One frame addressed to a pending request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
	/// Plain `response` frame.
	Response(Value),
	/// Callback-role event (`succeed`, `failed`, `progress`, ...).
	Callback { role: CallbackRole, event: EventFrame },
	/// `error` frame.
	Rejected(String),
}

impl Reply {
	pub fn is_terminal(&self) -> bool {
		match self {
			Reply::Response(_) | Reply::Rejected(_) => true,
			Reply::Callback { role, .. } => role.is_terminal(),
		}
	}

	/// Converts a terminal reply into the request outcome.
	///
	/// `succeed` yields its argument array, `response` its data. Progress
	/// replies are not outcomes and yield a protocol error.
	pub fn into_result(self) -> Result<Value> {
		match self {
			Reply::Response(data) => Ok(data),
			Reply::Rejected(message) => Err(Error::Rejected(message)),
			Reply::Callback {
				role: CallbackRole::Succeed,
				event,
			} => Ok(event.data),
			Reply::Callback {
				role: CallbackRole::Failed,
				event,
			} => Err(parse_failure(&event)),
			Reply::Callback { role, .. } => Err(Error::ProtocolError(format!(
				"'{role}' is not a terminal reply"
			))),
		}
	}
}

/// Converts a `failed` event (`[message, code]`) into [`Error::Remote`].
fn parse_failure(event: &EventFrame) -> Error {
	Error::Remote {
		message: event
			.arg_string(0)
			.unwrap_or_else(|| "Unknown error".to_string()),
		code: ErrorCode::from_code(event.arg_i64(1).unwrap_or(-1)),
	}
}

/// RAII guard removing the pending entry when a request is abandoned.
struct CancelGuard {
	id: Arc<str>,
	pending: Arc<PendingTable>,
	completed: bool,
}

impl CancelGuard {
	fn new(id: Arc<str>, pending: Arc<PendingTable>) -> Self {
		Self {
			id,
			pending,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if !self.completed && self.pending.remove(&self.id) {
			tracing::debug!(id = %self.id, "CancelGuard: removed abandoned request");
		}
	}
}

/// Reply stream of one request.
///
/// Yields progress replies as they arrive and ends after the terminal one.
/// Dropping it early unregisters the request.
pub struct PendingRequest {
	id: Arc<str>,
	rx: mpsc::UnboundedReceiver<Reply>,
	guard: CancelGuard,
	finished: bool,
}

impl PendingRequest {
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Next reply; `Ok(None)` once the terminal reply has been returned.
	pub async fn next(&mut self) -> Result<Option<Reply>> {
		if self.finished {
			return Ok(None);
		}
		match self.rx.recv().await {
			Some(reply) => {
				if reply.is_terminal() {
					self.finished = true;
					self.guard.complete();
				}
				Ok(Some(reply))
			}
			None => {
				self.finished = true;
				Err(Error::ChannelClosed)
			}
		}
	}

	/// Skips progress replies and resolves to the outcome.
	pub async fn outcome(self) -> Result<Value> {
		self.await
	}
}

impl Future for PendingRequest {
	type Output = Result<Value>;

	/// Polling the request directly behaves like [`PendingRequest::outcome`].
	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		loop {
			if self.finished {
				return Poll::Ready(Err(Error::ChannelClosed));
			}
			match Pin::new(&mut self.rx).poll_recv(cx) {
				Poll::Ready(Some(reply)) if reply.is_terminal() => {
					self.finished = true;
					self.guard.complete();
					return Poll::Ready(reply.into_result());
				}
				Poll::Ready(Some(reply)) => {
					tracing::trace!(id = %self.id, ?reply, "Ignoring progress reply");
				}
				Poll::Ready(None) => {
					self.finished = true;
					return Poll::Ready(Err(Error::ChannelClosed));
				}
				Poll::Pending => return Poll::Pending,
			}
		}
	}
}

/// Connection to the CernVM WebAPI daemon.
///
/// Owns the pending-request table and the session route table (the
/// "response callback registry"). Call [`Connection::run`] on a spawned task
/// to start moving frames.
pub struct Connection {
	/// Sequential request id counter
	last_id: AtomicU32,
	/// Pending requests keyed by request id
	pending: Arc<PendingTable>,
	/// Session event routes keyed by session id
	routes: RouteTable,
	/// Connection-level events (no id)
	events: broadcast::Sender<EventFrame>,
	/// Channel for sending outbound frames to the writer task
	outbound_tx: mpsc::UnboundedSender<Value>,
	/// Transport sender (taken by run() to start writer task)
	transport_sender: TokioMutex<Option<Box<dyn Transport>>>,
	/// Receiver half of transport (owned by run loop, only needed once)
	transport_receiver: TokioMutex<Option<Box<dyn TransportReceiver>>>,
	/// Receiver for incoming frames from transport
	message_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	/// Receiver for outbound frames (taken by run() to start writer task)
	outbound_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	closed: AtomicBool,
	closed_notify: Notify,
	/// Wakes the run loop when the client hangs up first
	close_requested: Notify,
}

impl Connection {
	/// Create a new Connection with the given transport
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (events, _) = broadcast::channel(EVENT_CAPACITY);

		Self {
			last_id: AtomicU32::new(0),
			pending: Arc::new(PendingTable::default()),
			routes: RouteTable::default(),
			events,
			outbound_tx,
			transport_sender: TokioMutex::new(Some(sender)),
			transport_receiver: TokioMutex::new(Some(receiver)),
			message_rx: TokioMutex::new(Some(message_rx)),
			outbound_rx: TokioMutex::new(Some(outbound_rx)),
			closed: AtomicBool::new(false),
			closed_notify: Notify::new(),
			close_requested: Notify::new(),
		}
	}

	fn next_id(&self) -> Arc<str> {
		Arc::from(self.last_id.fetch_add(1, Ordering::SeqCst).to_string())
	}

	fn queue(&self, frame: &Frame) -> Result<()> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}
		let value = serde_json::to_value(frame)?;
		tracing::debug!("Frame JSON: {}", value);
		self.outbound_tx.send(value).map_err(|_| {
			tracing::error!("Failed to queue frame: outbound channel closed");
			Error::ChannelClosed
		})
	}

	/// Sends an action and returns its reply stream.
	pub fn send_action(&self, name: &str, data: Option<Value>) -> Result<PendingRequest> {
		let id = self.next_id();
		tracing::debug!(id = %id, action = name, "Sending action");

		let (tx, rx) = mpsc::unbounded_channel();
		self.pending.insert(Arc::clone(&id), tx);
		let guard = CancelGuard::new(Arc::clone(&id), Arc::clone(&self.pending));

		self.queue(&Frame::action(name, id.as_ref(), data))?;

		Ok(PendingRequest {
			id,
			rx,
			guard,
			finished: false,
		})
	}

	/// Sends an action and awaits its outcome.
	pub async fn call(&self, name: &str, data: Option<Value>) -> Result<Value> {
		self.send_action(name, data)?.outcome().await
	}

	/// Sends an action without registering for replies.
	///
	/// Anything the daemon sends back for this id is ignored.
	pub fn notify(&self, name: &str, data: Option<Value>) -> Result<()> {
		let id = self.next_id();
		tracing::debug!(id = %id, action = name, "Sending notification");
		self.queue(&Frame::action(name, id.as_ref(), data))
	}

	/// Registers the event route for a session.
	pub fn register_route(&self, id: SessionId) -> mpsc::UnboundedReceiver<EventFrame> {
		tracing::debug!(session = %id, "Registering event route");
		self.routes.insert(id)
	}

	/// Removes a session's event route, ending its event stream.
	pub fn unregister_route(&self, id: &str) -> bool {
		let removed = self.routes.remove(id);
		if removed {
			tracing::debug!(session = %id, "Removed event route");
		}
		removed
	}

	pub fn has_route(&self, id: &str) -> bool {
		self.routes.contains(id)
	}

	pub fn route_ids(&self) -> Vec<SessionId> {
		self.routes.ids()
	}

	pub fn route_count(&self) -> usize {
		self.routes.len()
	}

	pub fn pending_count(&self) -> usize {
		self.pending.len()
	}

	/// Subscribes to connection-level events (`privileged`, `interact`, ...).
	pub fn subscribe(&self) -> broadcast::Receiver<EventFrame> {
		self.events.subscribe()
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Resolves once the transport has closed.
	pub async fn closed(&self) {
		loop {
			let notified = self.closed_notify.notified();
			if self.is_closed() {
				return;
			}
			notified.await;
		}
	}

	/// Drops the transport, ending [`Connection::run`].
	///
	/// Pending requests fail and routes are dropped as if the daemon had
	/// hung up. Works before `run` has started too.
	pub fn close(&self) {
		tracing::debug!("Closing connection");
		self.close_requested.notify_one();
	}

	/// Run the frame dispatch loop until the transport closes.
	pub async fn run(self: &Arc<Self>) {
		let parts = (
			self.transport_receiver.lock().await.take(),
			self.transport_sender.lock().await.take(),
			self.outbound_rx.lock().await.take(),
			self.message_rx.lock().await.take(),
		);
		let (Some(transport_receiver), Some(mut transport_sender), Some(mut outbound_rx), Some(mut message_rx)) =
			parts
		else {
			tracing::error!("Connection::run called more than once");
			return;
		};

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = transport_receiver.run().await {
				tracing::error!("Transport read error: {}", e);
			}
		});

		let writer_handle = tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if let Err(e) = transport_sender.send(message).await {
					tracing::error!("Transport write error: {}", e);
					break;
				}
			}
		});

		loop {
			let value = tokio::select! {
				received = message_rx.recv() => match received {
					Some(value) => value,
					None => break,
				},
				_ = self.close_requested.notified() => {
					reader_handle.abort();
					break;
				}
			};
			match serde_json::from_value::<Frame>(value) {
				Ok(frame) => self.dispatch(frame),
				Err(e) => tracing::error!("Failed to parse frame: {}", e),
			}
		}

		let _ = reader_handle.await;
		self.shutdown();
		writer_handle.abort();
	}

	fn shutdown(&self) {
		tracing::info!(
			pending = self.pending.len(),
			routes = self.routes.len(),
			"Connection closed"
		);
		self.closed.store(true, Ordering::SeqCst);
		self.pending.clear();
		self.routes.clear();
		self.closed_notify.notify_waiters();
	}

	pub(crate) fn dispatch(&self, frame: Frame) {
		tracing::debug!("Dispatching frame: {:?}", frame);
		match frame {
			Frame::Response(response) => {
				if !self.pending.deliver(&response.id, Reply::Response(response.data)) {
					tracing::debug!(id = %response.id, "Response for unknown request (ignored)");
				}
			}
			Frame::Error(error) => match error.id {
				Some(id) => {
					if !self.pending.deliver(&id, Reply::Rejected(error.error)) {
						tracing::warn!(id = %id, "Daemon error for unknown request");
					}
				}
				None => tracing::warn!("Daemon error: {}", error.error),
			},
			Frame::Event(event) => self.dispatch_event(event),
			Frame::Action(action) => {
				tracing::debug!(action = %action.name, "Unexpected action from daemon (ignored)");
			}
			Frame::Unknown => tracing::debug!("Unknown frame type (forward-compatible, ignored)"),
		}
	}

	fn dispatch_event(&self, event: EventFrame) {
		let Some(id) = event.id.clone() else {
			// No receivers is fine: nobody cares about connection events yet.
			let _ = self.events.send(event);
			return;
		};

		// Session events never use callback-role names, so a role name with a
		// pending id always belongs to the request.
		if let Some(role) = CallbackRole::from_name(&event.name) {
			if self.pending.contains(&id) {
				self.pending.deliver(&id, Reply::Callback { role, event });
				return;
			}
		}

		if !self.routes.forward(&id, event) {
			tracing::debug!(id = %id, "Event for unknown id (ignored)");
		}
	}
}
