//! Bidirectional message transports.
//!
//! A transport is split into a sending half ([`Transport`]) and a receiving
//! half ([`TransportReceiver`]). The receiver's `run` loop decodes incoming
//! frames and pushes them onto an unbounded channel that the
//! [`Connection`](crate::Connection) drains.
//!
//! Two implementations are provided:
//! - [`WebSocketTransport`]: the daemon's native WebSocket endpoint
//! - [`MemoryTransport`]: an in-process pair, used to embed a daemon stand-in

mod memory;
mod websocket;


use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

pub use memory::{MemoryPeer, MemoryTransport, MemoryTransportReceiver, MemoryTransportSender};
pub use websocket::{WebSocketTransport, WebSocketTransportReceiver, WebSocketTransportSender};

/// Sending half of a transport.
pub trait Transport: Send {
	/// Serializes and sends one frame.
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Receiving half of a transport.
pub trait TransportReceiver: Send {
	/// Reads frames until the peer closes. Returns an error on a broken stream.
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Everything a [`Connection`](crate::Connection) needs from a transport.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}
