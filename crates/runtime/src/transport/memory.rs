use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;

use super::{Transport, TransportParts, TransportReceiver};
use crate::error::{Error, Result};

/// In-process transport pair.
///
/// The client side plugs into a [`Connection`](crate::Connection); the
/// [`MemoryPeer`] plays the daemon, reading the frames the client sends and
/// injecting frames of its own.
pub struct MemoryTransport;

impl MemoryTransport {
	pub fn pair() -> (TransportParts, MemoryPeer) {
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();

		let parts = TransportParts {
			sender: Box::new(MemoryTransportSender { tx: outbound_tx }),
			receiver: Box::new(MemoryTransportReceiver {
				inbound: inbound_rx,
				message_tx,
			}),
			message_rx,
		};

		let peer = MemoryPeer {
			received: outbound_rx,
			inbound: inbound_tx,
		};

		(parts, peer)
	}
}

pub struct MemoryTransportSender {
	tx: mpsc::UnboundedSender<Value>,
}

impl Transport for MemoryTransportSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		let result = self.tx.send(message).map_err(|_| Error::ChannelClosed);
		Box::pin(async move { result })
	}
}

pub struct MemoryTransportReceiver {
	inbound: mpsc::UnboundedReceiver<Value>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for MemoryTransportReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(message) = self.inbound.recv().await {
				if self.message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}

/// The far end of a [`MemoryTransport`].
pub struct MemoryPeer {
	received: mpsc::UnboundedReceiver<Value>,
	inbound: mpsc::UnboundedSender<Value>,
}

impl MemoryPeer {
	/// Next frame sent by the client, or `None` once the client is gone.
	pub async fn recv(&mut self) -> Option<Value> {
		self.received.recv().await
	}

	/// Frame already sent by the client, without waiting.
	pub fn try_recv(&mut self) -> Option<Value> {
		self.received.try_recv().ok()
	}

	/// Delivers a frame to the client. Returns false if the client is gone.
	pub fn send(&self, frame: Value) -> bool {
		self.inbound.send(frame).is_ok()
	}

	/// A clonable handle for injecting frames from other tasks.
	pub fn sender(&self) -> mpsc::UnboundedSender<Value> {
		self.inbound.clone()
	}
}
