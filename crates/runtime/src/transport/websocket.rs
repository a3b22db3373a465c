use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Transport, TransportParts, TransportReceiver};
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport to the daemon.
pub struct WebSocketTransport {
	sender: WebSocketTransportSender,
	receiver: WebSocketTransportReceiver,
}

impl WebSocketTransport {
	/// Opens a WebSocket to `url`.
	///
	/// A refused or unreachable endpoint is reported as
	/// [`Error::ServiceUnavailable`], which callers treat as "not installed".
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<Value>)> {
		tracing::debug!(%url, "Opening websocket");
		let (stream, _response) = tokio_tungstenite::connect_async(url)
			.await
			.map_err(|e| classify_connect_error(url, e))?;

		let (sink, source) = stream.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();

		Ok((
			Self {
				sender: WebSocketTransportSender { sink },
				receiver: WebSocketTransportReceiver { source, message_tx },
			},
			message_rx,
		))
	}

	pub fn into_parts(self) -> (WebSocketTransportSender, WebSocketTransportReceiver) {
		(self.sender, self.receiver)
	}

	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		TransportParts {
			sender: Box::new(self.sender),
			receiver: Box::new(self.receiver),
			message_rx,
		}
	}
}

fn classify_connect_error(url: &str, err: tungstenite::Error) -> Error {
	match err {
		tungstenite::Error::Io(io)
			if matches!(
				io.kind(),
				ErrorKind::ConnectionRefused
					| ErrorKind::ConnectionReset
					| ErrorKind::ConnectionAborted
					| ErrorKind::NotConnected
					| ErrorKind::TimedOut
					| ErrorKind::AddrNotAvailable
			) =>
		{
			Error::ServiceUnavailable(url.to_string())
		}
		other => Error::ConnectionFailed(format!("{url}: {other}")),
	}
}

pub struct WebSocketTransportSender {
	sink: SplitSink<WsStream, Message>,
}

impl Transport for WebSocketTransportSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink
				.send(Message::Text(text))
				.await
				.map_err(|e| Error::TransportError(format!("Failed to send frame: {e}")))
		})
	}
}

pub struct WebSocketTransportReceiver {
	source: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for WebSocketTransportReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(message) = self.source.next().await {
				let payload = match message {
					Ok(Message::Text(text)) => serde_json::from_str::<Value>(&text),
					Ok(Message::Binary(bytes)) => serde_json::from_slice::<Value>(&bytes),
					Ok(Message::Close(frame)) => {
						tracing::debug!(?frame, "Daemon closed the websocket");
						break;
					}
					Ok(_) => continue,
					Err(e) => {
						return Err(Error::TransportError(format!("Failed to read frame: {e}")));
					}
				};

				match payload {
					Ok(value) => {
						if self.message_tx.send(value).is_err() {
							// Connection dropped its receiver; nothing left to deliver to.
							break;
						}
					}
					Err(e) => tracing::warn!("Discarding undecodable frame: {}", e),
				}
			}
			Ok(())
		})
	}
}
