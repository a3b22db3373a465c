use std::sync::Arc;

use async_trait::async_trait;
use cvmweb_runtime::{Connection, Result, WebSocketTransport};

use crate::config::ClientConfig;
use crate::plugin::{PluginOptions, WebApiPlugin};

/// Produces a ready plugin, or fails if the daemon cannot be reached.
///
/// Each call is one connection attempt; the bootstrapper decides when to
/// retry.
#[async_trait]
pub trait Connector: Send + Sync {
	async fn connect(&self) -> Result<Arc<WebApiPlugin>>;
}

/// Connects to the daemon over its WebSocket endpoint and shakes hands.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
	url: String,
	auth: Option<String>,
	options: PluginOptions,
}

impl WebSocketConnector {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			auth: None,
			options: PluginOptions::default(),
		}
	}

	pub fn from_config(config: &ClientConfig) -> Self {
		Self {
			url: config.daemon_url.clone(),
			auth: config.auth_key.clone(),
			options: config.plugin_options(),
		}
	}

	pub fn with_auth(mut self, key: impl Into<String>) -> Self {
		self.auth = Some(key.into());
		self
	}

	pub fn with_options(mut self, options: PluginOptions) -> Self {
		self.options = options;
		self
	}

	pub fn url(&self) -> &str {
		&self.url
	}
}

#[async_trait]
impl Connector for WebSocketConnector {
	async fn connect(&self) -> Result<Arc<WebApiPlugin>> {
		tracing::debug!(url = %self.url, "Connecting to daemon");
		let (transport, message_rx) = WebSocketTransport::connect(&self.url).await?;
		let connection = Arc::new(Connection::new(transport.into_transport_parts(message_rx)));

		let conn_for_loop = Arc::clone(&connection);
		tokio::spawn(async move {
			conn_for_loop.run().await;
		});

		let plugin = WebApiPlugin::new(connection, self.options);
		if let Err(err) = plugin.handshake(self.auth.as_deref()).await {
			tracing::debug!(url = %self.url, "Handshake failed, dropping connection: {}", err);
			plugin.connection().close();
			return Err(err);
		}
		Ok(plugin)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use cvmweb_runtime::Error;
	use futures_util::{SinkExt, StreamExt};
	use serde_json::{Value, json};
	use tokio::net::TcpListener;
	use tokio::sync::oneshot;
	use tokio_tungstenite::tungstenite::Message;

	use super::*;

	#[tokio::test]
	async fn rejected_handshake_hangs_up() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let url = format!("ws://{}/", listener.local_addr().unwrap());
		let (hung_up_tx, hung_up_rx) = oneshot::channel();

		tokio::spawn(async move {
			let (stream, _) = listener.accept().await.unwrap();
			let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

			let Some(Ok(Message::Text(text))) = ws.next().await else {
				panic!("expected a handshake frame");
			};
			let frame: Value = serde_json::from_str(&text).unwrap();
			assert_eq!(frame["name"], "handshake");
			let reply = json!({ "type": "error", "id": frame["id"], "error": "Access denied" });
			ws.send(Message::text(reply.to_string())).await.unwrap();

			loop {
				match ws.next().await {
					Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
					Some(Ok(_)) => continue,
				}
			}
			let _ = hung_up_tx.send(());
		});

		let err = WebSocketConnector::new(url).connect().await.unwrap_err();
		assert!(matches!(err, Error::Rejected(_)), "unexpected error: {err}");

		tokio::time::timeout(Duration::from_secs(5), hung_up_rx)
			.await
			.expect("socket still open after failed handshake")
			.unwrap();
	}
}
