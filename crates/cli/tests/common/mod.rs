//! Shared helpers: running the binary and a scripted daemon.

#![allow(dead_code)]

use std::net::TcpListener as StdListener;
use std::path::Path;
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

pub const VMCP: &str = "https://example.org/vm.vmcp";
/// The key the scripted daemon accepts as valid.
pub const AUTH_KEY: &str = "s3cret";

/// Runs `cvmweb` with a clean environment rooted at `config_home`.
pub fn run(config_home: &Path, args: &[&str]) -> (Value, String, Output) {
	run_with_env(config_home, args, &[])
}

pub fn run_with_env(config_home: &Path, args: &[&str], env: &[(&str, &str)]) -> (Value, String, Output) {
	let mut command = Command::new(env!("CARGO_BIN_EXE_cvmweb"));
	command
		.args(args)
		.env("XDG_CONFIG_HOME", config_home)
		.env("NO_COLOR", "1")
		.env_remove("CVMWEB_URL")
		.env_remove("CVMWEB_AUTH")
		.env_remove("RUST_LOG");
	for (key, value) in env {
		command.env(key, value);
	}

	let output = command.output().expect("failed to execute cvmweb");
	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	let parsed = serde_json::from_str::<Value>(&stdout).unwrap_or_else(|_| json!({ "raw": stdout }));
	(parsed, stderr, output)
}

/// A WebSocket URL nothing listens on.
pub fn refused_url() -> String {
	let listener = StdListener::bind("127.0.0.1:0").unwrap();
	let port = listener.local_addr().unwrap().port();
	drop(listener);
	format!("ws://127.0.0.1:{port}/")
}

/// Minimal daemon answering the handful of actions the CLI sends.
///
/// Runs on its own thread for the rest of the test process. Every frame it
/// receives is recorded.
pub struct FakeDaemon {
	port: u16,
	frames: Arc<Mutex<Vec<Value>>>,
}

impl FakeDaemon {
	pub fn start() -> Self {
		let (port_tx, port_rx) = std::sync::mpsc::channel();
		let frames = Arc::new(Mutex::new(Vec::new()));
		let log = Arc::clone(&frames);

		std::thread::spawn(move || {
			let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
			runtime.block_on(async move {
				let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
				port_tx.send(listener.local_addr().unwrap().port()).unwrap();
				while let Ok((stream, _)) = listener.accept().await {
					tokio::spawn(serve(stream, Arc::clone(&log)));
				}
			});
		});

		Self {
			port: port_rx.recv().unwrap(),
			frames,
		}
	}

	pub fn url(&self) -> String {
		format!("ws://127.0.0.1:{}/", self.port)
	}

	pub fn frames(&self) -> Vec<Value> {
		self.frames.lock().unwrap().clone()
	}

	pub fn names(&self) -> Vec<String> {
		self.frames()
			.iter()
			.map(|f| f["name"].as_str().unwrap_or_default().to_string())
			.collect()
	}
}

fn event(name: &str, id: &Value, data: Value) -> Value {
	json!({ "type": "event", "name": name, "id": id, "data": data })
}

async fn serve(stream: TcpStream, log: Arc<Mutex<Vec<Value>>>) {
	let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
		return;
	};

	while let Some(Ok(message)) = ws.next().await {
		let Message::Text(text) = message else { continue };
		let Ok(frame) = serde_json::from_str::<Value>(&text) else { continue };
		log.lock().unwrap().push(frame.clone());

		let id = frame["id"].clone();
		let replies = match frame["name"].as_str().unwrap_or_default() {
			"handshake" => vec![
				json!({ "type": "response", "id": id, "data": { "version": "2.0.4" } }),
				json!({ "type": "event", "name": "privileged", "data": [frame["data"]["auth"] == AUTH_KEY] }),
			],
			"enumSessions" => vec![json!({
				"type": "response",
				"id": id,
				"data": { "sessions": [{ "uuid": "6d5f", "config": { "name": "demo" } }] }
			})],
			"requestSession" => vec![
				event("started", &id, json!(["Preparing session"])),
				event("progress", &id, json!(["Downloading image", 50])),
				event("succeed", &id, json!(["Session open successfully", 7])),
			],
			"sync" => vec![event(
				"stateVariables",
				&json!("7"),
				json!({ "state": 2, "apiURL": "http://127.0.0.1:8080" }),
			)],
			"get" => vec![event("succeed", &id, json!(["5624"]))],
			"set" | "setProperty" => vec![event("succeed", &id, json!([1]))],
			"start" => vec![
				event("succeed", &id, json!(["Session started"])),
				event("stateChanged", &json!("7"), json!([5])),
			],
			"stopService" => {
				let _ = ws.close(None).await;
				return;
			}
			_ => vec![json!({ "type": "error", "id": id, "error": "Unknown action" })],
		};

		for reply in replies {
			if ws.send(Message::text(reply.to_string())).await.is_err() {
				return;
			}
		}
	}
}
