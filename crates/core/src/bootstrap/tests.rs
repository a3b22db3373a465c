use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cvmweb_protocol::{ErrorCode, SessionId};
use cvmweb_runtime::{Connection, Error, MemoryPeer, MemoryTransport, Result};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::*;
use crate::plugin::{PluginOptions, WebApiPlugin};

/// Fails `failures` times with `error`, then hands out in-memory plugins.
struct ScriptedConnector {
	failures: u32,
	error: fn() -> Error,
	attempts: AtomicU32,
	attempt_times: Mutex<Vec<Instant>>,
	peers: Mutex<Vec<MemoryPeer>>,
}

impl ScriptedConnector {
	fn new(failures: u32) -> Arc<Self> {
		Self::failing_with(failures, || Error::ServiceUnavailable("ws://127.0.0.1:5624/".to_string()))
	}

	fn failing_with(failures: u32, error: fn() -> Error) -> Arc<Self> {
		Arc::new(Self {
			failures,
			error,
			attempts: AtomicU32::new(0),
			attempt_times: Mutex::new(Vec::new()),
			peers: Mutex::new(Vec::new()),
		})
	}

	fn attempts(&self) -> u32 {
		self.attempts.load(Ordering::SeqCst)
	}

	fn take_peer(&self) -> MemoryPeer {
		self.peers.lock().pop().unwrap()
	}
}

#[async_trait]
impl Connector for ScriptedConnector {
	async fn connect(&self) -> Result<Arc<WebApiPlugin>> {
		let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
		self.attempt_times.lock().push(Instant::now());
		if attempt <= self.failures {
			return Err((self.error)());
		}

		let (parts, peer) = MemoryTransport::pair();
		self.peers.lock().push(peer);
		let connection = Arc::new(Connection::new(parts));
		let conn_for_loop = Arc::clone(&connection);
		tokio::spawn(async move { conn_for_loop.run().await });
		Ok(WebApiPlugin::new(connection, PluginOptions::default()))
	}
}

#[derive(Default)]
struct RecordingPrompt {
	log: Arc<Mutex<Vec<String>>>,
}

impl InstallPrompt for RecordingPrompt {
	fn show(&self, install_url: &str) {
		self.log.lock().push(format!("show {install_url}"));
	}

	fn hide(&self) {
		self.log.lock().push("hide".to_string());
	}
}

fn bootstrapper(connector: Arc<ScriptedConnector>, prompt: Arc<RecordingPrompt>) -> Bootstrapper {
	Bootstrapper::new(connector)
		.with_install_prompt(prompt)
		.with_page(Arc::new(PageState::loaded()))
}

fn start_with_channel(
	bootstrapper: &Bootstrapper,
) -> (StartHandle, oneshot::Receiver<std::result::Result<Arc<WebApiPlugin>, Error>>) {
	let (tx, rx) = oneshot::channel();
	let ok_tx = Arc::new(Mutex::new(Some(tx)));
	let err_tx = Arc::clone(&ok_tx);
	let handle = bootstrapper.start_cvm_webapi(
		Box::new(move |plugin| {
			if let Some(tx) = ok_tx.lock().take() {
				let _ = tx.send(Ok(plugin));
			}
		}),
		Some(Box::new(move |err| {
			if let Some(tx) = err_tx.lock().take() {
				let _ = tx.send(Err(err));
			}
		})),
	);
	(handle, rx)
}

#[tokio::test(start_paused = true)]
async fn test_connects_immediately_when_daemon_present() {
	let connector = ScriptedConnector::new(0);
	let prompt = Arc::new(RecordingPrompt::default());
	let boot = bootstrapper(Arc::clone(&connector), Arc::clone(&prompt));

	let plugin = boot.start().await.unwrap();

	assert!(plugin.is_connected());
	assert_eq!(connector.attempts(), 1);
	assert!(prompt.log.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_polls_at_fixed_interval_until_available() {
	let connector = ScriptedConnector::new(4);
	let prompt = Arc::new(RecordingPrompt::default());
	let boot = bootstrapper(Arc::clone(&connector), Arc::clone(&prompt));

	let plugin = boot.start().await.unwrap();
	assert!(plugin.is_connected());

	assert_eq!(connector.attempts(), 5);
	let times = connector.attempt_times.lock().clone();
	for pair in times.windows(2) {
		assert_eq!(pair[1] - pair[0], Duration::from_millis(1000));
	}
	assert_eq!(
		*prompt.log.lock(),
		vec![
			"show http://cernvm.cern.ch/releases/webapi/install".to_string(),
			"hide".to_string()
		]
	);
}

#[tokio::test(start_paused = true)]
async fn test_prompt_hidden_before_ready() {
	let connector = ScriptedConnector::new(1);
	let prompt = Arc::new(RecordingPrompt::default());
	let log = Arc::clone(&prompt.log);
	let boot = bootstrapper(connector, prompt).with_install_url("http://localhost/install");

	let (tx, rx) = oneshot::channel();
	let ready_log = Arc::clone(&log);
	boot.start_cvm_webapi(
		Box::new(move |_plugin| {
			ready_log.lock().push("ready".to_string());
			let _ = tx.send(());
		}),
		None,
	);
	rx.await.unwrap();

	assert_eq!(*log.lock(), vec!["show http://localhost/install", "hide", "ready"]);
}

#[tokio::test(start_paused = true)]
async fn test_start_waits_for_page_load() {
	let connector = ScriptedConnector::new(0);
	let page = Arc::new(PageState::new());
	let boot = Bootstrapper::new(Arc::clone(&connector) as Arc<dyn Connector>).with_page(Arc::clone(&page));

	let (handle, rx) = start_with_channel(&boot);

	tokio::time::sleep(Duration::from_secs(5)).await;
	assert!(!handle.is_started());
	assert_eq!(connector.attempts(), 0);
	assert_eq!(page.pending(), 1);

	assert_eq!(boot.mark_loaded(), 1);
	assert!(handle.is_started());

	let plugin = rx.await.unwrap().unwrap();
	assert!(plugin.is_connected());
	assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_start_after_load_runs_synchronously() {
	let connector = ScriptedConnector::new(0);
	let boot = bootstrapper(connector, Arc::new(RecordingPrompt::default()));

	let (handle, rx) = start_with_channel(&boot);
	assert!(handle.is_started());
	assert!(rx.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_bounded_policy_reports_failure() {
	let connector = ScriptedConnector::new(u32::MAX);
	let prompt = Arc::new(RecordingPrompt::default());
	let boot = bootstrapper(Arc::clone(&connector), Arc::clone(&prompt))
		.with_retry_policy(RetryPolicy::fixed(Duration::from_millis(250)).with_max_attempts(3));

	let err = boot.start().await.unwrap_err();

	assert!(err.is_unavailable(), "unexpected error: {err:?}");
	assert_eq!(connector.attempts(), 3);
	assert_eq!(
		*prompt.log.lock(),
		vec!["show http://cernvm.cern.ch/releases/webapi/install".to_string()]
	);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_polling() {
	let connector = ScriptedConnector::new(u32::MAX);
	let prompt = Arc::new(RecordingPrompt::default());
	let boot = bootstrapper(Arc::clone(&connector), Arc::clone(&prompt));

	let (handle, rx) = start_with_channel(&boot);
	tokio::time::sleep(Duration::from_millis(2500)).await;
	handle.cancel();

	let err = rx.await.unwrap().unwrap_err();
	assert!(matches!(err, Error::Cancelled(_)));
	assert!(!prompt.log.lock().iter().any(|entry| entry == "hide"));

	let attempts = connector.attempts();
	assert_eq!(attempts, 3);
	tokio::time::sleep(Duration::from_secs(10)).await;
	assert_eq!(connector.attempts(), attempts);
}

#[tokio::test(start_paused = true)]
async fn test_refusal_is_not_retried() {
	let connector = ScriptedConnector::failing_with(1, || Error::Remote {
		message: "Invalid authentication key".to_string(),
		code: ErrorCode::AccessDenied,
	});
	let prompt = Arc::new(RecordingPrompt::default());
	let boot = bootstrapper(Arc::clone(&connector), Arc::clone(&prompt));

	let err = boot.start().await.unwrap_err();

	assert!(err.is_access_denied());
	assert_eq!(connector.attempts(), 1);
	assert!(prompt.log.lock().is_empty());
}

#[tokio::test]
async fn test_focus_syncs_open_sessions() {
	let connector = ScriptedConnector::new(0);
	let boot = bootstrapper(Arc::clone(&connector), Arc::new(RecordingPrompt::default()));

	let plugin = boot.start().await.unwrap();
	let mut peer = connector.take_peer();
	let _route = plugin.connection().register_route(SessionId::new("7"));

	boot.notify_focus();

	let frame = tokio::time::timeout(Duration::from_secs(1), peer.recv())
		.await
		.unwrap()
		.unwrap();
	assert_eq!(frame["name"], "sync");
	assert_eq!(frame["data"], json!({"session_id": 7}));
}
