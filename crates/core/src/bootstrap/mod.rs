//! Getting from "page loaded" to a connected [`WebApiPlugin`].
//!
//! # Flow
//!
//! 1. [`Bootstrapper::start_cvm_webapi`] defers itself until the page has
//!    loaded ([`PageState`])
//! 2. One connection attempt through the [`Connector`]
//! 3. If the daemon is missing, the [`InstallPrompt`] is shown and the
//!    connector is retried per the [`RetryPolicy`] until it succeeds, the
//!    attempts run out, or the bootstrapper is cancelled
//! 4. On success the prompt is hidden, `on_ready` receives the plugin, and
//!    focus signals start triggering [`WebApiPlugin::sync_sessions`]

mod connector;
mod page;
mod retry;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cvmweb_runtime::{Error, Result};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

pub use self::connector::{Connector, WebSocketConnector};
pub use self::page::PageState;
pub use self::retry::RetryPolicy;
use crate::config::ClientConfig;
use crate::plugin::WebApiPlugin;

/// Called with the connected plugin.
pub type ReadyCallback = Box<dyn FnOnce(Arc<WebApiPlugin>) + Send>;

/// Called when the bootstrapper gives up.
pub type FailureCallback = Box<dyn FnOnce(Error) + Send>;

/// Shows the user where to get the daemon while polling for it.
pub trait InstallPrompt: Send + Sync {
	fn show(&self, install_url: &str);
	fn hide(&self);
}

/// Prompt that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogInstallPrompt;

impl InstallPrompt for LogInstallPrompt {
	fn show(&self, install_url: &str) {
		tracing::warn!(url = install_url, "CernVM WebAPI is not installed; waiting for installation");
	}

	fn hide(&self) {
		tracing::info!("CernVM WebAPI became available");
	}
}

/// Handle on one `start_cvm_webapi` call.
#[derive(Debug, Clone)]
pub struct StartHandle {
	started: Arc<AtomicBool>,
	cancel: CancellationToken,
}

impl StartHandle {
	/// Returns true once the start hook has run (the page had loaded).
	pub fn is_started(&self) -> bool {
		self.started.load(Ordering::SeqCst)
	}

	/// Stops polling and the focus listener of this start.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}
}

/// Entry point for embedders.
///
/// Cheap to clone; clones share the page state, focus signal and
/// cancellation token.
#[derive(Clone)]
pub struct Bootstrapper {
	page: Arc<PageState>,
	connector: Arc<dyn Connector>,
	prompt: Arc<dyn InstallPrompt>,
	retry: RetryPolicy,
	install_url: String,
	focus: broadcast::Sender<()>,
	cancel: CancellationToken,
}

impl Bootstrapper {
	pub fn new(connector: Arc<dyn Connector>) -> Self {
		let (focus, _) = broadcast::channel(16);
		Self {
			page: Arc::new(PageState::new()),
			connector,
			prompt: Arc::new(LogInstallPrompt),
			retry: RetryPolicy::default(),
			install_url: cvmweb_protocol::constants::INSTALL_URL.to_string(),
			focus,
			cancel: CancellationToken::new(),
		}
	}

	/// Bootstrapper for a WebSocket daemon described by `config`.
	pub fn from_config(config: &ClientConfig) -> Self {
		Self::new(Arc::new(WebSocketConnector::from_config(config)))
			.with_retry_policy(config.retry_policy())
			.with_install_url(config.install_url.clone())
	}

	pub fn with_page(mut self, page: Arc<PageState>) -> Self {
		self.page = page;
		self
	}

	pub fn with_install_prompt(mut self, prompt: Arc<dyn InstallPrompt>) -> Self {
		self.prompt = prompt;
		self
	}

	pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	pub fn with_install_url(mut self, url: impl Into<String>) -> Self {
		self.install_url = url.into();
		self
	}

	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancel = token;
		self
	}

	pub fn page(&self) -> &Arc<PageState> {
		&self.page
	}

	/// Signals the page is loaded, running deferred starts.
	pub fn mark_loaded(&self) -> usize {
		self.page.mark_loaded()
	}

	/// Signals that the page regained focus.
	pub fn notify_focus(&self) {
		// No receivers just means no plugin is connected yet.
		let _ = self.focus.send(());
	}

	/// Cancels every start made through this bootstrapper.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Connects to the daemon and hands the plugin to `on_ready`.
	///
	/// Runs once the page has loaded; see the module docs for the flow.
	/// `on_fail` fires only if polling is bounded or cancelled, or the
	/// daemon answers but refuses the client. Must be called within a Tokio
	/// runtime.
	pub fn start_cvm_webapi(&self, on_ready: ReadyCallback, on_fail: Option<FailureCallback>) -> StartHandle {
		let handle = StartHandle {
			started: Arc::new(AtomicBool::new(false)),
			cancel: self.cancel.child_token(),
		};

		let this = self.clone();
		let started = Arc::clone(&handle.started);
		let cancel = handle.cancel.clone();
		let runtime = tokio::runtime::Handle::current();

		self.page.defer_or_run(move || {
			started.store(true, Ordering::SeqCst);
			runtime.spawn(async move {
				match this.connect(&cancel).await {
					Ok(plugin) => {
						this.watch_focus(&plugin, cancel);
						on_ready(plugin);
					}
					Err(err) => {
						tracing::error!("Unable to start CernVM WebAPI: {}", err);
						if let Some(on_fail) = on_fail {
							on_fail(err);
						}
					}
				}
			});
		});

		handle
	}

	/// Awaitable form of [`Bootstrapper::start_cvm_webapi`].
	pub async fn start(&self) -> Result<Arc<WebApiPlugin>> {
		let (tx, rx) = oneshot::channel();
		let fail_tx = Arc::new(parking_lot::Mutex::new(Some(tx)));
		let ready_tx = Arc::clone(&fail_tx);

		self.start_cvm_webapi(
			Box::new(move |plugin| {
				if let Some(tx) = ready_tx.lock().take() {
					let _ = tx.send(Ok(plugin));
				}
			}),
			Some(Box::new(move |err| {
				if let Some(tx) = fail_tx.lock().take() {
					let _ = tx.send(Err(err));
				}
			})),
		);

		rx.await.map_err(|_| Error::Cancelled("bootstrap task ended".to_string()))?
	}

	async fn connect(&self, cancel: &CancellationToken) -> Result<Arc<WebApiPlugin>> {
		let mut attempts: u32 = 1;
		let mut last_err = match self.connector.connect().await {
			Ok(plugin) => return Ok(plugin),
			Err(err) if is_missing_daemon(&err) => err,
			Err(err) => return Err(err),
		};

		tracing::info!("Daemon not reachable ({}), showing install prompt", last_err);
		self.prompt.show(&self.install_url);

		let outcome = loop {
			if !self.retry.allows_another(attempts) {
				tracing::warn!(attempts, "Giving up waiting for the daemon");
				break Err(last_err);
			}

			tokio::select! {
				_ = cancel.cancelled() => {
					break Err(Error::Cancelled(format!("stopped waiting for the daemon after {attempts} attempts")));
				}
				_ = tokio::time::sleep(self.retry.interval) => {}
			}

			attempts += 1;
			tracing::debug!(attempt = attempts, "Polling for daemon");
			match self.connector.connect().await {
				Ok(plugin) => break Ok(plugin),
				Err(err) if is_missing_daemon(&err) => last_err = err,
				Err(err) => break Err(err),
			}
		};

		// A prompt left up after giving up keeps pointing at the installer.
		if outcome.is_ok() {
			self.prompt.hide();
		}
		outcome
	}

	fn watch_focus(&self, plugin: &Arc<WebApiPlugin>, cancel: CancellationToken) {
		let mut focus = self.focus.subscribe();
		let plugin = Arc::downgrade(plugin);

		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = cancel.cancelled() => break,
					received = focus.recv() => match received {
						Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
						Err(broadcast::error::RecvError::Closed) => break,
					},
				}

				let Some(plugin) = plugin.upgrade() else { break };
				if !plugin.is_connected() {
					break;
				}
				if let Err(e) = plugin.sync_sessions() {
					tracing::warn!("Session sync on focus failed: {}", e);
				}
			}
			tracing::debug!("Focus listener stopped");
		});
	}
}

impl std::fmt::Debug for Bootstrapper {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Bootstrapper")
			.field("page", &self.page)
			.field("retry", &self.retry)
			.field("install_url", &self.install_url)
			.finish()
	}
}

/// Errors that mean "not installed yet" rather than "broken".
fn is_missing_daemon(err: &Error) -> bool {
	matches!(err, Error::ServiceUnavailable(_) | Error::ConnectionFailed(_))
}
