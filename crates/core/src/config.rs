//! Client configuration.

use std::time::Duration;

use cvmweb_protocol::ScreenSize;
use cvmweb_protocol::constants::{DEFAULT_DAEMON_URL, DEFAULT_POLL_INTERVAL_MS, INSTALL_URL, VIEWER_URL};
use serde::{Deserialize, Serialize};

use crate::bootstrap::RetryPolicy;
use crate::plugin::PluginOptions;
use crate::viewer::Viewer;

/// Default bound on waiting for a new session's first `stateVariables`.
pub const DEFAULT_SESSION_INIT_TIMEOUT_MS: u64 = 30_000;

/// Everything needed to reach the daemon and bootstrap a client.
///
/// Serialized as camelCase JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
	/// WebSocket endpoint of the daemon.
	pub daemon_url: String,
	/// Key sent with `handshake`, if the daemon requires one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub auth_key: Option<String>,
	/// Page shown while waiting for the daemon to be installed.
	pub install_url: String,
	/// Web RDP client page.
	pub viewer_url: String,
	pub poll_interval_ms: u64,
	/// Total connection attempts before giving up; unlimited when absent.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_attempts: Option<u32>,
	pub session_init_timeout_ms: u64,
	/// Upper bound on single requests; unbounded when absent.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub request_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			daemon_url: DEFAULT_DAEMON_URL.to_string(),
			auth_key: None,
			install_url: INSTALL_URL.to_string(),
			viewer_url: VIEWER_URL.to_string(),
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			max_attempts: None,
			session_init_timeout_ms: DEFAULT_SESSION_INIT_TIMEOUT_MS,
			request_timeout_ms: None,
		}
	}
}

impl ClientConfig {
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			interval: Duration::from_millis(self.poll_interval_ms),
			max_attempts: self.max_attempts,
		}
	}

	pub fn plugin_options(&self) -> PluginOptions {
		PluginOptions {
			session_init_timeout: Duration::from_millis(self.session_init_timeout_ms),
			request_timeout: self.request_timeout_ms.map(Duration::from_millis),
		}
	}

	/// The configured viewer page, centred on `screen`.
	pub fn viewer(&self, screen: ScreenSize) -> Viewer {
		Viewer::new(self.viewer_url.clone(), screen)
	}
}
