//! Layered client configuration.
//!
//! Precedence, lowest first: built-in defaults, the JSON config file,
//! `CVMWEB_*` environment variables, command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use cvmweb::ClientConfig;
use url::Url;

use crate::error::{CliError, Result};

pub const URL_ENV: &str = "CVMWEB_URL";
pub const AUTH_ENV: &str = "CVMWEB_AUTH";
pub const CONFIG_FILE: &str = "config.json";

/// `$XDG_CONFIG_HOME/cvmweb/config.json`, falling back to the platform
/// config directory.
pub fn default_config_path() -> Option<PathBuf> {
	std::env::var_os("XDG_CONFIG_HOME")
		.map(PathBuf::from)
		.or_else(dirs::config_dir)
		.map(|base| base.join("cvmweb").join(CONFIG_FILE))
}

/// Values that replace whatever the config file says.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
	pub url: Option<String>,
	pub auth: Option<String>,
}

impl Overrides {
	/// Reads overrides through `lookup` (normally `std::env::var`).
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		Self {
			url: lookup(URL_ENV).filter(|v| !v.is_empty()),
			auth: lookup(AUTH_ENV).filter(|v| !v.is_empty()),
		}
	}

	pub fn from_env() -> Self {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Values set in `self` win over `lower`.
	pub fn over(self, lower: Overrides) -> Overrides {
		Overrides {
			url: self.url.or(lower.url),
			auth: self.auth.or(lower.auth),
		}
	}

	pub fn apply(self, config: &mut ClientConfig) {
		if let Some(url) = self.url {
			config.daemon_url = url;
		}
		if let Some(auth) = self.auth {
			config.auth_key = Some(auth);
		}
	}
}

/// Reads a config file.
///
/// A missing file is only an error when the path was given explicitly.
pub fn read_config_file(path: &Path, explicit: bool) -> Result<Option<ClientConfig>> {
	let text = match fs::read_to_string(path) {
		Ok(text) => text,
		Err(err) if err.kind() == std::io::ErrorKind::NotFound && !explicit => {
			tracing::debug!(path = %path.display(), "No config file");
			return Ok(None);
		}
		Err(err) => {
			return Err(CliError::Config {
				path: path.to_path_buf(),
				message: err.to_string(),
			});
		}
	};

	let config = serde_json::from_str(&text).map_err(|err| CliError::Config {
		path: path.to_path_buf(),
		message: err.to_string(),
	})?;
	tracing::debug!(path = %path.display(), "Loaded config file");
	Ok(Some(config))
}

/// Builds the effective configuration from every layer.
pub fn resolve(file: Option<&Path>, env: Overrides, flags: Overrides) -> Result<ClientConfig> {
	let mut config = match file {
		Some(path) => read_config_file(path, true)?,
		None => match default_config_path() {
			Some(path) => read_config_file(&path, false)?,
			None => None,
		},
	}
	.unwrap_or_default();

	flags.over(env).apply(&mut config);
	validate_daemon_url(&config.daemon_url)?;
	Ok(config)
}

/// The daemon only speaks WebSocket.
pub fn validate_daemon_url(raw: &str) -> Result<()> {
	let url = Url::parse(raw).map_err(|err| CliError::InvalidInput(format!("daemon URL {raw:?}: {err}")))?;
	match url.scheme() {
		"ws" | "wss" => Ok(()),
		other => Err(CliError::InvalidInput(format!(
			"daemon URL {raw:?} must use ws:// or wss://, not {other}://"
		))),
	}
}
