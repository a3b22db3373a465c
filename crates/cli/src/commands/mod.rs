mod daemon;
mod session;
mod viewer;

use std::sync::Arc;

use cvmweb::{ClientConfig, Connector, Session, WebApiPlugin, WebSocketConnector};
use url::Url;

use crate::cli::{Cli, Commands};
use crate::config::{self, Overrides};
use crate::error::{CliError, Result};
use crate::output::OutputFormat;

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct Context {
	pub config: ClientConfig,
	pub format: OutputFormat,
}

impl Context {
	/// One connection attempt, handshake included.
	pub async fn connect(&self) -> Result<Arc<WebApiPlugin>> {
		let connector = WebSocketConnector::from_config(&self.config);
		let plugin = connector.connect().await?;
		tracing::info!(url = %self.config.daemon_url, version = ?plugin.version(), "Connected to daemon");
		Ok(plugin)
	}

	/// Connects and opens the session for `vmcp`, answering prompts on the
	/// way. The returned subscription keeps the prompt handler alive.
	pub async fn open_session(
		&self,
		vmcp: &str,
		assume_yes: bool,
	) -> Result<(Arc<WebApiPlugin>, Session, cvmweb::Subscription)> {
		validate_vmcp(vmcp)?;
		let plugin = self.connect().await?;
		let prompts = crate::interaction::attach(&plugin, assume_yes);
		let session = plugin.request_session(vmcp).await?;
		Ok((plugin, session, prompts))
	}
}

/// Name used in the result envelope.
pub fn command_name(command: &Commands) -> &'static str {
	match command {
		Commands::Status => "status",
		Commands::Wait(_) => "wait",
		Commands::Open(_) => "open",
		Commands::Control(_) => "control",
		Commands::Get(_) => "get",
		Commands::Set(_) => "set",
		Commands::List => "list",
		Commands::StopService => "stop-service",
		Commands::Viewer(_) => "viewer",
		Commands::Watch(_) => "watch",
	}
}

pub async fn dispatch(cli: Cli) -> Result<()> {
	let flags = Overrides {
		url: cli.url,
		auth: cli.auth,
	};
	let config = config::resolve(cli.config.as_deref(), Overrides::from_env(), flags)?;
	let ctx = Context {
		config,
		format: cli.format,
	};

	match cli.command {
		Commands::Status => daemon::status(&ctx).await,
		Commands::Wait(args) => daemon::wait(&ctx, args).await,
		Commands::List => daemon::list(&ctx).await,
		Commands::StopService => daemon::stop_service(&ctx).await,
		Commands::Open(args) => session::open(&ctx, args).await,
		Commands::Control(args) => session::control(&ctx, args).await,
		Commands::Get(args) => session::get(&ctx, args).await,
		Commands::Set(args) => session::set(&ctx, args).await,
		Commands::Watch(args) => session::watch(&ctx, args).await,
		Commands::Viewer(args) => viewer::viewer(&ctx, args),
	}
}

/// VMCP descriptions are fetched by the daemon over HTTP(S).
pub fn validate_vmcp(raw: &str) -> Result<()> {
	let url = Url::parse(raw).map_err(|err| CliError::InvalidInput(format!("VMCP URL {raw:?}: {err}")))?;
	match url.scheme() {
		"http" | "https" => Ok(()),
		other => Err(CliError::InvalidInput(format!(
			"VMCP URL {raw:?} must use http:// or https://, not {other}://"
		))),
	}
}
