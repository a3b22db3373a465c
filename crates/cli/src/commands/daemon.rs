//! Commands about the daemon itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use cvmweb::{Bootstrapper, InstallPrompt, SessionSummary};
use serde::Serialize;

use super::Context;
use crate::cli::WaitArgs;
use crate::error::Result;
use crate::output::{ResultBuilder, print_result};

/// How long `stop-service` waits for the daemon to drop the connection.
const STOP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
	pub url: String,
	pub version: Option<String>,
	pub privileged: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListData {
	pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopServiceData {
	pub url: String,
	/// Whether the daemon closed the connection within the grace period.
	pub disconnected: bool,
}

pub async fn status(ctx: &Context) -> Result<()> {
	let plugin = ctx.connect().await?;

	let data = StatusData {
		url: ctx.config.daemon_url.clone(),
		version: plugin.version(),
		privileged: plugin.is_privileged(),
	};
	print_result(&ResultBuilder::new("status").data(data).build(), ctx.format);
	Ok(())
}

/// Install hint printed while `wait` polls.
struct TerminalInstallPrompt;

impl InstallPrompt for TerminalInstallPrompt {
	fn show(&self, install_url: &str) {
		eprintln!(
			"{} CernVM WebAPI is not running. Install it from {} ; waiting...",
			"!".yellow().bold(),
			install_url.underline()
		);
	}

	fn hide(&self) {
		eprintln!("{} CernVM WebAPI is available", "ok".green().bold());
	}
}

pub async fn wait(ctx: &Context, args: WaitArgs) -> Result<()> {
	let started = Instant::now();
	let mut config = ctx.config.clone();
	if let Some(interval) = args.interval_ms {
		config.poll_interval_ms = interval;
	}
	if args.max_attempts.is_some() {
		config.max_attempts = args.max_attempts;
	}

	let bootstrapper = Bootstrapper::from_config(&config).with_install_prompt(Arc::new(TerminalInstallPrompt));
	bootstrapper.mark_loaded();

	let interrupt = bootstrapper.clone();
	let ctrl_c = tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			interrupt.cancel();
		}
	});

	let outcome = bootstrapper.start().await;
	ctrl_c.abort();
	let plugin = outcome?;

	let data = StatusData {
		url: config.daemon_url.clone(),
		version: plugin.version(),
		privileged: plugin.is_privileged(),
	};
	print_result(
		&ResultBuilder::new("wait").started_at(started).data(data).build(),
		ctx.format,
	);
	Ok(())
}

pub async fn list(ctx: &Context) -> Result<()> {
	let plugin = ctx.connect().await?;
	let sessions = plugin.enum_sessions().await?;
	tracing::debug!(count = sessions.len(), "Listed sessions");

	print_result(&ResultBuilder::new("list").data(ListData { sessions }).build(), ctx.format);
	Ok(())
}

pub async fn stop_service(ctx: &Context) -> Result<()> {
	let plugin = ctx.connect().await?;
	plugin.stop_service()?;

	let disconnected = tokio::time::timeout(STOP_GRACE, plugin.closed()).await.is_ok();
	if !disconnected {
		tracing::warn!("Daemon still connected {:?} after stopService", STOP_GRACE);
	}

	let data = StopServiceData {
		url: ctx.config.daemon_url.clone(),
		disconnected,
	};
	print_result(&ResultBuilder::new("stop-service").data(data).build(), ctx.format);
	Ok(())
}
