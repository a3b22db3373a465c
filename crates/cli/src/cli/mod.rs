
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use cvmweb::ScreenSize;

use crate::output::OutputFormat;
use crate::styles::cli_styles;

/// Command-line client for the CernVM WebAPI daemon.
#[derive(Parser, Debug)]
#[command(name = "cvmweb")]
#[command(about = "Talk to the CernVM WebAPI daemon: sessions, state and RDP viewer")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: json (default), ndjson, or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	/// Daemon WebSocket URL (overrides CVMWEB_URL and the config file)
	#[arg(long, global = true, value_name = "URL")]
	pub url: Option<String>,

	/// Key sent with the handshake (overrides CVMWEB_AUTH)
	#[arg(long, global = true, value_name = "KEY")]
	pub auth: Option<String>,

	/// Config file (default: $XDG_CONFIG_HOME/cvmweb/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Connect once and report the daemon version.
	Status,
	/// Poll until the daemon is installed and running.
	Wait(WaitArgs),
	/// Open (or reopen) the session described by a VMCP URL.
	Open(SessionArgs),
	/// Run a lifecycle action on a session.
	Control(ControlArgs),
	/// Read a session variable.
	Get(GetArgs),
	/// Write a session variable or VM property.
	Set(SetArgs),
	/// List sessions known to the daemon (needs privileged access).
	List,
	/// Ask the daemon to shut down.
	StopService,
	/// Compute the RDP viewer window for an RDP address.
	Viewer(ViewerArgs),
	/// Stream session events until the session closes.
	Watch(WatchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WaitArgs {
	/// Milliseconds between connection attempts
	#[arg(long, value_name = "MS")]
	pub interval_ms: Option<u64>,

	/// Give up after this many attempts (the first one included)
	#[arg(long, value_name = "N")]
	pub max_attempts: Option<u32>,
}

/// How to answer prompts the daemon raises while a command runs.
#[derive(Args, Debug, Clone, Default)]
pub struct InteractArgs {
	/// Accept every daemon prompt without asking
	#[arg(short = 'y', long)]
	pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
	/// URL of the VM context description (VMCP)
	#[arg(value_name = "VMCP")]
	pub vmcp: String,

	#[command(flatten)]
	pub interact: InteractArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ControlArgs {
	#[arg(value_name = "VMCP")]
	pub vmcp: String,

	#[arg(value_enum)]
	pub action: SessionAction,

	/// Extra start parameter, repeatable (only for `start`)
	#[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
	pub params: Vec<(String, String)>,

	#[command(flatten)]
	pub interact: InteractArgs,
}

#[derive(Args, Debug, Clone)]
pub struct GetArgs {
	#[arg(value_name = "VMCP")]
	pub vmcp: String,

	pub key: String,

	#[command(flatten)]
	pub interact: InteractArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SetArgs {
	#[arg(value_name = "VMCP")]
	pub vmcp: String,

	pub key: String,

	pub value: String,

	/// Set a VM property instead of a session variable
	#[arg(long)]
	pub property: bool,

	#[command(flatten)]
	pub interact: InteractArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ViewerArgs {
	/// RDP address, `host:port` with an optional `@WxH[xBPP]` suffix
	#[arg(value_name = "RDP")]
	pub rdp: String,

	/// Resolution to use instead of the one in the address
	#[arg(long, value_name = "WxH[xBPP]")]
	pub resolution: Option<String>,

	/// Screen size used to center the window
	#[arg(long, value_name = "WxH", value_parser = parse_screen)]
	pub screen: Option<ScreenSize>,

	/// Web RDP client page (overrides the configured viewer URL)
	#[arg(long, value_name = "URL")]
	pub base_url: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
	#[arg(value_name = "VMCP")]
	pub vmcp: String,

	/// Stop after this many events
	#[arg(long, value_name = "N")]
	pub count: Option<usize>,

	#[command(flatten)]
	pub interact: InteractArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SessionAction {
	Start,
	Stop,
	Pause,
	Resume,
	Hibernate,
	Reset,
	Close,
	Sync,
}

impl SessionAction {
	pub fn name(&self) -> &'static str {
		match self {
			SessionAction::Start => "start",
			SessionAction::Stop => "stop",
			SessionAction::Pause => "pause",
			SessionAction::Resume => "resume",
			SessionAction::Hibernate => "hibernate",
			SessionAction::Reset => "reset",
			SessionAction::Close => "close",
			SessionAction::Sync => "sync",
		}
	}
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
	match raw.split_once('=') {
		Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
		_ => Err(format!("expected KEY=VALUE, got {raw:?}")),
	}
}

fn parse_screen(raw: &str) -> Result<ScreenSize, String> {
	let (width, height) = raw
		.split_once(['x', 'X'])
		.ok_or_else(|| format!("expected WxH, got {raw:?}"))?;
	let width: u32 = width.trim().parse().map_err(|_| format!("bad screen width in {raw:?}"))?;
	let height: u32 = height.trim().parse().map_err(|_| format!("bad screen height in {raw:?}"))?;
	if width == 0 || height == 0 {
		return Err(format!("screen size must be non-zero, got {raw:?}"));
	}
	Ok(ScreenSize { width, height })
}
