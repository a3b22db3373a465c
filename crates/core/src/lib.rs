//! Rust client for the CernVM WebAPI daemon.
//!
//! The daemon runs on the user's machine, manages VirtualBox-backed
//! virtual machine sessions and listens on a local WebSocket. This crate
//! connects to it, waits for it to be installed if it is missing, and wraps
//! its operations in typed handles.
//!
//! # Example
//!
//! ```ignore
//! use cvmweb::{Bootstrapper, ClientConfig};
//!
//! let bootstrapper = Bootstrapper::from_config(&ClientConfig::default());
//! bootstrapper.mark_loaded();
//! let plugin = bootstrapper.start().await?;
//!
//! let session = plugin.request_session("https://example.org/vm.vmcp").await?;
//! session.start(None).await?;
//! println!("API at {}", session.api_url().await?);
//! ```

pub mod bootstrap;
mod config;
mod events;
mod handlers;
mod plugin;
mod session;
pub mod viewer;

pub use bootstrap::{
	Bootstrapper, Connector, FailureCallback, InstallPrompt, LogInstallPrompt, PageState, ReadyCallback,
	RetryPolicy, StartHandle, WebSocketConnector,
};
pub use config::{ClientConfig, DEFAULT_SESSION_INIT_TIMEOUT_MS};
pub use cvmweb_protocol as protocol;
pub use cvmweb_protocol::{
	ErrorCode, Interaction, InteractionKind, InteractionResult, RdpTarget, Resolution, ScreenSize, SessionId,
	SessionState, SessionSummary, ViewerWindow,
};
pub use cvmweb_runtime::{Connection, Error, Result};
pub use events::{PluginEvent, SessionEvent};
pub use handlers::{HandlerId, Subscription};
pub use plugin::{PluginOptions, WebApiPlugin};
pub use session::{Session, SessionSnapshot};
pub use viewer::{Viewer, ViewerOpener, launch_rdp};
