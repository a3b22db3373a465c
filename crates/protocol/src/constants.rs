//! Well-known endpoints and defaults.

/// WebSocket endpoint the daemon listens on.
pub const DEFAULT_DAEMON_URL: &str = "ws://127.0.0.1:5624/";

/// Page shown to users who do not have the daemon installed.
pub const INSTALL_URL: &str = "http://cernvm.cern.ch/releases/webapi/install";

/// Web RDP client; the connection string and size are passed in the fragment.
pub const VIEWER_URL: &str = "http://cernvm.cern.ch/releases/webapi/webrdp/webclient.html";

/// Name of the popup window hosting the RDP client.
pub const VIEWER_WINDOW_NAME: &str = "WebRDPClient";

/// Extra window height reserved for the viewer toolbar.
pub const VIEWER_CHROME_HEIGHT: u32 = 100;

/// Interval between installation polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
