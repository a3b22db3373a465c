//! Launching the web RDP viewer.
//!
//! The library only computes the window; opening it is up to a
//! [`ViewerOpener`] supplied by the embedder.

use cvmweb_protocol::constants::VIEWER_URL;
use cvmweb_protocol::{Resolution, ScreenSize, ViewerWindow};
use cvmweb_runtime::{Error, Result};

/// Opens viewer windows on behalf of the library.
pub trait ViewerOpener: Send + Sync {
	fn open(&self, window: &ViewerWindow) -> Result<()>;
}

/// Viewer page and screen to centre windows on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
	pub base_url: String,
	pub screen: ScreenSize,
}

impl Default for Viewer {
	fn default() -> Self {
		Self {
			base_url: VIEWER_URL.to_string(),
			screen: ScreenSize::default(),
		}
	}
}

impl Viewer {
	pub fn new(base_url: impl Into<String>, screen: ScreenSize) -> Self {
		Self {
			base_url: base_url.into(),
			screen,
		}
	}

	/// Computes the window for `rdp_url` at `resolution` (`"WxH[xB]"`,
	/// 800x600x24 when absent).
	pub fn window(&self, rdp_url: &str, resolution: Option<&str>) -> Result<ViewerWindow> {
		if rdp_url.trim().is_empty() {
			return Err(Error::InvalidArgument("RDP address is empty".to_string()));
		}
		let resolution = match resolution {
			Some(raw) => raw
				.parse::<Resolution>()
				.map_err(|e| Error::InvalidArgument(e.to_string()))?,
			None => Resolution::default(),
		};
		Ok(ViewerWindow::new(&self.base_url, rdp_url, resolution, self.screen))
	}

	/// Computes the window and hands it to `opener`.
	pub fn launch(&self, opener: &dyn ViewerOpener, rdp_url: &str, resolution: Option<&str>) -> Result<ViewerWindow> {
		let window = self.window(rdp_url, resolution)?;
		tracing::info!(url = %window.url, width = window.width, height = window.height, "Opening RDP viewer");
		opener.open(&window)?;
		Ok(window)
	}
}

/// Opens the standard web RDP viewer for `rdp_url`, centred on `screen`.
pub fn launch_rdp(
	opener: &dyn ViewerOpener,
	rdp_url: &str,
	resolution: Option<&str>,
	screen: ScreenSize,
) -> Result<ViewerWindow> {
	Viewer::new(VIEWER_URL, screen).launch(opener, rdp_url, resolution)
}

#[cfg(test)]
mod tests {
	use parking_lot::Mutex;

	use super::*;

	#[derive(Default)]
	struct RecordingOpener {
		opened: Mutex<Vec<ViewerWindow>>,
	}

	impl ViewerOpener for RecordingOpener {
		fn open(&self, window: &ViewerWindow) -> Result<()> {
			self.opened.lock().push(window.clone());
			Ok(())
		}
	}

	#[test]
	fn window_height_adds_toolbar() {
		let opener = RecordingOpener::default();
		for (raw, width, height, bpp) in [
			("1024x768x16", 1024, 768, 16),
			("640x480", 640, 480, 24),
			("1920x1080x32", 1920, 1080, 32),
		] {
			let window = launch_rdp(&opener, "127.0.0.1:5000", Some(raw), ScreenSize::default()).unwrap();
			assert_eq!(window.width, width);
			assert_eq!(window.height, height + 100);
			assert_eq!(window.bpp, bpp);
		}
		assert_eq!(opener.opened.lock().len(), 3);
	}

	#[test]
	fn missing_resolution_uses_default() {
		let opener = RecordingOpener::default();
		let window = launch_rdp(&opener, "127.0.0.1:5000", None, ScreenSize::default()).unwrap();
		assert_eq!((window.width, window.height, window.bpp), (800, 700, 24));
		assert_eq!(window.name, "WebRDPClient");
		assert!(window.url.ends_with("#127.0.0.1:5000,800,600"));
	}

	#[test]
	fn malformed_resolution_opens_nothing() {
		let opener = RecordingOpener::default();
		let err = launch_rdp(&opener, "127.0.0.1:5000", Some("axb"), ScreenSize::default()).unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
		assert!(opener.opened.lock().is_empty());
	}

	#[test]
	fn custom_viewer_page() {
		let viewer = Viewer::new("http://localhost/rdp.html", ScreenSize { width: 1000, height: 800 });
		let window = viewer.window("h:1", Some("800x600")).unwrap();
		assert_eq!(window.url, "http://localhost/rdp.html#h:1,800,600");
		assert_eq!((window.left, window.top), (100, 50));
	}
}
