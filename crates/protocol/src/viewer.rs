//! Geometry and URL of the web RDP viewer window.

use serde::{Deserialize, Serialize};

use crate::constants::{VIEWER_CHROME_HEIGHT, VIEWER_WINDOW_NAME};
use crate::resolution::Resolution;

/// Size of the screen the viewer is centred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
	pub width: u32,
	pub height: u32,
}

impl Default for ScreenSize {
	fn default() -> Self {
		Self {
			width: 1920,
			height: 1080,
		}
	}
}

/// A popup window request for the RDP client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerWindow {
	pub url: String,
	pub name: String,
	pub width: u32,
	/// Resolution height plus room for the viewer toolbar.
	pub height: u32,
	pub left: i64,
	pub top: i64,
	/// Colour depth requested for the session display.
	pub bpp: u32,
}

impl ViewerWindow {
	/// Lays out a viewer for `rdp_url` at `resolution`, centred on `screen`.
	pub fn new(base_url: &str, rdp_url: &str, resolution: Resolution, screen: ScreenSize) -> Self {
		let width = resolution.width;
		let height = resolution.height.saturating_add(VIEWER_CHROME_HEIGHT);
		let left = (i64::from(screen.width) - i64::from(width)) / 2;
		let top = (i64::from(screen.height) - i64::from(height)) / 2;

		Self {
			url: format!("{base_url}#{rdp_url},{width},{}", resolution.height),
			name: VIEWER_WINDOW_NAME.to_string(),
			width,
			height,
			left,
			top,
			bpp: resolution.bpp,
		}
	}

	/// `window.open`-style feature string.
	pub fn features(&self) -> String {
		format!(
			"width={},height={},left={},top={}",
			self.width, self.height, self.left, self.top
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::constants::VIEWER_URL;

	#[test]
	fn window_is_taller_than_resolution() {
		let window = ViewerWindow::new(
			VIEWER_URL,
			"127.0.0.1:39000",
			Resolution::new(1024, 768, 16),
			ScreenSize {
				width: 1920,
				height: 1080,
			},
		);
		assert_eq!(window.width, 1024);
		assert_eq!(window.height, 868);
		assert_eq!(window.left, 448);
		assert_eq!(window.top, 106);
		assert_eq!(window.bpp, 16);
		assert_eq!(window.name, "WebRDPClient");
		assert_eq!(
			window.url,
			"http://cernvm.cern.ch/releases/webapi/webrdp/webclient.html#127.0.0.1:39000,1024,768"
		);
	}

	#[test]
	fn oversized_window_goes_off_screen() {
		let window = ViewerWindow::new(
			VIEWER_URL,
			"h:1",
			Resolution::new(1600, 1200, 24),
			ScreenSize {
				width: 1280,
				height: 800,
			},
		);
		assert_eq!(window.left, -160);
		assert_eq!(window.top, -250);
		assert_eq!(window.features(), "width=1600,height=1300,left=-160,top=-250");
	}

	#[test]
	fn huge_height_saturates() {
		let window = ViewerWindow::new(VIEWER_URL, "h:1", Resolution::new(800, u32::MAX, 24), ScreenSize::default());
		assert_eq!(window.height, u32::MAX);
		assert!(window.url.ends_with(&format!(",800,{}", u32::MAX)));
	}
}
