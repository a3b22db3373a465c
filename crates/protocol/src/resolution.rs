//! Screen resolution strings (`"WxHxB"`) and RDP connection targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::VIEWER_CHROME_HEIGHT;

/// Tallest display the viewer window can still add its toolbar to.
pub const MAX_HEIGHT: u32 = u32::MAX - VIEWER_CHROME_HEIGHT;

/// Errors from parsing a resolution string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseResolutionError {
	#[error("resolution '{0}' must have the form <width>x<height>[x<bpp>]")]
	Shape(String),
	#[error("resolution field '{field}' is not a positive integer: '{value}'")]
	Field { field: &'static str, value: String },
}

/// Display mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
	pub width: u32,
	pub height: u32,
	/// Bits per pixel.
	pub bpp: u32,
}

impl Resolution {
	pub const DEFAULT_BPP: u32 = 24;

	pub fn new(width: u32, height: u32, bpp: u32) -> Self {
		Self { width, height, bpp }
	}
}

impl Default for Resolution {
	fn default() -> Self {
		Self::new(800, 600, Self::DEFAULT_BPP)
	}
}

impl fmt::Display for Resolution {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}x{}x{}", self.width, self.height, self.bpp)
	}
}

fn parse_field(field: &'static str, value: &str) -> Result<u32, ParseResolutionError> {
	value
		.trim()
		.parse::<u32>()
		.ok()
		.filter(|n| *n > 0)
		.ok_or_else(|| ParseResolutionError::Field {
			field,
			value: value.to_string(),
		})
}

impl FromStr for Resolution {
	type Err = ParseResolutionError;

	/// Parses `"WxH"` or `"WxHxB"`; bpp defaults to 24. Fields past the
	/// third are ignored.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let parts: Vec<&str> = s.split('x').collect();
		if parts.len() < 2 {
			return Err(ParseResolutionError::Shape(s.to_string()));
		}

		let width = parse_field("width", parts[0])?;
		let height = parse_field("height", parts[1])?;
		if height > MAX_HEIGHT {
			return Err(ParseResolutionError::Field {
				field: "height",
				value: parts[1].to_string(),
			});
		}
		let bpp = match parts.get(2) {
			Some(bpp) => parse_field("bpp", bpp)?,
			None => Self::DEFAULT_BPP,
		};

		Ok(Self { width, height, bpp })
	}
}

/// Where to point an RDP client: `"<host:port>@<WxHxB>"` as returned by a
/// session's `rdpURL` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdpTarget {
	pub address: String,
	pub resolution: Option<Resolution>,
}

impl RdpTarget {
	pub fn parse(s: &str) -> Result<Self, ParseResolutionError> {
		match s.rsplit_once('@') {
			Some((address, resolution)) if !resolution.trim().is_empty() => Ok(Self {
				address: address.to_string(),
				resolution: Some(resolution.parse()?),
			}),
			Some((address, _)) => Ok(Self {
				address: address.to_string(),
				resolution: None,
			}),
			None => Ok(Self {
				address: s.to_string(),
				resolution: None,
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn full_resolution() {
		let res: Resolution = "1024x768x16".parse().unwrap();
		assert_eq!(res, Resolution::new(1024, 768, 16));
	}

	#[test]
	fn bpp_defaults_to_24() {
		let res: Resolution = "1280x720".parse().unwrap();
		assert_eq!(res.bpp, 24);
	}

	#[test]
	fn default_is_800x600x24() {
		assert_eq!(Resolution::default().to_string(), "800x600x24");
	}

	#[test]
	fn malformed_fields_are_rejected() {
		assert_eq!(
			"wide".parse::<Resolution>(),
			Err(ParseResolutionError::Shape("wide".to_string()))
		);
		assert!(matches!(
			"800xabc".parse::<Resolution>(),
			Err(ParseResolutionError::Field { field: "height", .. })
		));
		assert!(matches!(
			"0x600".parse::<Resolution>(),
			Err(ParseResolutionError::Field { field: "width", .. })
		));
	}

	#[test]
	fn height_leaves_room_for_viewer_toolbar() {
		assert!(matches!(
			"800x4294967295".parse::<Resolution>(),
			Err(ParseResolutionError::Field { field: "height", .. })
		));
		let tallest: Resolution = format!("800x{MAX_HEIGHT}").parse().unwrap();
		assert_eq!(tallest.height, MAX_HEIGHT);
	}

	#[test]
	fn rdp_target_with_resolution() {
		let target = RdpTarget::parse("127.0.0.1:39000@1024x768x24").unwrap();
		assert_eq!(target.address, "127.0.0.1:39000");
		assert_eq!(target.resolution, Some(Resolution::new(1024, 768, 24)));
	}

	#[test]
	fn rdp_target_without_resolution() {
		let target = RdpTarget::parse("127.0.0.1:39000@").unwrap();
		assert_eq!(target.resolution, None);
		let target = RdpTarget::parse("127.0.0.1:39000").unwrap();
		assert_eq!(target.address, "127.0.0.1:39000");
	}
}
