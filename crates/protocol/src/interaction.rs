//! User interaction requests raised by the daemon.
//!
//! While serving a request the daemon may need the user to confirm something
//! (installing a hypervisor, accepting a license). It sends an `interact`
//! event and blocks until the client answers with `interactionCallback`.

use serde::{Deserialize, Serialize};

use crate::frame::EventFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionKind {
	#[serde(rename = "confirm")]
	Confirm,
	#[serde(rename = "alert")]
	Alert,
	#[serde(rename = "confirmLicense")]
	ConfirmLicense,
	#[serde(rename = "confirmLicenseURL")]
	ConfirmLicenseUrl,
}

impl InteractionKind {
	pub fn from_name(name: &str) -> Option<Self> {
		match name {
			"confirm" => Some(Self::Confirm),
			"alert" => Some(Self::Alert),
			"confirmLicense" => Some(Self::ConfirmLicense),
			"confirmLicenseURL" => Some(Self::ConfirmLicenseUrl),
			_ => None,
		}
	}
}

/// A prompt the daemon wants shown to the user.
///
/// For [`InteractionKind::ConfirmLicenseUrl`] the body is a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
	pub kind: InteractionKind,
	pub title: String,
	pub body: String,
}

impl Interaction {
	/// Decodes an `interact` event (`[kind, title, body]`).
	pub fn from_event(event: &EventFrame) -> Option<Self> {
		let kind = InteractionKind::from_name(&event.arg_string(0)?)?;
		Some(Self {
			kind,
			title: event.arg_string(1).unwrap_or_default(),
			body: event.arg_string(2).unwrap_or_default(),
		})
	}
}

/// Answer sent back with `interactionCallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionResult {
	Accepted,
	Rejected,
}

impl InteractionResult {
	pub fn code(&self) -> i64 {
		match self {
			Self::Accepted => 1,
			Self::Rejected => 2,
		}
	}
}

impl From<bool> for InteractionResult {
	fn from(accepted: bool) -> Self {
		if accepted { Self::Accepted } else { Self::Rejected }
	}
}
