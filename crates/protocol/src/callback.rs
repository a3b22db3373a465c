//! Callback roles carried by request-scoped events.

use std::fmt;

/// Role of an event fired against a pending request id.
///
/// `Succeed` and `Failed` end the request; the others are progress feedback
/// and may arrive any number of times before that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackRole {
	Succeed,
	Failed,
	Progress,
	Started,
	Completed,
}

impl CallbackRole {
	/// Maps a wire event name onto a role.
	pub fn from_name(name: &str) -> Option<Self> {
		match name {
			"succeed" => Some(Self::Succeed),
			"failed" => Some(Self::Failed),
			"progress" => Some(Self::Progress),
			"started" => Some(Self::Started),
			"completed" => Some(Self::Completed),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Succeed => "succeed",
			Self::Failed => "failed",
			Self::Progress => "progress",
			Self::Started => "started",
			Self::Completed => "completed",
		}
	}

	/// Returns true if no further events follow for the same request.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Succeed | Self::Failed)
	}
}

impl fmt::Display for CallbackRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn names_map_both_ways() {
		for role in [
			CallbackRole::Succeed,
			CallbackRole::Failed,
			CallbackRole::Progress,
			CallbackRole::Started,
			CallbackRole::Completed,
		] {
			assert_eq!(CallbackRole::from_name(role.as_str()), Some(role));
		}
		assert_eq!(CallbackRole::from_name("stateChanged"), None);
	}

	#[test]
	fn only_outcomes_are_terminal() {
		assert!(CallbackRole::Succeed.is_terminal());
		assert!(CallbackRole::Failed.is_terminal());
		assert!(!CallbackRole::Progress.is_terminal());
		assert!(!CallbackRole::Started.is_terminal());
		assert!(!CallbackRole::Completed.is_terminal());
	}
}
