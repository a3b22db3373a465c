//! Concurrent tables behind the connection's correlation logic.
//!
//! Both tables use [`DashMap`] so entries can be dropped synchronously from
//! `Drop` impls and from the dispatch loop without an async lock.

use std::sync::Arc;

use cvmweb_protocol::{EventFrame, SessionId};
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::Reply;

/// Outstanding requests by request id.
#[derive(Default)]
pub(crate) struct PendingTable {
	entries: DashMap<Arc<str>, mpsc::UnboundedSender<Reply>>,
}

impl PendingTable {
	pub(crate) fn insert(&self, id: Arc<str>, tx: mpsc::UnboundedSender<Reply>) {
		self.entries.insert(id, tx);
	}

	pub(crate) fn contains(&self, id: &str) -> bool {
		self.entries.contains_key(id)
	}

	pub(crate) fn remove(&self, id: &str) -> bool {
		self.entries.remove(id).is_some()
	}

	/// Delivers a reply. Terminal replies also retire the entry.
	pub(crate) fn deliver(&self, id: &str, reply: Reply) -> bool {
		if reply.is_terminal() {
			match self.entries.remove(id) {
				Some((_, tx)) => tx.send(reply).is_ok(),
				None => false,
			}
		} else {
			match self.entries.get(id) {
				Some(tx) => tx.send(reply).is_ok(),
				None => false,
			}
		}
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}

	pub(crate) fn clear(&self) {
		self.entries.clear();
	}
}

/// Event routes by session id.
///
/// One route per live session; removing the route ends the session's event
/// stream.
#[derive(Default)]
pub(crate) struct RouteTable {
	routes: DashMap<SessionId, mpsc::UnboundedSender<EventFrame>>,
}

impl RouteTable {
	/// Installs a route, replacing (and closing) any previous one for `id`.
	pub(crate) fn insert(&self, id: SessionId) -> mpsc::UnboundedReceiver<EventFrame> {
		let (tx, rx) = mpsc::unbounded_channel();
		if self.routes.insert(id.clone(), tx).is_some() {
			tracing::debug!(session = %id, "Replaced existing event route");
		}
		rx
	}

	pub(crate) fn remove(&self, id: &str) -> bool {
		self.routes.remove(id).is_some()
	}

	pub(crate) fn contains(&self, id: &str) -> bool {
		self.routes.contains_key(id)
	}

	/// Forwards an event. A route whose receiver is gone is pruned.
	pub(crate) fn forward(&self, id: &str, event: EventFrame) -> bool {
		let delivered = match self.routes.get(id) {
			Some(tx) => tx.send(event).is_ok(),
			None => return false,
		};
		if !delivered {
			tracing::debug!(session = %id, "Pruning event route with no listener");
			self.routes.remove(id);
		}
		delivered
	}

	pub(crate) fn ids(&self) -> Vec<SessionId> {
		self.routes.iter().map(|entry| entry.key().clone()).collect()
	}

	pub(crate) fn len(&self) -> usize {
		self.routes.len()
	}

	pub(crate) fn clear(&self) {
		self.routes.clear();
	}
}
