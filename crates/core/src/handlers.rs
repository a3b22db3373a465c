//! Generic event handler infrastructure.
//!
//! Plugin and session events fan out to handlers kept in a [`HandlerMap`]
//! ([`IndexMap`] storage for O(1) removal and stable insertion order).
//! Registration hands back a [`Subscription`] that removes the handler when
//! dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Unique identifier for event handlers.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Boxed async handler future.
pub type HandlerFuture = Pin<Box<dyn Future<Output = cvmweb_runtime::Result<()>> + Send>>;

/// Handler function: `E` → async `Result<()>`.
pub type HandlerFn<E> = Arc<dyn Fn(E) -> HandlerFuture + Send + Sync>;

/// Handler storage: [`IndexMap`] for O(1) removal with stable insertion order.
pub type HandlerMap<E> = Arc<Mutex<IndexMap<HandlerId, HandlerFn<E>>>>;

pub(crate) fn new_handler_map<E>() -> HandlerMap<E> {
	Arc::new(Mutex::new(IndexMap::new()))
}

/// Registers `handler` and returns the subscription keeping it alive.
pub(crate) fn register<E, F, Fut>(handlers: &HandlerMap<E>, handler: F) -> Subscription
where
	E: Send + 'static,
	F: Fn(E) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = cvmweb_runtime::Result<()>> + Send + 'static,
{
	let id = next_handler_id();
	let handler: HandlerFn<E> = Arc::new(move |event: E| -> HandlerFuture { Box::pin(handler(event)) });
	handlers.lock().insert(id, handler);
	Subscription::from_handler_map(id, handlers)
}

/// Calls every registered handler in registration order.
///
/// Handler errors are logged and do not stop delivery to later handlers.
pub(crate) async fn emit<E: Clone>(handlers: &HandlerMap<E>, event: E, kind: &'static str) {
	let snapshot: Vec<_> = {
		let map = handlers.lock();
		map.iter().map(|(id, h)| (*id, Arc::clone(h))).collect()
	};

	for (id, handler) in snapshot {
		if let Err(e) = handler(event.clone()).await {
			tracing::error!(error = %e, handler_id = id, kind, "Event handler error");
		}
	}
}

/// RAII handle that unregisters an event handler on drop.
///
/// Holds a weak reference to the handler map, so dropping after the owning
/// plugin or session is gone is safe (becomes a no-op).
pub struct Subscription {
	id: HandlerId,
	dropper: Option<Arc<dyn Fn(HandlerId) + Send + Sync>>,
}

impl Subscription {
	/// Creates a subscription with a custom dropper function.
	pub fn new(id: HandlerId, dropper: Arc<dyn Fn(HandlerId) + Send + Sync>) -> Self {
		Self {
			id,
			dropper: Some(dropper),
		}
	}

	/// Creates a subscription from a handler map using a weak reference.
	pub fn from_handler_map<E>(id: HandlerId, handlers: &HandlerMap<E>) -> Self
	where
		E: Send + 'static,
	{
		let weak: Weak<Mutex<IndexMap<HandlerId, HandlerFn<E>>>> = Arc::downgrade(handlers);
		let dropper = Arc::new(move |id: HandlerId| {
			if let Some(map) = weak.upgrade() {
				map.lock().shift_remove(&id);
			}
		});
		Self::new(id, dropper)
	}

	/// Returns this subscription's handler ID.
	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Keeps the handler registered for as long as its map lives.
	pub fn detach(mut self) {
		self.dropper = None;
	}

	/// Explicitly unsubscribes. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.dropper.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicBool, AtomicUsize};

	use super::*;

	#[test]
	fn test_handler_id_increments() {
		let id1 = next_handler_id();
		let id2 = next_handler_id();
		let id3 = next_handler_id();
		assert!(id2 > id1);
		assert!(id3 > id2);
	}

	#[test]
	fn test_subscription_unsubscribe() {
		let called = Arc::new(AtomicBool::new(false));
		let called_clone = Arc::clone(&called);

		let dropper = Arc::new(move |_id: HandlerId| {
			called_clone.store(true, Ordering::SeqCst);
		});

		let sub = Subscription::new(1, dropper);
		assert!(!called.load(Ordering::SeqCst));

		sub.unsubscribe();
		assert!(called.load(Ordering::SeqCst));
	}

	#[test]
	fn test_subscription_drop_removes_handler() {
		let map: HandlerMap<String> = new_handler_map();

		{
			let _sub = register(&map, |_: String| async { Ok(()) });
			assert_eq!(map.lock().len(), 1);
		}

		assert_eq!(map.lock().len(), 0);
	}

	#[test]
	fn test_detached_subscription_stays_registered() {
		let map: HandlerMap<String> = new_handler_map();
		register(&map, |_: String| async { Ok(()) }).detach();
		assert_eq!(map.lock().len(), 1);
	}

	#[test]
	fn test_subscription_weak_reference() {
		let map: HandlerMap<String> = new_handler_map();
		let sub = register(&map, |_: String| async { Ok(()) });

		drop(map);

		// Dropping subscription should not panic (weak ref is dead)
		drop(sub);
	}

	#[tokio::test]
	async fn test_emit_reaches_all_handlers_in_order() {
		let map: HandlerMap<usize> = new_handler_map();
		let seen = Arc::new(Mutex::new(Vec::new()));

		let first = Arc::clone(&seen);
		let _a = register(&map, move |n: usize| {
			first.lock().push(("a", n));
			async { Err(cvmweb_runtime::Error::ProtocolError("boom".into())) }
		});
		let second = Arc::clone(&seen);
		let _b = register(&map, move |n: usize| {
			second.lock().push(("b", n));
			async { Ok(()) }
		});

		emit(&map, 7, "test").await;

		assert_eq!(*seen.lock(), vec![("a", 7), ("b", 7)]);
	}

	#[tokio::test]
	async fn test_emit_skips_dropped_handlers() {
		let map: HandlerMap<()> = new_handler_map();
		let count = Arc::new(AtomicUsize::new(0));

		let counter = Arc::clone(&count);
		let sub = register(&map, move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
			async { Ok(()) }
		});

		emit(&map, (), "test").await;
		drop(sub);
		emit(&map, (), "test").await;

		assert_eq!(count.load(Ordering::SeqCst), 1);
	}
}
