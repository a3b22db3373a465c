use parking_lot::Mutex;

type LoadHook = Box<dyn FnOnce() + Send>;

/// Load state of the embedding page.
///
/// Work requested before the page has loaded is queued and runs, in order,
/// when [`PageState::mark_loaded`] is called. After that, work runs
/// immediately on the calling thread.
#[derive(Default)]
pub struct PageState {
	inner: Mutex<PageInner>,
}

#[derive(Default)]
struct PageInner {
	loaded: bool,
	hooks: Vec<LoadHook>,
}

impl PageState {
	pub fn new() -> Self {
		Self::default()
	}

	/// A page that has already loaded.
	pub fn loaded() -> Self {
		Self {
			inner: Mutex::new(PageInner {
				loaded: true,
				hooks: Vec::new(),
			}),
		}
	}

	pub fn is_loaded(&self) -> bool {
		self.inner.lock().loaded
	}

	/// Number of hooks waiting for the page to load.
	pub fn pending(&self) -> usize {
		self.inner.lock().hooks.len()
	}

	/// Runs `hook` now if the page has loaded, otherwise queues it.
	///
	/// Returns true if the hook ran.
	pub fn defer_or_run<F>(&self, hook: F) -> bool
	where
		F: FnOnce() + Send + 'static,
	{
		{
			let mut inner = self.inner.lock();
			if !inner.loaded {
				inner.hooks.push(Box::new(hook));
				tracing::debug!(queued = inner.hooks.len(), "Deferred start until page load");
				return false;
			}
		}
		hook();
		true
	}

	/// Marks the page as loaded and runs the queued hooks.
	///
	/// Returns the number of hooks run. Later calls run nothing.
	pub fn mark_loaded(&self) -> usize {
		let hooks = {
			let mut inner = self.inner.lock();
			inner.loaded = true;
			std::mem::take(&mut inner.hooks)
		};
		let count = hooks.len();
		if count > 0 {
			tracing::debug!(hooks = count, "Page loaded, running deferred hooks");
		}
		for hook in hooks {
			hook();
		}
		count
	}
}

impl std::fmt::Debug for PageState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.inner.lock();
		f.debug_struct("PageState")
			.field("loaded", &inner.loaded)
			.field("pending", &inner.hooks.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;

	#[test]
	fn hooks_wait_for_load_and_run_in_order() {
		let page = PageState::new();
		let order = Arc::new(Mutex::new(Vec::new()));

		for n in 0..3 {
			let order = Arc::clone(&order);
			assert!(!page.defer_or_run(move || order.lock().push(n)));
		}
		assert!(order.lock().is_empty());
		assert_eq!(page.pending(), 3);

		assert_eq!(page.mark_loaded(), 3);
		assert_eq!(*order.lock(), vec![0, 1, 2]);
		assert_eq!(page.mark_loaded(), 0);
		assert_eq!(*order.lock(), vec![0, 1, 2]);
	}

	#[test]
	fn hooks_run_immediately_after_load() {
		let page = PageState::loaded();
		let ran = Arc::new(Mutex::new(false));
		let flag = Arc::clone(&ran);

		assert!(page.defer_or_run(move || *flag.lock() = true));
		assert!(*ran.lock());
		assert_eq!(page.pending(), 0);
	}

	#[test]
	fn hook_may_defer_more_work() {
		let page = Arc::new(PageState::new());
		let order = Arc::new(Mutex::new(Vec::new()));

		let inner_page = Arc::clone(&page);
		let outer = Arc::clone(&order);
		page.defer_or_run(move || {
			outer.lock().push("outer");
			let nested = Arc::clone(&outer);
			inner_page.defer_or_run(move || nested.lock().push("nested"));
		});

		page.mark_loaded();
		assert_eq!(*order.lock(), vec!["outer", "nested"]);
	}
}
