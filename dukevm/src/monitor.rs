use parking_lot::{Condvar, Mutex};
use crate::thread::ThreadId;

#[derive(Debug, Default)]
struct MonitorState {
	owner: Option<ThreadId>,
	count: u32,
}

/// A reentrant lock, owned by at most one thread at a time.
#[derive(Debug, Default)]
pub struct Monitor {
	state: Mutex<MonitorState>,
	released: Condvar,
}

impl Monitor {
	pub fn new() -> Monitor {
		Monitor::default()
	}

	/// Acquires the monitor, blocking while another thread owns it.
	pub fn enter(&self, thread: ThreadId) {
		let mut state = self.state.lock();
		loop {
			match state.owner {
				None => {
					state.owner = Some(thread);
					state.count = 1;
					return;
				},
				Some(owner) if owner == thread => {
					state.count += 1;
					return;
				},
				Some(_) => self.released.wait(&mut state),
			}
		}
	}

	/// Releases one level of ownership.
	///
	/// Returns `false` if the thread doesn't own this monitor.
	#[must_use]
	pub fn exit(&self, thread: ThreadId) -> bool {
		let mut state = self.state.lock();
		if state.owner != Some(thread) {
			return false;
		}
		state.count -= 1;
		if state.count == 0 {
			state.owner = None;
			drop(state);
			self.released.notify_one();
		}
		true
	}

	pub fn owner(&self) -> Option<ThreadId> {
		self.state.lock().owner
	}

	/// How often the owner entered the monitor, `0` if it's not owned.
	pub fn entry_count(&self) -> u32 {
		self.state.lock().count
	}

	pub fn is_owned_by(&self, thread: ThreadId) -> bool {
		self.owner() == Some(thread)
	}
}

#[cfg(test)]
mod testing {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicU32, Ordering};
	use pretty_assertions::assert_eq;
	use crate::monitor::Monitor;
	use crate::thread::ThreadId;

	#[test]
	fn reentrant() {
		let monitor = Monitor::new();
		let a = ThreadId(1);
		let b = ThreadId(2);

		monitor.enter(a);
		monitor.enter(a);
		assert_eq!(monitor.owner(), Some(a));
		assert_eq!(monitor.entry_count(), 2);

		assert!(!monitor.exit(b));
		assert!(monitor.exit(a));
		assert!(monitor.is_owned_by(a));
		assert!(monitor.exit(a));
		assert_eq!(monitor.owner(), None);
		assert!(!monitor.exit(a));
	}

	#[test]
	fn excludes_other_threads() {
		let monitor = Arc::new(Monitor::new());
		let counter = Arc::new(AtomicU32::new(0));

		let handles: Vec<_> = (0..4)
			.map(|i| {
				let monitor = monitor.clone();
				let counter = counter.clone();
				std::thread::spawn(move || {
					for _ in 0..100 {
						monitor.enter(ThreadId(i));
						// a non-atomic read-modify-write, only correct under the monitor
						let value = counter.load(Ordering::Relaxed);
						std::thread::yield_now();
						counter.store(value + 1, Ordering::Relaxed);
						assert!(monitor.exit(ThreadId(i)));
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}

		assert_eq!(counter.load(Ordering::Relaxed), 400);
	}
}
