//! The key-level lock manager. A bounded pool of reentrant locks, striped
//! by `hash(key) mod pool_size`, so per-key serialization never requires a
//! lock per key.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use aa_util::Key;

/// A bounded pool of striped reentrant locks. `acquire` may block;
/// every acquired handle must eventually be dropped (or passed to
/// [`KeyLockPool::release`], a thin synonym for `drop`). Never acquire a key
/// lock while already holding a partition mutex: lock ordering in the
/// ingestion task always goes partition mutex, then key lock, never the
/// reverse.
pub struct KeyLockPool {
	stripes: Vec<ReentrantMutex<()>>,
}

impl KeyLockPool {
	/// Builds a pool with exactly `pool_size` stripes (clamped to at least
	/// one so a degenerate size never makes `stripe % 0` possible).
	pub fn new(pool_size: usize) -> Self {
		let pool_size = pool_size.max(1);
		let stripes = (0..pool_size).map(|_| ReentrantMutex::new(())).collect();
		Self { stripes }
	}

	/// Sizes a pool using `min(partition_count, leader_consumer_pool_slots)
	/// * region_count * parallelism + 1`.
	pub fn sized_for(
		partition_count: usize,
		leader_consumer_pool_slots: usize,
		region_count: usize,
		parallelism: usize,
	) -> Self {
		let pool_size = partition_count.min(leader_consumer_pool_slots) * region_count * parallelism + 1;
		Self::new(pool_size)
	}

	pub fn pool_size(&self) -> usize {
		self.stripes.len()
	}

	/// Blocks until the stripe covering `key` is free, then returns a guard
	/// holding it. Fairness is not guaranteed; starvation under steady churn
	/// is acceptable because per-key critical sections are short.
	pub fn acquire(&self, key: &Key) -> KeyLockGuard<'_> {
		let stripe = key.stripe(self.stripes.len());
		KeyLockGuard {
			guard: self.stripes[stripe].lock(),
		}
	}

	/// Releases a previously acquired lock. Equivalent to dropping the
	/// guard; spelled out because the ingestion task's processing loop
	/// names an explicit release point distinct from where the guard
	/// falls out of scope.
	pub fn release(&self, guard: KeyLockGuard<'_>) {
		drop(guard);
	}
}

pub struct KeyLockGuard<'a> {
	guard: ReentrantMutexGuard<'a, ()>,
}

impl std::fmt::Debug for KeyLockGuard<'_> {
	fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
		fmt.debug_struct("KeyLockGuard").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;
	use std::thread;

	use super::*;

	#[test]
	fn sized_for_matches_formula() {
		let pool = KeyLockPool::sized_for(8, 4, 3, 2);
		assert_eq!(pool.pool_size(), 4 * 3 * 2 + 1);
	}

	#[test]
	fn zero_pool_size_is_clamped_to_one() {
		let pool = KeyLockPool::new(0);
		assert_eq!(pool.pool_size(), 1);
	}

	#[test]
	fn same_thread_can_reacquire_its_own_stripe() {
		let pool = KeyLockPool::new(1);
		let key = Key::from(b"k".as_slice());
		let outer = pool.acquire(&key);
		let inner = pool.acquire(&key);
		pool.release(inner);
		pool.release(outer);
	}

	#[test]
	fn concurrent_operations_on_the_same_key_are_serialized() {
		let pool = Arc::new(KeyLockPool::new(4));
		let key = Key::from(b"contended".as_slice());
		let counter = Arc::new(AtomicU32::new(0));

		let handles: Vec<_> = (0..8)
			.map(|_| {
				let pool = Arc::clone(&pool);
				let key = key.clone();
				let counter = Arc::clone(&counter);
				thread::spawn(move || {
					let _guard = pool.acquire(&key);
					let before = counter.fetch_add(1, Ordering::SeqCst);
					assert_eq!(before + 1, counter.load(Ordering::SeqCst));
				})
			})
			.collect();

		for handle in handles {
			handle.join().unwrap();
		}
		assert_eq!(counter.load(Ordering::SeqCst), 8);
	}
}
