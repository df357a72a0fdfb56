//! Short-lived cache of "still pending" status results.
//!
//! Only pending results are stored, so a hit can never hide a terminal
//! state. Concurrent writers are last-write-wins.

use super::store::AsyncKey;
use broker_types::AsyncStatusResponse;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct StatusCache {
	ttl: Duration,
	entries: DashMap<AsyncKey, (AsyncStatusResponse, Instant)>,
}

impl StatusCache {
	pub fn new(ttl: Duration) -> Self {
		Self {
			ttl,
			entries: DashMap::new(),
		}
	}

	/// Cached pending status, if it is younger than the TTL.
	pub fn get(&self, key: &AsyncKey) -> Option<AsyncStatusResponse> {
		{
			let entry = self.entries.get(key)?;
			let (status, stored_at) = entry.value();
			if stored_at.elapsed() < self.ttl {
				return Some(status.clone());
			}
		}
		// The read guard must be gone before removing.
		self.entries.remove(key);
		None
	}

	/// Also drops every expired entry, so abandoned retrievals do not linger.
	pub fn insert(&self, key: AsyncKey, status: AsyncStatusResponse) {
		let ttl = self.ttl;
		self.entries.retain(|_, (_, stored_at)| stored_at.elapsed() < ttl);

		if status.is_still_waiting() {
			self.entries.insert(key, (status, Instant::now()));
		} else {
			self.entries.remove(&key);
		}
	}

	pub fn invalidate(&self, key: &AsyncKey) {
		self.entries.remove(key);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_pending_is_cached() {
		let cache = StatusCache::new(Duration::from_secs(60));
		let key = AsyncKey::new("a", "Roles");
		cache.insert(key.clone(), AsyncStatusResponse::pending(Some(3)));
		assert_eq!(cache.get(&key), Some(AsyncStatusResponse::pending(Some(3))));

		cache.invalidate(&key);
		assert_eq!(cache.get(&key), None);
	}

	#[test]
	fn test_insert_evicts_expired_entries() {
		let cache = StatusCache::new(Duration::from_millis(20));
		cache.insert(AsyncKey::new("a", "Roles"), AsyncStatusResponse::pending(None));
		cache.insert(AsyncKey::new("b", "Roles"), AsyncStatusResponse::pending(None));
		std::thread::sleep(Duration::from_millis(40));

		cache.insert(AsyncKey::new("c", "Roles"), AsyncStatusResponse::pending(None));
		assert_eq!(cache.entries.len(), 1);
		assert!(cache.entries.contains_key(&AsyncKey::new("c", "Roles")));
	}

	#[test]
	fn test_available_is_never_cached() {
		let cache = StatusCache::new(Duration::from_secs(60));
		let key = AsyncKey::new("a", "Roles");
		cache.insert(key.clone(), AsyncStatusResponse::pending(None));
		cache.insert(key.clone(), AsyncStatusResponse::available());
		assert_eq!(cache.get(&key), None);
	}

	#[test]
	fn test_entries_expire() {
		let cache = StatusCache::new(Duration::ZERO);
		let key = AsyncKey::new("a", "Roles");
		cache.insert(key.clone(), AsyncStatusResponse::pending(None));
		assert_eq!(cache.get(&key), None);
		assert!(cache.entries.is_empty());
	}
}
