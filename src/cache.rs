use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

struct CacheEntry<T> {
    value: T,
    loaded_at: Instant,
}

/// Memoizes loaded values by source identifier until they are `ttl` old.
/// Failed loads are not remembered.
pub struct SourceCache<T> {
    entries: HashMap<String, CacheEntry<T>>,
    ttl: Duration,
    hits: usize,
    misses: usize,
}

impl<T: Clone> SourceCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    pub fn get_or_load<E>(&mut self, key: &str, load: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        self.get_or_load_at(Instant::now(), key, load)
    }

    pub(crate) fn get_or_load_at<E>(
        &mut self,
        now: Instant,
        key: &str,
        load: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        if let Some(entry) = self.entries.get(key)
            && now.saturating_duration_since(entry.loaded_at) < self.ttl
        {
            self.hits += 1;
            return Ok(entry.value.clone());
        }

        self.misses += 1;
        self.entries.remove(key);
        trace!("Cache miss, loading ...");
        let value = load()?;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                loaded_at: now,
            },
        );
        Ok(value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn memoizes_until_ttl() {
        let mut cache = SourceCache::new(Duration::from_secs(60));
        let calls = Cell::new(0);
        let load = || -> Result<i32, ()> {
            calls.set(calls.get() + 1);
            Ok(calls.get())
        };
        let t0 = Instant::now();

        assert_eq!(cache.get_or_load_at(t0, "sales.xls", load), Ok(1));
        assert_eq!(cache.get_or_load_at(t0 + Duration::from_secs(59), "sales.xls", load), Ok(1));
        assert_eq!(cache.get_or_load_at(t0 + Duration::from_secs(60), "sales.xls", load), Ok(2));
        assert_eq!(cache.stats(), (1, 2));
    }

    #[test]
    fn keys_are_independent() {
        let mut cache = SourceCache::new(Duration::from_secs(60));
        assert_eq!(cache.get_or_load("a", || Ok::<_, ()>("A")), Ok("A"));
        assert_eq!(cache.get_or_load("b", || Ok::<_, ()>("B")), Ok("B"));
        assert_eq!(cache.get_or_load("a", || Ok::<_, ()>("other")), Ok("A"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let mut cache: SourceCache<i32> = SourceCache::new(Duration::from_secs(60));
        assert_eq!(cache.get_or_load("stock.xls", || Err("offline")), Err("offline"));
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get_or_load("stock.xls", || Ok::<_, &str>(5)), Ok(5));
    }

    #[test]
    fn clear_forces_reload() {
        let mut cache = SourceCache::new(Duration::from_secs(60));
        cache.get_or_load("a", || Ok::<_, ()>(1)).unwrap();
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get_or_load("a", || Ok::<_, ()>(2)), Ok(2));
    }
}
