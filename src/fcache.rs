//! In-memory cache for small static files.
//!
//! Two tables behind one lock: the main table holds file bytes validated
//! by mtime; the admission table counts misses so only paths requested
//! twice within the age window get promoted. Insertions are rate-limited
//! by a token counter replenished each wall-clock second, and both tables
//! are swept for stale entries on every operation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Main-table capacity; the admission table is twice this.
pub(crate) const MAIN_CAP: usize = 64;
pub(crate) const ADMISSION_CAP: usize = 2 * MAIN_CAP;
/// Insertions permitted per wall-clock second.
pub(crate) const TOKENS_PER_SECOND: u32 = 8;
/// Entries untouched this long are dropped by the sweeps.
pub(crate) const MAX_AGE_SECS: u64 = 300;
/// Only files in (0, MAX_BYTES] are cacheable.
pub(crate) const MAX_BYTES: u64 = 512 * 1024;

struct Entry {
    bytes: Vec<u8>,
    mtime: SystemTime,
    last_access: u64,
}

struct Seen {
    hits: u32,
    last_touch: u64,
}

struct Inner {
    main: HashMap<PathBuf, Entry>,
    admission: HashMap<PathBuf, Seen>,
    tokens: u32,
    token_second: u64,
}

pub(crate) struct FileCache {
    inner: Mutex<Inner>,
}

impl FileCache {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                main: HashMap::with_capacity(MAIN_CAP),
                admission: HashMap::with_capacity(ADMISSION_CAP),
                tokens: TOKENS_PER_SECOND,
                token_second: 0,
            }),
        }
    }

    /// True when a file of this size may pass through the cache at all.
    pub(crate) fn cacheable_size(len: u64) -> bool {
        len > 0 && len <= MAX_BYTES
    }

    /// Returns a copy of the cached bytes when the entry matches the
    /// caller's stat result. A miss records the path in the admission
    /// table; a stale entry (mtime mismatch) is a miss and stays until
    /// swept or replaced.
    pub(crate) fn lookup(&self, path: &Path, mtime: SystemTime) -> Option<Vec<u8>> {
        self.lookup_at(path, mtime, unix_now())
    }

    /// Inserts the file if its path has earned admission and a rate token
    /// is available. Returns whether the bytes were cached.
    pub(crate) fn store(&self, path: &Path, mtime: SystemTime, bytes: &[u8]) -> bool {
        self.store_at(path, mtime, bytes, unix_now())
    }

    fn lookup_at(&self, path: &Path, mtime: SystemTime, now: u64) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.sweep(now);

        if let Some(entry) = inner.main.get_mut(path) {
            if entry.mtime == mtime {
                entry.last_access = now;
                return Some(entry.bytes.clone());
            }
        }

        inner.note_miss(path, now);
        None
    }

    fn store_at(&self, path: &Path, mtime: SystemTime, bytes: &[u8], now: u64) -> bool {
        if !Self::cacheable_size(bytes.len() as u64) {
            return false;
        }

        let mut inner = self.inner.lock();
        inner.sweep(now);

        let admitted = inner
            .admission
            .get(path)
            .map(|seen| seen.hits >= 2)
            .unwrap_or(false);
        if !admitted {
            return false;
        }

        if !inner.take_token(now) {
            // Rate exhausted; the insertion is deferred to a later request.
            return false;
        }

        if inner.main.len() >= MAIN_CAP && !inner.main.contains_key(path) {
            inner.evict_oldest();
        }
        inner.main.insert(
            path.to_path_buf(),
            Entry {
                bytes: bytes.to_vec(),
                mtime,
                last_access: now,
            },
        );
        inner.admission.remove(path);
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().main.len()
    }
}

impl Inner {
    fn note_miss(&mut self, path: &Path, now: u64) {
        if let Some(seen) = self.admission.get_mut(path) {
            seen.hits += 1;
            seen.last_touch = now;
            return;
        }

        if self.admission.len() >= ADMISSION_CAP {
            if let Some(oldest) = self
                .admission
                .iter()
                .min_by_key(|(_, seen)| seen.last_touch)
                .map(|(path, _)| path.clone())
            {
                self.admission.remove(&oldest);
            }
        }
        self.admission.insert(
            path.to_path_buf(),
            Seen {
                hits: 1,
                last_touch: now,
            },
        );
    }

    /// Replenish to the full allowance at each new wall-clock second.
    fn take_token(&mut self, now: u64) -> bool {
        if now != self.token_second {
            self.token_second = now;
            self.tokens = TOKENS_PER_SECOND;
        }
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self
            .main
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(path, _)| path.clone())
        {
            self.main.remove(&oldest);
        }
    }

    fn sweep(&mut self, now: u64) {
        self.main
            .retain(|_, entry| now.saturating_sub(entry.last_access) <= MAX_AGE_SECS);
        self.admission
            .retain(|_, seen| now.saturating_sub(seen.last_touch) <= MAX_AGE_SECS);
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod cache_tests {
    use super::*;

    fn mtime(n: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(n)
    }

    fn path(name: &str) -> PathBuf {
        PathBuf::from(format!("/srv/static/{name}"))
    }

    /// Miss, miss, store, hit: the two-hit admission path.
    #[test]
    fn admission_requires_two_misses() {
        let cache = FileCache::new();
        let p = path("app.js");

        assert!(cache.lookup_at(&p, mtime(1), 100).is_none());
        assert!(!cache.store_at(&p, mtime(1), b"data", 100), "one miss must not admit");

        assert!(cache.lookup_at(&p, mtime(1), 101).is_none());
        assert!(cache.store_at(&p, mtime(1), b"data", 101));

        assert_eq!(cache.lookup_at(&p, mtime(1), 102), Some(b"data".to_vec()));
    }

    #[test]
    fn mtime_mismatch_is_a_miss() {
        let cache = FileCache::new();
        let p = path("style.css");

        cache.lookup_at(&p, mtime(1), 100);
        cache.lookup_at(&p, mtime(1), 100);
        assert!(cache.store_at(&p, mtime(1), b"old", 100));

        // Rewritten on disk: the cached copy must never be returned.
        assert!(cache.lookup_at(&p, mtime(2), 101).is_none());

        // The entry is replaced once the path re-earns admission.
        cache.lookup_at(&p, mtime(2), 102);
        assert!(cache.store_at(&p, mtime(2), b"new", 102));
        assert_eq!(cache.lookup_at(&p, mtime(2), 103), Some(b"new".to_vec()));
    }

    #[test]
    fn size_bounds() {
        assert!(!FileCache::cacheable_size(0));
        assert!(FileCache::cacheable_size(1));
        assert!(FileCache::cacheable_size(MAX_BYTES));
        assert!(!FileCache::cacheable_size(MAX_BYTES + 1));

        let cache = FileCache::new();
        let p = path("empty.txt");
        cache.lookup_at(&p, mtime(1), 100);
        cache.lookup_at(&p, mtime(1), 100);
        assert!(!cache.store_at(&p, mtime(1), b"", 100));
    }

    #[test]
    fn rate_limit_defers_insertions() {
        let cache = FileCache::new();

        // Earn admission for more paths than one second's tokens allow.
        let paths: Vec<_> = (0..TOKENS_PER_SECOND + 3).map(|i| path(&format!("f{i}"))).collect();
        for p in &paths {
            cache.lookup_at(p, mtime(1), 200);
            cache.lookup_at(p, mtime(1), 200);
        }

        let stored = paths
            .iter()
            .filter(|p| cache.store_at(p, mtime(1), b"x", 200))
            .count();
        assert_eq!(stored, TOKENS_PER_SECOND as usize);

        // The next wall-clock second replenishes the allowance.
        let stored_later = paths
            .iter()
            .filter(|p| cache.store_at(p, mtime(1), b"x", 201))
            .count();
        assert_eq!(stored_later, 3);
    }

    #[test]
    fn age_sweep_drops_idle_entries() {
        let cache = FileCache::new();
        let p = path("old.html");

        cache.lookup_at(&p, mtime(1), 100);
        cache.lookup_at(&p, mtime(1), 100);
        assert!(cache.store_at(&p, mtime(1), b"x", 100));
        assert_eq!(cache.len(), 1);

        // Any operation past the age window sweeps it out.
        cache.lookup_at(&path("other"), mtime(1), 100 + MAX_AGE_SECS + 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn full_table_evicts_oldest_access() {
        let cache = FileCache::new();

        for i in 0..MAIN_CAP {
            let p = path(&format!("f{i}"));
            let now = 300 + i as u64 / TOKENS_PER_SECOND as u64;
            cache.lookup_at(&p, mtime(1), now);
            cache.lookup_at(&p, mtime(1), now);
            assert!(cache.store_at(&p, mtime(1), b"x", now), "file {i}");
        }
        assert_eq!(cache.len(), MAIN_CAP);

        // Touch everything except f0 so it becomes the eviction victim.
        let later = 320;
        for i in 1..MAIN_CAP {
            assert!(cache.lookup_at(&path(&format!("f{i}")), mtime(1), later).is_some());
        }

        let newcomer = path("newcomer");
        cache.lookup_at(&newcomer, mtime(1), later);
        cache.lookup_at(&newcomer, mtime(1), later);
        assert!(cache.store_at(&newcomer, mtime(1), b"x", later));

        assert_eq!(cache.len(), MAIN_CAP);
        assert!(cache.lookup_at(&path("f0"), mtime(1), later).is_none());
        assert!(cache.lookup_at(&newcomer, mtime(1), later).is_some());
    }
}
