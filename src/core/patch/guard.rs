use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

/// Registry of per-install locks, keyed by canonical path.
///
/// Operations on the same install run one at a time; different installs never
/// wait on each other.
#[derive(Debug, Default)]
pub struct PathGuards {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl PathGuards {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.locks.entry(key).or_default().clone()
    }

    /// Run `f` while holding the lock for `path`.
    pub fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        // Clone the Arc out first so the map shard is not held while we block.
        let lock = self.lock_for(path);
        let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_path_is_serialized() {
        let tmp = tempfile::tempdir().unwrap();
        let guards = Arc::new(PathGuards::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let guards = guards.clone();
                let active = active.clone();
                let peak = peak.clone();
                let path = tmp.path().to_path_buf();
                thread::spawn(move || {
                    guards.with_lock(&path, || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn equivalent_paths_share_a_lock() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("a")).unwrap();
        let guards = PathGuards::new();

        let direct = guards.lock_for(&tmp.path().join("a"));
        let dotted = guards.lock_for(&tmp.path().join("a").join("..").join("a"));
        let other = guards.lock_for(tmp.path());
        assert!(Arc::ptr_eq(&direct, &dotted));
        assert!(!Arc::ptr_eq(&direct, &other));
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let tmp = tempfile::tempdir().unwrap();
        let guards = Arc::new(PathGuards::new());
        let path = tmp.path().to_path_buf();

        let poisoner = {
            let guards = guards.clone();
            let path = path.clone();
            thread::spawn(move || guards.with_lock(&path, || panic!("boom")))
        };
        assert!(poisoner.join().is_err());
        assert_eq!(guards.with_lock(&path, || 7), 7);
    }
}
