use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{
    Arc, Mutex, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError, Weak,
};

use tracing::{debug, warn};

/// Live locks by resolved database path.
static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Weak<StoreLock>>>> = OnceLock::new();

/// Read/write guard serializing access to one database file.
///
/// Readers (`get`, `list_metadata`, queries) share the lock; mutations
/// (`put`, `delete`) hold it exclusively for the whole read-modify-write
/// cycle. [`StoreLock::for_path`] hands every handle on the same file the
/// same lock for as long as one of them is alive.
///
/// The lock guards no in-memory state, so a guard dropped by a panicking
/// thread is recovered rather than propagated.
#[derive(Debug, Default)]
pub struct StoreLock {
    inner: RwLock<()>,
}

impl StoreLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new lock behind an `Arc`, ready to be handed to several handles.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// The process-wide lock of the database at `path`.
    ///
    /// Spellings of the same file (relative, absolute, through symlinks)
    /// resolve to one lock. The path is resolved when this is called, so a
    /// symlink created later is not followed.
    pub fn for_path(path: &Path) -> Arc<Self> {
        let key = resolve(path);
        let mut registry = REGISTRY
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = registry.get(&key).and_then(Weak::upgrade) {
            return lock;
        }
        registry.retain(|_, lock| lock.strong_count() > 0);
        let lock = Self::shared();
        registry.insert(key.clone(), Arc::downgrade(&lock));
        debug!(path = %key.display(), "registered store lock");
        lock
    }

    /// Acquire a shared guard, blocking while a writer holds the lock.
    pub fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("store lock poisoned by a panicked writer; recovering");
            poisoned.into_inner()
        })
    }

    /// Acquire the exclusive guard, blocking while anyone holds the lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.inner.write().unwrap_or_else(|poisoned| {
            warn!("store lock poisoned by a panicked writer; recovering");
            poisoned.into_inner()
        })
    }

    /// Acquire a shared guard without blocking.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, ()>> {
        match self.inner.try_read() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(PoisonError::into_inner(poisoned)),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Acquire the exclusive guard without blocking.
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, ()>> {
        match self.inner.try_write() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(PoisonError::into_inner(poisoned)),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

/// Canonical form of `path`. Components below the deepest existing ancestor
/// are appended as given, so a file that does not exist yet still resolves.
fn resolve(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_share() {
        let lock = StoreLock::new();
        let _a = lock.read();
        assert!(lock.try_read().is_some());
        assert!(lock.try_write().is_none());
    }

    #[test]
    fn writer_excludes_everyone() {
        let lock = StoreLock::new();
        let guard = lock.write();
        assert!(lock.try_read().is_none());
        assert!(lock.try_write().is_none());
        drop(guard);
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn guard_released_on_error_path() {
        fn failing(lock: &StoreLock) -> Result<(), &'static str> {
            let _guard = lock.write();
            Err("boom")
        }
        let lock = StoreLock::new();
        assert!(failing(&lock).is_err());
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn poisoned_lock_recovers() {
        let lock = StoreLock::shared();
        let cloned = Arc::clone(&lock);
        let result = std::thread::spawn(move || {
            let _guard = cloned.write();
            panic!("writer died");
        })
        .join();
        assert!(result.is_err());
        drop(lock.read());
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn same_file_gets_same_lock() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.imdb");
        let a = StoreLock::for_path(&file);
        let b = StoreLock::for_path(&dir.path().join(".").join("data.imdb"));
        assert!(Arc::ptr_eq(&a, &b));

        let _guard = a.write();
        assert!(b.try_read().is_none());
    }

    #[test]
    fn spelling_survives_file_creation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested/data.imdb");
        let before = StoreLock::for_path(&file);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();
        assert!(Arc::ptr_eq(&before, &StoreLock::for_path(&file)));
    }

    #[test]
    fn different_files_get_different_locks() {
        let dir = tempfile::tempdir().unwrap();
        let a = StoreLock::for_path(&dir.path().join("a.imdb"));
        let b = StoreLock::for_path(&dir.path().join("b.imdb"));
        assert!(!Arc::ptr_eq(&a, &b));
        let _guard = a.write();
        assert!(b.try_write().is_some());
    }

    #[test]
    fn dropped_locks_are_released() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.imdb");
        let first = StoreLock::for_path(&file);
        let weak = Arc::downgrade(&first);
        drop(first);
        assert!(weak.upgrade().is_none());
        let _second = StoreLock::for_path(&file);
    }
}
