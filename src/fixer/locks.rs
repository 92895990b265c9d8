use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Per-file advisory locks. Line-offset edits from one fix invalidate line
/// numbers of later diagnostics in the same file, so every
/// read-modify-write holds the file's lock for its full duration; fixes
/// against different files never contend.
#[derive(Default)]
pub struct PathLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for a path; the same file always maps to the same mutex
    pub fn acquire(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = normalize(path);
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(key).or_default().clone()
    }
}

/// Block until the file's lock is held
pub fn hold(lock: &Arc<Mutex<()>>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|e| e.into_inner())
}

/// Lexical normalization so `a/./b` and `a/b` share a lock; canonicalize
/// when the file exists to also catch symlinked duplicates
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
